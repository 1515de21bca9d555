//! Recursive call-site inlining.
//!
//! The lifter's two-layer structure collapses here: every call to a
//! resolvable, non-declaration, non-noinline callee is spliced into the
//! caller, and the scan repeats until no such call remains. Native
//! wrappers are `noinline` and intrinsics are declarations, so in practice
//! this folds the always-inline semantic body (and anything it pulled in)
//! into the wrapper.

use crate::ir::{BlockId, Function, InlineHint, Inst, InstId, Op, Terminator, ValueDef, ValueId};

/// Inlines until no inlinable call sites remain.
///
/// `resolve` maps a callee name to its function when a body is available.
pub fn inline_all<'f>(func: &mut Function, resolve: impl Fn(&str) -> Option<&'f Function>) {
    loop {
        let Some((block, position)) = find_inlinable(func, &resolve) else {
            break;
        };
        let callee = {
            let inst_id = func.blocks[block.0 as usize].insts[position];
            let Op::Call { callee, .. } = &func.inst(inst_id).op else {
                unreachable!("find_inlinable returns call sites");
            };
            resolve(callee)
                .expect("find_inlinable checked resolvability")
                .clone()
        };
        inline_call(func, block, position, &callee);
    }
}

fn find_inlinable<'f>(
    func: &Function,
    resolve: &impl Fn(&str) -> Option<&'f Function>,
) -> Option<(BlockId, usize)> {
    for (block_index, block) in func.blocks.iter().enumerate() {
        for (position, &inst_id) in block.insts.iter().enumerate() {
            if let Op::Call { callee, .. } = &func.insts[inst_id.0 as usize].op {
                if let Some(target) = resolve(callee) {
                    if !target.is_declaration() && target.inline != InlineHint::NoInline {
                        return Some((BlockId(block_index as u32), position));
                    }
                }
            }
        }
    }
    None
}

/// Rewrites phi nodes in `successor` so edges that used to come from
/// `old_pred` come from `new_pred`.
fn retarget_phi_edges(func: &mut Function, successor: BlockId, old_pred: BlockId, new_pred: BlockId) {
    let inst_ids: Vec<InstId> = func.blocks[successor.0 as usize].insts.clone();
    for inst_id in inst_ids {
        if let Op::Phi { incomings, .. } = &mut func.insts[inst_id.0 as usize].op {
            for (pred, _) in incomings {
                if *pred == old_pred {
                    *pred = new_pred;
                }
            }
        }
    }
}

#[allow(clippy::too_many_lines)]
fn inline_call(caller: &mut Function, block: BlockId, position: usize, callee: &Function) {
    let call_id = caller.blocks[block.0 as usize].insts[position];
    let (args, call_dest) = {
        let inst = caller.inst(call_id);
        let Op::Call { args, .. } = &inst.op else {
            unreachable!("inline_call operates on call sites");
        };
        (args.clone(), inst.dest)
    };

    // Split the block: everything after the call moves into a fresh
    // continuation block, which also inherits the terminator.
    let cont = caller.add_block(None);
    let mut tail = caller.blocks[block.0 as usize].insts.split_off(position);
    tail.remove(0); // the call itself
    let old_term =
        std::mem::replace(&mut caller.blocks[block.0 as usize].term, Terminator::None);
    caller.blocks[cont.0 as usize].insts = tail;
    caller.blocks[cont.0 as usize].term = old_term;

    let mut moved_successors = Vec::new();
    caller.blocks[cont.0 as usize]
        .term
        .for_each_successor(|succ| moved_successors.push(succ));
    for successor in moved_successors {
        retarget_phi_edges(caller, successor, block, cont);
    }

    // Map the callee's arenas into the caller.
    let mut value_map = Vec::with_capacity(callee.values.len());
    for def in &callee.values {
        let mapped = match def {
            ValueDef::Arg { index, .. } => args[*index as usize],
            ValueDef::Const(constant) => caller.new_value(ValueDef::Const(constant.clone())),
            ValueDef::Inst { ty } => caller.new_value(ValueDef::Inst { ty: ty.clone() }),
        };
        value_map.push(mapped);
    }
    let block_map: Vec<BlockId> = callee
        .blocks
        .iter()
        .map(|_| caller.add_block(None))
        .collect();

    // Return edges: (inlined block, returned value).
    let mut returns: Vec<(BlockId, Option<ValueId>)> = Vec::new();

    for (callee_index, callee_block) in callee.blocks.iter().enumerate() {
        let new_block = block_map[callee_index];
        for &inst_id in &callee_block.insts {
            let inst = &callee.insts[inst_id.0 as usize];
            let mut op = inst.op.clone();
            op.map_operands(|value| *value = value_map[value.0 as usize]);
            if let Op::Phi { incomings, .. } = &mut op {
                for (pred, _) in incomings {
                    *pred = block_map[pred.0 as usize];
                }
            }
            let dest = inst.dest.map(|dest| value_map[dest.0 as usize]);
            let new_id = InstId(caller.insts.len() as u32);
            caller.insts.push(Inst { dest, op });
            caller.blocks[new_block.0 as usize].insts.push(new_id);
        }

        let term = match &callee_block.term {
            Terminator::None => Terminator::None,
            Terminator::Br { target } => Terminator::Br {
                target: block_map[target.0 as usize],
            },
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => Terminator::CondBr {
                cond: value_map[cond.0 as usize],
                then_dest: block_map[then_dest.0 as usize],
                else_dest: block_map[else_dest.0 as usize],
            },
            Terminator::Ret { value } => {
                let value = value.map(|value| value_map[value.0 as usize]);
                returns.push((new_block, value));
                Terminator::Br { target: cont }
            }
            Terminator::TailCall {
                callee: tail_callee,
                args: tail_args,
            } => {
                // Inside the caller a tail call becomes an ordinary call
                // whose result is the inlined function's return value.
                let mapped_args: Vec<ValueId> = tail_args
                    .iter()
                    .map(|value| value_map[value.0 as usize])
                    .collect();
                let result = caller.push(
                    new_block,
                    Op::Call {
                        callee: tail_callee.clone(),
                        args: mapped_args,
                        ret_ty: callee.sig.ret.clone(),
                    },
                );
                returns.push((new_block, result));
                Terminator::Br { target: cont }
            }
        };
        caller.blocks[new_block.0 as usize].term = term;
    }

    // Enter the inlined body.
    caller.blocks[block.0 as usize].term = Terminator::Br {
        target: block_map[0],
    };

    // Join the return value into the call result's uses.
    if let Some(dest) = call_dest {
        let incoming: Vec<(BlockId, ValueId)> = returns
            .iter()
            .filter_map(|(from, value)| value.map(|value| (*from, value)))
            .collect();
        let replacement = match incoming.len() {
            0 => {
                let ty = caller.value_type(dest);
                caller.undef(ty)
            }
            1 => incoming[0].1,
            _ => {
                let ty = caller.value_type(dest);
                caller
                    .insert(cont, 0, Op::Phi { ty, incomings: incoming })
                    .expect("phi produces a value")
            }
        };
        caller.replace_all_uses(dest, replacement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FnSig, Linkage, Type};

    /// Builds `fn double(x) { ret x + x }`.
    fn double_fn() -> Function {
        let mut func = Function::declare(
            "double",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::Internal,
        );
        func.inline = InlineHint::AlwaysInline;
        let entry = func.add_block(None);
        let arg = func.arg(0);
        let sum = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: arg,
                    rhs: arg,
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(sum) });
        func
    }

    /// Builds a caller: `fn main(x) { ret double(x) }`.
    fn caller_fn() -> Function {
        let mut func = Function::declare(
            "main",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        let entry = func.add_block(None);
        let arg = func.arg(0);
        let result = func
            .push(
                entry,
                Op::Call {
                    callee: "double".to_string(),
                    args: vec![arg],
                    ret_ty: Type::Int(64),
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(result) });
        func
    }

    #[test]
    fn test_single_call_inlined() {
        let callee = double_fn();
        let mut caller = caller_fn();
        inline_all(&mut caller, |name| {
            if name == "double" {
                Some(&callee)
            } else {
                None
            }
        });

        // No calls remain.
        let mut calls = 0;
        caller.for_each_callee(|_| calls += 1);
        assert_eq!(calls, 0);

        // The add survived the splice.
        let has_add = caller.blocks.iter().flat_map(|b| &b.insts).any(|&id| {
            matches!(
                caller.inst(id).op,
                Op::Binary {
                    op: BinOp::Add,
                    ..
                }
            )
        });
        assert!(has_add);
    }

    #[test]
    fn test_noinline_callee_survives() {
        let mut callee = double_fn();
        callee.inline = InlineHint::NoInline;
        let mut caller = caller_fn();
        inline_all(&mut caller, |name| {
            if name == "double" {
                Some(&callee)
            } else {
                None
            }
        });

        let mut calls = 0;
        caller.for_each_callee(|_| calls += 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_declaration_callee_survives() {
        let mut caller = caller_fn();
        let declaration = Function::declare(
            "double",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        inline_all(&mut caller, |name| {
            if name == "double" {
                Some(&declaration)
            } else {
                None
            }
        });

        let mut calls = 0;
        caller.for_each_callee(|_| calls += 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_tail_call_lowers_to_call_plus_join() {
        // Callee whose body tail-calls an intrinsic.
        let mut callee = Function::declare(
            "body",
            FnSig::new(vec![Type::Ptr], Type::Ptr),
            Linkage::Internal,
        );
        callee.inline = InlineHint::AlwaysInline;
        let entry = callee.add_block(None);
        let arg = callee.arg(0);
        callee.set_terminator(
            entry,
            Terminator::TailCall {
                callee: "__anvill_error".to_string(),
                args: vec![arg],
            },
        );

        let mut caller = Function::declare(
            "wrap",
            FnSig::new(vec![Type::Ptr], Type::Ptr),
            Linkage::External,
        );
        let entry = caller.add_block(None);
        let arg = caller.arg(0);
        let result = caller
            .push(
                entry,
                Op::Call {
                    callee: "body".to_string(),
                    args: vec![arg],
                    ret_ty: Type::Ptr,
                },
            )
            .unwrap();
        caller.set_terminator(entry, Terminator::Ret { value: Some(result) });

        inline_all(&mut caller, |name| {
            if name == "body" {
                Some(&callee)
            } else {
                None
            }
        });

        // The intrinsic call remains (as a plain call), "body" is gone.
        let mut callees = Vec::new();
        caller.for_each_callee(|name| callees.push(name.to_string()));
        assert_eq!(callees, vec!["__anvill_error".to_string()]);
    }
}
