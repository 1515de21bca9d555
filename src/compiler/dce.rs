//! Dead code elimination.
//!
//! Removes side-effect-free instructions whose results have no uses,
//! iterating until nothing else dies (a removed use can orphan its
//! operands' defining instructions in turn).

use rustc_hash::FxHashSet;

use crate::ir::{Function, ValueId};

/// Runs the pass. Returns `true` if any instruction was removed.
pub fn run(func: &mut Function) -> bool {
    if func.is_declaration() {
        return false;
    }
    let mut changed = false;
    loop {
        let mut used: FxHashSet<ValueId> = FxHashSet::default();
        for block in &func.blocks {
            for &inst_id in &block.insts {
                func.inst(inst_id).op.for_each_operand(|operand| {
                    used.insert(operand);
                });
            }
            block.term.for_each_operand(|operand| {
                used.insert(operand);
            });
        }

        let mut removed = false;
        for block_index in 0..func.blocks.len() {
            let before = func.blocks[block_index].insts.len();
            let dead: Vec<bool> = func.blocks[block_index]
                .insts
                .iter()
                .map(|&inst_id| {
                    let inst = func.inst(inst_id);
                    inst.op.is_pure()
                        && inst.dest.map_or(true, |dest| !used.contains(&dest))
                })
                .collect();
            let mut keep = dead.iter().map(|&d| !d);
            func.blocks[block_index]
                .insts
                .retain(|_| keep.next().unwrap_or(true));
            removed |= func.blocks[block_index].insts.len() != before;
        }

        if !removed {
            break;
        }
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FnSig, Linkage, Op, Terminator, Type};

    #[test]
    fn test_unused_chain_removed() {
        let mut func = Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        let entry = func.add_block(None);
        let arg = func.arg(0);
        let one = func.const_int(Type::Int(64), 1);
        // A chain of unused math.
        let a = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: arg,
                    rhs: one,
                },
            )
            .unwrap();
        func.push(
            entry,
            Op::Binary {
                op: BinOp::Mul,
                lhs: a,
                rhs: a,
            },
        );
        func.set_terminator(entry, Terminator::Ret { value: Some(arg) });

        assert!(run(&mut func));
        assert!(func.blocks[0].insts.is_empty());
    }

    #[test]
    fn test_stores_and_calls_kept() {
        let mut func = Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Void),
            Linkage::External,
        );
        let entry = func.add_block(None);
        let slot = func.push(entry, Op::Alloca { ty: Type::Int(64) }).unwrap();
        let arg = func.arg(0);
        func.push(entry, Op::Store { ptr: slot, value: arg });
        func.push(
            entry,
            Op::Call {
                callee: "effect".to_string(),
                args: vec![],
                ret_ty: Type::Int(64),
            },
        );
        func.set_terminator(entry, Terminator::Ret { value: None });

        // The call result is unused but the call has effects; the store
        // keeps its alloca alive.
        assert!(!run(&mut func));
        assert_eq!(func.blocks[0].insts.len(), 3);
    }

    #[test]
    fn test_used_values_kept() {
        let mut func = Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        let entry = func.add_block(None);
        let arg = func.arg(0);
        let one = func.const_int(Type::Int(64), 1);
        let sum = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: arg,
                    rhs: one,
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(sum) });

        assert!(!run(&mut func));
        assert_eq!(func.blocks[0].insts.len(), 1);
    }
}
