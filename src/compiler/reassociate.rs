//! Reassociation of constant-bearing chains.
//!
//! Canonicalizes commutative operations to keep constants on the right,
//! then folds `(x op c1) op c2` into `x op (c1 op c2)` for additive and
//! bitwise chains. This exposes work for dead-store elimination and
//! instruction combining, which both key on constant operands.

use crate::ir::{BinOp, Function, InstId, Op, ValueId};

/// Runs the pass. Returns `true` if the function changed.
pub fn run(func: &mut Function) -> bool {
    if func.is_declaration() {
        return false;
    }
    let mut changed = false;

    // Constants to the right of commutative operations.
    for inst_index in 0..func.insts.len() {
        let inst_id = InstId(inst_index as u32);
        let swap = match &func.inst(inst_id).op {
            Op::Binary { op, lhs, rhs } => {
                op.is_commutative()
                    && func.as_const_int(*lhs).is_some()
                    && func.as_const_int(*rhs).is_none()
            }
            _ => false,
        };
        if swap {
            if let Op::Binary { lhs, rhs, .. } = &mut func.inst_mut(inst_id).op {
                std::mem::swap(lhs, rhs);
            }
            changed = true;
        }
    }

    // Fold chains. A definition map is rebuilt lazily because swaps above
    // never change destinations.
    let defs = build_def_map(func);
    for inst_index in 0..func.insts.len() {
        let inst_id = InstId(inst_index as u32);
        let Op::Binary { op, lhs, rhs } = &func.inst(inst_id).op else {
            continue;
        };
        let (op, lhs, rhs) = (*op, *lhs, *rhs);
        let Some(outer_const) = func.as_const_int(rhs) else {
            continue;
        };
        let Some(&inner_id) = defs.get(&lhs) else {
            continue;
        };
        let Op::Binary {
            op: inner_op,
            lhs: inner_lhs,
            rhs: inner_rhs,
        } = &func.inst(inner_id).op
        else {
            continue;
        };
        let (inner_op, inner_lhs, inner_rhs) = (*inner_op, *inner_lhs, *inner_rhs);
        let Some(inner_const) = func.as_const_int(inner_rhs) else {
            continue;
        };

        let combined = match (inner_op, op) {
            (BinOp::Add, BinOp::Add) => inner_const.wrapping_add(outer_const),
            (BinOp::Sub, BinOp::Sub) => inner_const.wrapping_add(outer_const),
            (BinOp::And, BinOp::And) => inner_const & outer_const,
            (BinOp::Or, BinOp::Or) => inner_const | outer_const,
            (BinOp::Xor, BinOp::Xor) => inner_const ^ outer_const,
            _ => continue,
        };

        let ty = func.value_type(rhs);
        let folded = func.const_int(ty, combined);
        if let Op::Binary { lhs, rhs, .. } = &mut func.inst_mut(inst_id).op {
            *lhs = inner_lhs;
            *rhs = folded;
        }
        changed = true;
    }

    changed
}

fn build_def_map(func: &Function) -> rustc_hash::FxHashMap<ValueId, InstId> {
    let mut defs = rustc_hash::FxHashMap::default();
    for block in &func.blocks {
        for &inst_id in &block.insts {
            if let Some(dest) = func.inst(inst_id).dest {
                defs.insert(dest, inst_id);
            }
        }
    }
    defs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FnSig, Linkage, Terminator, Type};

    #[test]
    fn test_add_chain_folds() {
        let mut func = Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        let entry = func.add_block(None);
        let arg = func.arg(0);
        let three = func.const_int(Type::Int(64), 3);
        let four = func.const_int(Type::Int(64), 4);
        let a = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: arg,
                    rhs: three,
                },
            )
            .unwrap();
        let b = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: a,
                    rhs: four,
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(b) });

        assert!(run(&mut func));
        let final_inst = *func.blocks[0].insts.last().unwrap();
        match &func.inst(final_inst).op {
            Op::Binary { op: BinOp::Add, lhs, rhs } => {
                assert_eq!(*lhs, arg);
                assert_eq!(func.as_const_int(*rhs), Some(7));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_constant_moves_right() {
        let mut func = Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        let entry = func.add_block(None);
        let arg = func.arg(0);
        let five = func.const_int(Type::Int(64), 5);
        let sum = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: five,
                    rhs: arg,
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(sum) });

        assert!(run(&mut func));
        match &func.inst(*func.blocks[0].insts.last().unwrap()).op {
            Op::Binary { lhs, rhs, .. } => {
                assert_eq!(*lhs, arg);
                assert_eq!(func.as_const_int(*rhs), Some(5));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }
}
