//! Instruction combining.
//!
//! Local peepholes: constant folding of integer arithmetic, comparisons,
//! and casts; algebraic identities (`x + 0`, `x & ~0`, shifts by zero);
//! pointer/integer round-trip elimination; and select/phi collapses. Runs
//! to a local fixpoint since one fold routinely exposes the next.

use rustc_hash::FxHashMap;

use crate::ir::{BinOp, CastOp, Function, IcmpPred, InstId, Op, Type, ValueId};

/// Runs the pass. Returns `true` if the function changed.
pub fn run(func: &mut Function) -> bool {
    if func.is_declaration() {
        return false;
    }
    let mut changed = false;
    while run_once(func) {
        changed = true;
    }
    changed
}

fn width_of(func: &Function, value: ValueId) -> u16 {
    func.value_type(value).int_bits().unwrap_or(64)
}

fn mask_to(value: u64, bits: u16) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

fn sign_extend(value: u64, bits: u16) -> i64 {
    if bits >= 64 {
        value as i64
    } else {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    }
}

fn fold_binary(op: BinOp, lhs: u64, rhs: u64, bits: u16) -> Option<u64> {
    let value = match op {
        BinOp::Add => lhs.wrapping_add(rhs),
        BinOp::Sub => lhs.wrapping_sub(rhs),
        BinOp::Mul => lhs.wrapping_mul(rhs),
        BinOp::UDiv => {
            if rhs == 0 {
                return None;
            }
            lhs / rhs
        }
        BinOp::SDiv => {
            if rhs == 0 {
                return None;
            }
            let (l, r) = (sign_extend(lhs, bits), sign_extend(rhs, bits));
            l.checked_div(r)? as u64
        }
        BinOp::And => lhs & rhs,
        BinOp::Or => lhs | rhs,
        BinOp::Xor => lhs ^ rhs,
        BinOp::Shl => lhs.wrapping_shl(rhs as u32),
        BinOp::LShr => mask_to(lhs, bits).wrapping_shr(rhs as u32),
        BinOp::AShr => (sign_extend(lhs, bits) >> (rhs as u32).min(63)) as u64,
    };
    Some(mask_to(value, bits))
}

fn fold_icmp(pred: IcmpPred, lhs: u64, rhs: u64, bits: u16) -> bool {
    let (ul, ur) = (mask_to(lhs, bits), mask_to(rhs, bits));
    let (sl, sr) = (sign_extend(lhs, bits), sign_extend(rhs, bits));
    match pred {
        IcmpPred::Eq => ul == ur,
        IcmpPred::Ne => ul != ur,
        IcmpPred::Ult => ul < ur,
        IcmpPred::Ule => ul <= ur,
        IcmpPred::Ugt => ul > ur,
        IcmpPred::Uge => ul >= ur,
        IcmpPred::Slt => sl < sr,
        IcmpPred::Sle => sl <= sr,
        IcmpPred::Sgt => sl > sr,
        IcmpPred::Sge => sl >= sr,
    }
}

enum Rewrite {
    /// Replace the instruction's result with an existing value.
    Value(ValueId),
    /// Replace the instruction's result with a fresh integer constant.
    ConstInt(Type, u64),
}

#[allow(clippy::too_many_lines)]
fn simplify(
    func: &Function,
    defs: &FxHashMap<ValueId, InstId>,
    inst_id: InstId,
) -> Option<Rewrite> {
    let inst = func.inst(inst_id);
    match &inst.op {
        Op::Binary { op, lhs, rhs } => {
            let bits = width_of(func, *lhs);
            let lhs_const = func.as_const_int(*lhs);
            let rhs_const = func.as_const_int(*rhs);

            if let (Some(l), Some(r)) = (lhs_const, rhs_const) {
                let folded = fold_binary(*op, l, r, bits)?;
                return Some(Rewrite::ConstInt(func.value_type(*lhs), folded));
            }

            // Identities with a constant on the right.
            if let Some(r) = rhs_const {
                match op {
                    BinOp::Add | BinOp::Sub | BinOp::Or | BinOp::Xor
                    | BinOp::Shl | BinOp::LShr | BinOp::AShr
                        if r == 0 =>
                    {
                        return Some(Rewrite::Value(*lhs));
                    }
                    BinOp::Mul if r == 1 => return Some(Rewrite::Value(*lhs)),
                    BinOp::Mul if r == 0 => {
                        return Some(Rewrite::ConstInt(func.value_type(*lhs), 0));
                    }
                    BinOp::And if r == mask_to(u64::MAX, bits) => {
                        return Some(Rewrite::Value(*lhs));
                    }
                    BinOp::And if r == 0 => {
                        return Some(Rewrite::ConstInt(func.value_type(*lhs), 0));
                    }
                    _ => {}
                }
            }

            // x - x and x ^ x vanish.
            if lhs == rhs && matches!(op, BinOp::Sub | BinOp::Xor) {
                return Some(Rewrite::ConstInt(func.value_type(*lhs), 0));
            }
            None
        }

        Op::Icmp { pred, lhs, rhs } => {
            let bits = width_of(func, *lhs);
            let l = func.as_const_int(*lhs)?;
            let r = func.as_const_int(*rhs)?;
            let result = fold_icmp(*pred, l, r, bits);
            Some(Rewrite::ConstInt(Type::Int(1), u64::from(result)))
        }

        Op::Cast { op, value, ty } => {
            // Constant casts.
            if let Some(raw) = func.as_const_int(*value) {
                match (op, ty) {
                    (CastOp::Zext | CastOp::Bitcast, Type::Int(to)) => {
                        return Some(Rewrite::ConstInt(Type::Int(*to), raw));
                    }
                    (CastOp::Trunc, Type::Int(to)) => {
                        return Some(Rewrite::ConstInt(Type::Int(*to), mask_to(raw, *to)));
                    }
                    (CastOp::Sext, Type::Int(to)) => {
                        let from = width_of(func, *value);
                        let widened = sign_extend(raw, from) as u64;
                        return Some(Rewrite::ConstInt(Type::Int(*to), mask_to(widened, *to)));
                    }
                    _ => {}
                }
            }

            // Same-type casts and pointer round trips.
            if &func.value_type(*value) == ty {
                return Some(Rewrite::Value(*value));
            }
            if let Some(&def_id) = defs.get(value) {
                if let Op::Cast {
                    op: inner_op,
                    value: inner_value,
                    ..
                } = &func.inst(def_id).op
                {
                    let round_trip = matches!(
                        (inner_op, op),
                        (CastOp::PtrToInt, CastOp::IntToPtr)
                            | (CastOp::IntToPtr, CastOp::PtrToInt)
                    );
                    if round_trip && &func.value_type(*inner_value) == ty {
                        return Some(Rewrite::Value(*inner_value));
                    }
                }
            }
            None
        }

        Op::Select {
            cond,
            if_true,
            if_false,
        } => {
            if let Some(value) = func.as_const_int(*cond) {
                return Some(Rewrite::Value(if value != 0 { *if_true } else { *if_false }));
            }
            if if_true == if_false {
                return Some(Rewrite::Value(*if_true));
            }
            None
        }

        Op::Phi { incomings, .. } => {
            let dest = inst.dest?;
            let mut unique = None;
            for (_, value) in incomings {
                if *value == dest {
                    continue;
                }
                match unique {
                    None => unique = Some(*value),
                    Some(existing) if existing == *value => {}
                    Some(_) => return None,
                }
            }
            unique.map(Rewrite::Value)
        }

        _ => None,
    }
}

fn run_once(func: &mut Function) -> bool {
    let mut defs: FxHashMap<ValueId, InstId> = FxHashMap::default();
    for block in &func.blocks {
        for &inst_id in &block.insts {
            if let Some(dest) = func.inst(inst_id).dest {
                defs.insert(dest, inst_id);
            }
        }
    }

    let mut rewrites: Vec<(InstId, ValueId, ValueId)> = Vec::new();
    let all_insts: Vec<InstId> = func
        .blocks
        .iter()
        .flat_map(|block| block.insts.iter().copied())
        .collect();

    for inst_id in all_insts {
        let Some(dest) = func.inst(inst_id).dest else {
            continue;
        };
        let Some(rewrite) = simplify(func, &defs, inst_id) else {
            continue;
        };
        let replacement = match rewrite {
            Rewrite::Value(value) => value,
            Rewrite::ConstInt(ty, value) => func.const_int(ty, value),
        };
        rewrites.push((inst_id, dest, replacement));
    }

    if rewrites.is_empty() {
        return false;
    }

    let removed: rustc_hash::FxHashSet<InstId> =
        rewrites.iter().map(|(inst_id, _, _)| *inst_id).collect();
    for (_, from, to) in &rewrites {
        func.replace_all_uses(*from, *to);
    }
    for block in &mut func.blocks {
        block.insts.retain(|inst_id| !removed.contains(inst_id));
    }
    true
}
