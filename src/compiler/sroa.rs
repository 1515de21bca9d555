//! Scalar replacement of aggregates.
//!
//! Splits a struct-typed stack slot into one slot per field when every use
//! is a constant-index field address (or a whole-struct store of a zero or
//! undef constant, which becomes per-field stores). The new scalar slots
//! are then handed straight to memory-to-register promotion, which is
//! what finally dissolves the synthetic CPU state in lifted wrappers.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    compiler::mem2reg,
    ir::{Const, Function, InstId, Op, Type, ValueDef, ValueId},
};

/// Runs the pass. Returns `true` if anything was split or promoted.
pub fn run(func: &mut Function) -> bool {
    if func.is_declaration() {
        return false;
    }
    let mut changed = false;
    while split_one(func) {
        changed = true;
    }
    // Promote the scalars that splitting exposed.
    changed | mem2reg::run(func)
}

struct Candidate {
    alloca_inst: InstId,
    alloca_value: ValueId,
    block: usize,
    position: usize,
    fields: Vec<Type>,
}

fn find_candidate(func: &Function) -> Option<Candidate> {
    let mut candidates: FxHashMap<ValueId, Candidate> = FxHashMap::default();
    for (block_index, block) in func.blocks.iter().enumerate() {
        for (position, &inst_id) in block.insts.iter().enumerate() {
            let inst = func.inst(inst_id);
            if let (Some(dest), Op::Alloca { ty: Type::Struct(fields) }) = (inst.dest, &inst.op) {
                candidates.insert(
                    dest,
                    Candidate {
                        alloca_inst: inst_id,
                        alloca_value: dest,
                        block: block_index,
                        position,
                        fields: fields.clone(),
                    },
                );
            }
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let mut disqualified: FxHashSet<ValueId> = FxHashSet::default();
    for block in &func.blocks {
        for &inst_id in &block.insts {
            match &func.inst(inst_id).op {
                Op::FieldPtr { base, index, .. } => {
                    if let Some(candidate) = candidates.get(base) {
                        if *index as usize >= candidate.fields.len() {
                            disqualified.insert(*base);
                        }
                    }
                }
                Op::Store { ptr, value } => {
                    if candidates.contains_key(value) {
                        disqualified.insert(*value);
                    }
                    if candidates.contains_key(ptr) && !is_fill_constant(func, *value) {
                        disqualified.insert(*ptr);
                    }
                }
                op => op.for_each_operand(|operand| {
                    if candidates.contains_key(&operand) {
                        disqualified.insert(operand);
                    }
                }),
            }
        }
        block.term.for_each_operand(|operand| {
            if candidates.contains_key(&operand) {
                disqualified.insert(operand);
            }
        });
    }

    candidates
        .into_iter()
        .filter(|(value, _)| !disqualified.contains(value))
        .map(|(_, candidate)| candidate)
        .next()
}

fn is_fill_constant(func: &Function, value: ValueId) -> bool {
    matches!(
        &func.values[value.0 as usize],
        ValueDef::Const(Const::Zero(_)) | ValueDef::Const(Const::Undef(_))
    )
}

fn split_one(func: &mut Function) -> bool {
    let Some(candidate) = find_candidate(func) else {
        return false;
    };

    // One scalar slot per field, inserted where the aggregate slot was.
    let block = crate::ir::BlockId(candidate.block as u32);
    let mut field_slots = Vec::with_capacity(candidate.fields.len());
    for (offset, field_ty) in candidate.fields.iter().enumerate() {
        let slot = func
            .insert(
                block,
                candidate.position + offset,
                Op::Alloca {
                    ty: field_ty.clone(),
                },
            )
            .expect("alloca produces a value");
        field_slots.push(slot);
    }

    // Rewrite uses: field addresses become the scalar slots, whole-struct
    // fills become per-field constant stores.
    let mut removed: FxHashSet<InstId> = FxHashSet::default();
    removed.insert(candidate.alloca_inst);

    let mut field_fixes: Vec<(InstId, ValueId, u32)> = Vec::new();
    let mut fill_fixes: Vec<(usize, usize, InstId, bool)> = Vec::new();
    for (block_index, block) in func.blocks.iter().enumerate() {
        for (position, &inst_id) in block.insts.iter().enumerate() {
            let inst = func.inst(inst_id);
            match &inst.op {
                Op::FieldPtr { base, index, .. } if *base == candidate.alloca_value => {
                    let dest = inst.dest.expect("fieldptr produces a value");
                    field_fixes.push((inst_id, dest, *index));
                }
                Op::Store { ptr, value } if *ptr == candidate.alloca_value => {
                    let undef_fill = matches!(
                        &func.values[value.0 as usize],
                        ValueDef::Const(Const::Undef(_))
                    );
                    fill_fixes.push((block_index, position, inst_id, undef_fill));
                }
                _ => {}
            }
        }
    }

    for (inst_id, dest, index) in field_fixes {
        removed.insert(inst_id);
        func.replace_all_uses(dest, field_slots[index as usize]);
    }

    // Apply fills back-to-front so the inserted stores never shift a
    // position that is still to be processed.
    fill_fixes.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
    for (block_index, position, inst_id, undef_fill) in fill_fixes {
        removed.insert(inst_id);
        for (offset, field_ty) in candidate.fields.iter().enumerate() {
            let fill = if undef_fill {
                func.undef(field_ty.clone())
            } else {
                func.zero(field_ty.clone())
            };
            let slot = field_slots[offset];
            func.insert(
                crate::ir::BlockId(block_index as u32),
                position + 1 + offset,
                Op::Store {
                    ptr: slot,
                    value: fill,
                },
            );
        }
    }

    for block in &mut func.blocks {
        block.insts.retain(|inst_id| !removed.contains(inst_id));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FnSig, Linkage, Terminator};

    fn state_like_func() -> Function {
        Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        )
    }

    #[test]
    fn test_struct_slot_dissolves() {
        let mut func = state_like_func();
        let entry = func.add_block(None);
        let state_ty = Type::Struct(vec![Type::Int(64), Type::Int(64)]);
        let state = func
            .push(
                entry,
                Op::Alloca {
                    ty: state_ty.clone(),
                },
            )
            .unwrap();
        let zero = func.zero(state_ty);
        func.push(
            entry,
            Op::Store {
                ptr: state,
                value: zero,
            },
        );
        let field = func
            .push(
                entry,
                Op::FieldPtr {
                    base: state,
                    base_ty: Type::Struct(vec![Type::Int(64), Type::Int(64)]),
                    index: 1,
                },
            )
            .unwrap();
        let arg = func.arg(0);
        func.push(
            entry,
            Op::Store {
                ptr: field,
                value: arg,
            },
        );
        let loaded = func
            .push(
                entry,
                Op::Load {
                    ptr: field,
                    ty: Type::Int(64),
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(loaded) });

        assert!(run(&mut func));
        // Splitting plus promotion leaves a direct return of the argument.
        assert_eq!(func.blocks[0].term, Terminator::Ret { value: Some(arg) });
        let has_field_ptr = func
            .blocks
            .iter()
            .flat_map(|block| &block.insts)
            .any(|&inst_id| matches!(func.inst(inst_id).op, Op::FieldPtr { .. }));
        assert!(!has_field_ptr);
    }

    #[test]
    fn test_escaping_aggregate_kept() {
        let mut func = state_like_func();
        let entry = func.add_block(None);
        let state_ty = Type::Struct(vec![Type::Int(64)]);
        let state = func.push(entry, Op::Alloca { ty: state_ty }).unwrap();
        func.push(
            entry,
            Op::Call {
                callee: "observer".to_string(),
                args: vec![state],
                ret_ty: Type::Void,
            },
        );
        func.set_terminator(entry, Terminator::Ret { value: None });

        assert!(!run(&mut func));
    }
}
