//! Control-flow graph simplification.
//!
//! Three rewrites run to a fixpoint: forwarding of empty blocks,
//! merging of single-predecessor/single-successor chains, and removal of
//! blocks unreachable from the entry. Inlining leaves long chains of
//! trivial blocks behind; this pass collapses them before the value-level
//! passes run.

use rustc_hash::FxHashSet;

use crate::ir::{BlockId, Function, InstId, Op, Terminator};

/// Runs the pass. Returns `true` if the function changed.
pub fn run(func: &mut Function) -> bool {
    if func.is_declaration() {
        return false;
    }
    let mut changed = false;
    loop {
        let mut local = false;
        local |= forward_empty_blocks(func);
        local |= merge_chains(func);
        if !local {
            break;
        }
        changed = true;
    }
    changed | remove_unreachable(func)
}

fn block_has_phis(func: &Function, block: BlockId) -> bool {
    func.blocks[block.0 as usize]
        .insts
        .iter()
        .any(|&inst_id| matches!(func.inst(inst_id).op, Op::Phi { .. }))
}

/// Retargets every edge into `block` to go to `target` instead.
fn forward_empty_blocks(func: &mut Function) -> bool {
    let mut changed = false;
    for index in 1..func.blocks.len() {
        let block = BlockId(index as u32);
        if !func.blocks[index].insts.is_empty() {
            continue;
        }
        let Terminator::Br { target } = &func.blocks[index].term else {
            continue;
        };
        let target = *target;
        if target == block {
            continue;
        }

        let preds = func.predecessors();
        let block_preds = &preds[index];
        if block_preds.is_empty() {
            continue;
        }

        // A phi in the target distinguishes incoming edges; forwarding is
        // only safe when it cannot create an ambiguous duplicate edge.
        if block_has_phis(func, target) {
            let target_preds: FxHashSet<BlockId> =
                preds[target.0 as usize].iter().copied().collect();
            if block_preds.iter().any(|pred| target_preds.contains(pred)) {
                continue;
            }
            let phi_ids: Vec<InstId> = func.blocks[target.0 as usize].insts.clone();
            for inst_id in phi_ids {
                if let Op::Phi { incomings, .. } = &mut func.insts[inst_id.0 as usize].op {
                    if let Some(position) = incomings.iter().position(|(pred, _)| *pred == block) {
                        let (_, value) = incomings.remove(position);
                        for pred in block_preds {
                            incomings.push((*pred, value));
                        }
                    }
                }
            }
        }

        for pred in block_preds.clone() {
            func.blocks[pred.0 as usize].term.map_successors(|succ| {
                if *succ == block {
                    *succ = target;
                }
            });
        }
        changed = true;
    }
    changed
}

/// Merges `a -> b` when `a` ends in an unconditional branch to `b` and `b`
/// has no other predecessors.
fn merge_chains(func: &mut Function) -> bool {
    let mut changed = false;
    loop {
        let preds = func.predecessors();
        let mut merged = false;

        for index in 0..func.blocks.len() {
            let block = BlockId(index as u32);
            let Terminator::Br { target } = &func.blocks[index].term else {
                continue;
            };
            let target = *target;
            if target == block || target.0 == 0 {
                continue;
            }
            if preds[target.0 as usize].len() != 1 {
                continue;
            }

            // Phis in the target have exactly one incoming; resolve them.
            let target_insts: Vec<InstId> = func.blocks[target.0 as usize].insts.clone();
            let mut kept = Vec::with_capacity(target_insts.len());
            for inst_id in target_insts {
                let is_phi = matches!(func.inst(inst_id).op, Op::Phi { .. });
                if is_phi {
                    let (dest, value) = {
                        let inst = func.inst(inst_id);
                        let Op::Phi { incomings, .. } = &inst.op else {
                            unreachable!()
                        };
                        (inst.dest, incomings.first().map(|(_, value)| *value))
                    };
                    if let (Some(dest), Some(value)) = (dest, value) {
                        func.replace_all_uses(dest, value);
                        continue;
                    }
                }
                kept.push(inst_id);
            }

            // Splice the target into its predecessor.
            func.blocks[index].insts.extend(kept);
            let target_term =
                std::mem::replace(&mut func.blocks[target.0 as usize].term, Terminator::None);
            func.blocks[target.0 as usize].insts.clear();
            func.blocks[index].term = target_term;

            // Successor phis now see `block` as the incoming edge.
            let mut successors = Vec::new();
            func.blocks[index]
                .term
                .for_each_successor(|succ| successors.push(succ));
            for successor in successors {
                let phi_ids: Vec<InstId> = func.blocks[successor.0 as usize].insts.clone();
                for inst_id in phi_ids {
                    if let Op::Phi { incomings, .. } = &mut func.insts[inst_id.0 as usize].op {
                        for (pred, _) in incomings {
                            if *pred == target {
                                *pred = block;
                            }
                        }
                    }
                }
            }

            merged = true;
            changed = true;
            break;
        }

        if !merged {
            break;
        }
    }
    changed
}

/// Removes blocks unreachable from the entry and compacts the block list.
fn remove_unreachable(func: &mut Function) -> bool {
    let block_count = func.blocks.len();
    let mut reachable = vec![false; block_count];
    let mut stack = vec![BlockId(0)];
    while let Some(block) = stack.pop() {
        if std::mem::replace(&mut reachable[block.0 as usize], true) {
            continue;
        }
        func.blocks[block.0 as usize]
            .term
            .for_each_successor(|succ| stack.push(succ));
    }

    if reachable.iter().all(|&live| live) {
        return false;
    }

    // Drop phi edges arriving from dead predecessors before compacting.
    for index in 0..block_count {
        if !reachable[index] {
            continue;
        }
        let inst_ids: Vec<InstId> = func.blocks[index].insts.clone();
        for inst_id in inst_ids {
            if let Op::Phi { incomings, .. } = &mut func.insts[inst_id.0 as usize].op {
                incomings.retain(|(pred, _)| reachable[pred.0 as usize]);
            }
        }
    }

    let mut remap = vec![BlockId(0); block_count];
    let mut kept = Vec::with_capacity(block_count);
    for (index, block) in func.blocks.drain(..).enumerate() {
        if reachable[index] {
            remap[index] = BlockId(kept.len() as u32);
            kept.push(block);
        }
    }
    func.blocks = kept;

    for block in &mut func.blocks {
        block
            .term
            .map_successors(|succ| *succ = remap[succ.0 as usize]);
    }
    for inst in &mut func.insts {
        if let Op::Phi { incomings, .. } = &mut inst.op {
            for (pred, _) in incomings {
                *pred = remap[pred.0 as usize];
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FnSig, Linkage, Type};

    fn void_func() -> Function {
        Function::declare("f", FnSig::new(vec![], Type::Void), Linkage::External)
    }

    #[test]
    fn test_merge_linear_chain() {
        let mut func = void_func();
        let a = func.add_block(None);
        let b = func.add_block(None);
        let c = func.add_block(None);
        func.push(b, Op::Alloca { ty: Type::Int(8) });
        func.set_terminator(a, Terminator::Br { target: b });
        func.set_terminator(b, Terminator::Br { target: c });
        func.set_terminator(c, Terminator::Ret { value: None });

        assert!(run(&mut func));
        assert_eq!(func.blocks.len(), 1);
        assert!(matches!(func.blocks[0].term, Terminator::Ret { .. }));
        assert_eq!(func.blocks[0].insts.len(), 1);
    }

    #[test]
    fn test_forward_empty_block() {
        let mut func = void_func();
        let entry = func.add_block(None);
        let empty = func.add_block(None);
        let exit = func.add_block(None);
        let cond = func.const_int(Type::Int(1), 1);
        func.set_terminator(
            entry,
            Terminator::CondBr {
                cond,
                then_dest: empty,
                else_dest: exit,
            },
        );
        func.set_terminator(empty, Terminator::Br { target: exit });
        func.set_terminator(exit, Terminator::Ret { value: None });

        assert!(run(&mut func));
        // The empty block disappears; both edges land on the exit block.
        assert_eq!(func.blocks.len(), 2);
        match func.blocks[0].term {
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => assert_eq!(then_dest, else_dest),
            ref other => panic!("unexpected terminator {other:?}"),
        }
    }

    #[test]
    fn test_remove_unreachable() {
        let mut func = void_func();
        let entry = func.add_block(None);
        let dead = func.add_block(None);
        func.set_terminator(entry, Terminator::Ret { value: None });
        func.set_terminator(dead, Terminator::Br { target: entry });

        assert!(run(&mut func));
        assert_eq!(func.blocks.len(), 1);
    }

    #[test]
    fn test_stable_when_clean() {
        let mut func = void_func();
        let entry = func.add_block(None);
        func.set_terminator(entry, Terminator::Ret { value: None });
        assert!(!run(&mut func));
    }
}
