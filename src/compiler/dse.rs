//! Dead store elimination.
//!
//! Removes a store when the same address value is stored again later in
//! the block with no possible intervening read. Aliasing is judged by
//! value identity only - two stores kill each other only through the
//! exact same pointer value - and any load or call conservatively ends
//! every pending kill window.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{Function, InstId, Op};

/// Runs the pass. Returns `true` if any store was removed.
pub fn run(func: &mut Function) -> bool {
    if func.is_declaration() {
        return false;
    }

    let mut dead: FxHashSet<InstId> = FxHashSet::default();
    for block in &func.blocks {
        // Pending stores, keyed by exact pointer value.
        let mut pending: FxHashMap<crate::ir::ValueId, InstId> = FxHashMap::default();
        for &inst_id in &block.insts {
            match &func.inst(inst_id).op {
                Op::Store { ptr, .. } => {
                    if let Some(previous) = pending.insert(*ptr, inst_id) {
                        dead.insert(previous);
                    }
                }
                Op::Load { .. } | Op::Call { .. } => pending.clear(),
                _ => {}
            }
        }
        // The block's terminator may transfer control to code that reads
        // memory; whatever is still pending stays.
    }

    if dead.is_empty() {
        return false;
    }
    for block in &mut func.blocks {
        block.insts.retain(|inst_id| !dead.contains(inst_id));
    }
    true
}
