//! Memory-to-register promotion.
//!
//! Promotes stack slots whose address never escapes - every use is a
//! direct load or store of the slot's element type - into SSA values,
//! inserting phi nodes at join points. Construction follows the
//! sealed-block incremental algorithm: blocks are filled in reverse post
//! order, a block is sealed once all of its predecessors are filled, and
//! reads reaching an unsealed block leave an operand-less phi that is
//! completed at sealing time.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{BlockId, Function, InstId, Op, Type, ValueId};

/// Runs the pass. Returns `true` if any slot was promoted.
pub fn run(func: &mut Function) -> bool {
    if func.is_declaration() {
        return false;
    }
    let reachable = reachable_blocks(func);
    let vars = find_promotable(func, &reachable);
    if vars.is_empty() {
        return false;
    }
    Promoter::new(func, vars, &reachable).promote();
    true
}

fn reachable_blocks(func: &Function) -> Vec<bool> {
    let mut reachable = vec![false; func.blocks.len()];
    let mut stack = vec![BlockId(0)];
    while let Some(block) = stack.pop() {
        if std::mem::replace(&mut reachable[block.0 as usize], true) {
            continue;
        }
        func.blocks[block.0 as usize]
            .term
            .for_each_successor(|succ| stack.push(succ));
    }
    reachable
}

/// Finds allocas whose only uses are same-typed direct loads and stores,
/// all in reachable code.
fn find_promotable(func: &Function, reachable: &[bool]) -> FxHashMap<ValueId, Type> {
    let mut candidates: FxHashMap<ValueId, Type> = FxHashMap::default();
    for (index, block) in func.blocks.iter().enumerate() {
        if !reachable[index] {
            continue;
        }
        for &inst_id in &block.insts {
            let inst = func.inst(inst_id);
            if let (Some(dest), Op::Alloca { ty }) = (inst.dest, &inst.op) {
                candidates.insert(dest, ty.clone());
            }
        }
    }
    if candidates.is_empty() {
        return candidates;
    }

    let mut disqualified: FxHashSet<ValueId> = FxHashSet::default();
    for (index, block) in func.blocks.iter().enumerate() {
        // Any touch from unreachable code keeps the slot in memory.
        let poison_all = !reachable[index];
        for &inst_id in &block.insts {
            if poison_all {
                func.inst(inst_id).op.for_each_operand(|operand| {
                    if candidates.contains_key(&operand) {
                        disqualified.insert(operand);
                    }
                });
                continue;
            }
            match &func.inst(inst_id).op {
                Op::Load { ptr, ty } => {
                    if let Some(elem) = candidates.get(ptr) {
                        if elem != ty {
                            disqualified.insert(*ptr);
                        }
                    }
                }
                Op::Store { ptr, value } => {
                    if candidates.contains_key(value) {
                        disqualified.insert(*value);
                    }
                    if let Some(elem) = candidates.get(ptr) {
                        if &func.value_type(*value) != elem {
                            disqualified.insert(*ptr);
                        }
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
    candidates.retain(|value, _| !disqualified.contains(value));
    candidates
}

fn reverse_post_order(func: &Function) -> Vec<BlockId> {
    let mut visited = vec![false; func.blocks.len()];
    let mut order = Vec::with_capacity(func.blocks.len());

    fn visit(func: &Function, block: BlockId, visited: &mut [bool], order: &mut Vec<BlockId>) {
        if std::mem::replace(&mut visited[block.0 as usize], true) {
            return;
        }
        func.blocks[block.0 as usize]
            .term
            .for_each_successor(|succ| visit(func, succ, visited, order));
        order.push(block);
    }

    visit(func, BlockId(0), &mut visited, &mut order);
    order.reverse();
    order
}

struct Promoter<'f> {
    func: &'f mut Function,
    vars: FxHashMap<ValueId, Type>,
    preds: Vec<Vec<BlockId>>,
    current_def: FxHashMap<(ValueId, u32), ValueId>,
    sealed: Vec<bool>,
    filled: Vec<bool>,
    /// Phis awaiting operands, per unsealed block: `(var, phi inst)`.
    incomplete: FxHashMap<u32, Vec<(ValueId, InstId)>>,
    /// Replaced load results, applied at the end.
    replacements: FxHashMap<ValueId, ValueId>,
    removed: FxHashSet<InstId>,
}

impl<'f> Promoter<'f> {
    fn new(func: &'f mut Function, vars: FxHashMap<ValueId, Type>, reachable: &[bool]) -> Self {
        let mut preds = func.predecessors();
        for block_preds in &mut preds {
            block_preds.retain(|pred| reachable[pred.0 as usize]);
        }
        let blocks = func.blocks.len();
        Self {
            func,
            vars,
            preds,
            current_def: FxHashMap::default(),
            sealed: vec![false; blocks],
            filled: vec![false; blocks],
            incomplete: FxHashMap::default(),
            replacements: FxHashMap::default(),
            removed: FxHashSet::default(),
        }
    }

    fn promote(mut self) {
        let order = reverse_post_order(self.func);

        // Blocks with no predecessors have nothing to wait for.
        for &block in &order {
            if self.preds[block.0 as usize].is_empty() {
                self.sealed[block.0 as usize] = true;
            }
        }

        for &block in &order {
            self.fill_block(block);
            self.filled[block.0 as usize] = true;
            self.seal_ready_blocks(&order);
        }

        self.apply_replacements();
        self.remove_dead_accesses();
    }

    fn fill_block(&mut self, block: BlockId) {
        enum Access {
            Load { var: ValueId, dest: ValueId },
            Store { var: ValueId, value: ValueId },
            Slot,
        }

        let inst_ids: Vec<InstId> = self.func.blocks[block.0 as usize].insts.clone();
        for inst_id in inst_ids {
            let access = {
                let inst = self.func.inst(inst_id);
                match &inst.op {
                    Op::Load { ptr, .. } if self.vars.contains_key(ptr) => Some(Access::Load {
                        var: *ptr,
                        dest: inst.dest.expect("loads produce a value"),
                    }),
                    Op::Store { ptr, value } if self.vars.contains_key(ptr) => {
                        Some(Access::Store {
                            var: *ptr,
                            value: *value,
                        })
                    }
                    Op::Alloca { .. }
                        if inst.dest.is_some_and(|dest| self.vars.contains_key(&dest)) =>
                    {
                        Some(Access::Slot)
                    }
                    _ => None,
                }
            };
            match access {
                Some(Access::Load { var, dest }) => {
                    let value = self.read_variable(var, block);
                    self.replacements.insert(dest, value);
                    self.removed.insert(inst_id);
                }
                Some(Access::Store { var, value }) => {
                    self.current_def.insert((var, block.0), value);
                    self.removed.insert(inst_id);
                }
                Some(Access::Slot) => {
                    self.removed.insert(inst_id);
                }
                None => {}
            }
        }
    }

    fn seal_ready_blocks(&mut self, order: &[BlockId]) {
        for &block in order {
            if self.sealed[block.0 as usize] {
                continue;
            }
            let ready = self.preds[block.0 as usize]
                .iter()
                .all(|pred| self.filled[pred.0 as usize]);
            if !ready {
                continue;
            }
            self.sealed[block.0 as usize] = true;
            if let Some(pending) = self.incomplete.remove(&block.0) {
                for (var, phi_inst) in pending {
                    self.add_phi_operands(var, phi_inst, block);
                }
            }
        }
    }

    fn read_variable(&mut self, var: ValueId, block: BlockId) -> ValueId {
        if let Some(&value) = self.current_def.get(&(var, block.0)) {
            return value;
        }
        let value = if !self.sealed[block.0 as usize] {
            let (phi_value, phi_inst) = self.create_phi(var, block);
            self.incomplete
                .entry(block.0)
                .or_default()
                .push((var, phi_inst));
            phi_value
        } else {
            match self.preds[block.0 as usize].len() {
                0 => {
                    // Read before any write: the value is undefined.
                    let ty = self.vars[&var].clone();
                    self.func.undef(ty)
                }
                1 => {
                    let pred = self.preds[block.0 as usize][0];
                    self.read_variable(var, pred)
                }
                _ => {
                    let (phi_value, phi_inst) = self.create_phi(var, block);
                    self.current_def.insert((var, block.0), phi_value);
                    self.add_phi_operands(var, phi_inst, block);
                    phi_value
                }
            }
        };
        self.current_def.insert((var, block.0), value);
        value
    }

    fn create_phi(&mut self, var: ValueId, block: BlockId) -> (ValueId, InstId) {
        let ty = self.vars[&var].clone();
        let value = self
            .func
            .insert(
                block,
                0,
                Op::Phi {
                    ty,
                    incomings: Vec::new(),
                },
            )
            .expect("phi produces a value");
        let inst_id = self.func.blocks[block.0 as usize].insts[0];
        (value, inst_id)
    }

    fn add_phi_operands(&mut self, var: ValueId, phi_inst: InstId, block: BlockId) {
        let preds = self.preds[block.0 as usize].clone();
        let mut incoming = Vec::with_capacity(preds.len());
        for pred in preds {
            let value = self.read_variable(var, pred);
            incoming.push((pred, value));
        }
        if let Op::Phi { incomings, .. } = &mut self.func.inst_mut(phi_inst).op {
            *incomings = incoming;
        }
    }

    /// Resolves replacement chains (a replaced load feeding another
    /// replaced load) and rewrites every use.
    fn apply_replacements(&mut self) {
        let keys: Vec<ValueId> = self.replacements.keys().copied().collect();
        for from in keys {
            let mut target = self.replacements[&from];
            let mut hops = 0;
            while let Some(&next) = self.replacements.get(&target) {
                target = next;
                hops += 1;
                if hops > self.replacements.len() {
                    break;
                }
            }
            self.func.replace_all_uses(from, target);
        }
    }

    fn remove_dead_accesses(&mut self) {
        for block in &mut self.func.blocks {
            block.insts.retain(|inst_id| !self.removed.contains(inst_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FnSig, Linkage, Terminator};

    fn int_func() -> Function {
        Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        )
    }

    fn count_ops(func: &Function, mut predicate: impl FnMut(&Op) -> bool) -> usize {
        func.blocks
            .iter()
            .flat_map(|block| &block.insts)
            .filter(|&&inst_id| predicate(&func.inst(inst_id).op))
            .count()
    }

    #[test]
    fn test_straight_line_promotion() {
        let mut func = int_func();
        let entry = func.add_block(None);
        let slot = func.push(entry, Op::Alloca { ty: Type::Int(64) }).unwrap();
        let arg = func.arg(0);
        func.push(
            entry,
            Op::Store {
                ptr: slot,
                value: arg,
            },
        );
        let loaded = func
            .push(
                entry,
                Op::Load {
                    ptr: slot,
                    ty: Type::Int(64),
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(loaded) });

        assert!(run(&mut func));
        assert_eq!(count_ops(&func, |op| matches!(op, Op::Load { .. })), 0);
        assert_eq!(count_ops(&func, |op| matches!(op, Op::Store { .. })), 0);
        assert_eq!(count_ops(&func, |op| matches!(op, Op::Alloca { .. })), 0);
        assert_eq!(func.blocks[0].term, Terminator::Ret { value: Some(arg) });
    }

    #[test]
    fn test_diamond_inserts_phi() {
        let mut func = int_func();
        let entry = func.add_block(None);
        let left = func.add_block(None);
        let right = func.add_block(None);
        let exit = func.add_block(None);

        let slot = func.push(entry, Op::Alloca { ty: Type::Int(64) }).unwrap();
        let cond = func.const_int(Type::Int(1), 1);
        func.set_terminator(
            entry,
            Terminator::CondBr {
                cond,
                then_dest: left,
                else_dest: right,
            },
        );

        let one = func.const_int(Type::Int(64), 1);
        func.push(
            left,
            Op::Store {
                ptr: slot,
                value: one,
            },
        );
        func.set_terminator(left, Terminator::Br { target: exit });

        let two = func.const_int(Type::Int(64), 2);
        func.push(
            right,
            Op::Store {
                ptr: slot,
                value: two,
            },
        );
        func.set_terminator(right, Terminator::Br { target: exit });

        let loaded = func
            .push(
                exit,
                Op::Load {
                    ptr: slot,
                    ty: Type::Int(64),
                },
            )
            .unwrap();
        func.set_terminator(exit, Terminator::Ret { value: Some(loaded) });

        assert!(run(&mut func));
        assert_eq!(count_ops(&func, |op| matches!(op, Op::Phi { .. })), 1);
        assert_eq!(count_ops(&func, |op| matches!(op, Op::Store { .. })), 0);
    }

    #[test]
    fn test_loop_reads_through_back_edge() {
        let mut func = int_func();
        let entry = func.add_block(None);
        let header = func.add_block(None);
        let exit = func.add_block(None);

        let slot = func.push(entry, Op::Alloca { ty: Type::Int(64) }).unwrap();
        let zero = func.const_int(Type::Int(64), 0);
        func.push(
            entry,
            Op::Store {
                ptr: slot,
                value: zero,
            },
        );
        func.set_terminator(entry, Terminator::Br { target: header });

        let loaded = func
            .push(
                header,
                Op::Load {
                    ptr: slot,
                    ty: Type::Int(64),
                },
            )
            .unwrap();
        let one = func.const_int(Type::Int(64), 1);
        let next = func
            .push(
                header,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: loaded,
                    rhs: one,
                },
            )
            .unwrap();
        func.push(
            header,
            Op::Store {
                ptr: slot,
                value: next,
            },
        );
        let cond = func.const_int(Type::Int(1), 0);
        func.set_terminator(
            header,
            Terminator::CondBr {
                cond,
                then_dest: header,
                else_dest: exit,
            },
        );

        let result = func
            .push(
                exit,
                Op::Load {
                    ptr: slot,
                    ty: Type::Int(64),
                },
            )
            .unwrap();
        func.set_terminator(exit, Terminator::Ret { value: Some(result) });

        assert!(run(&mut func));
        // The loop header needs a phi merging the initial and incremented
        // values.
        assert!(count_ops(&func, |op| matches!(op, Op::Phi { .. })) >= 1);
        assert_eq!(count_ops(&func, |op| matches!(op, Op::Load { .. })), 0);
    }

    #[test]
    fn test_escaping_slot_not_promoted() {
        let mut func = int_func();
        let entry = func.add_block(None);
        let slot = func.push(entry, Op::Alloca { ty: Type::Int(64) }).unwrap();
        // The address escapes into a call.
        func.push(
            entry,
            Op::Call {
                callee: "sink".to_string(),
                args: vec![slot],
                ret_ty: Type::Void,
            },
        );
        let loaded = func
            .push(
                entry,
                Op::Load {
                    ptr: slot,
                    ty: Type::Int(64),
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(loaded) });

        assert!(!run(&mut func));
        assert_eq!(count_ops(&func, |op| matches!(op, Op::Load { .. })), 1);
    }
}
