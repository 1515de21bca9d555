//! The function lifter.
//!
//! Given a [`FunctionDecl`], drives speculative decoding over the memory
//! provider with a work list of `(instruction, predecessor)` edges, builds
//! the semantic body's control-flow graph by instruction category, and
//! wraps the result in a calling-convention-native function. The two
//! layers are then collapsed: the semantic body is recursively inlined
//! into the wrapper and the fixed local cleanup pipeline runs over it.
//!
//! # Block identity
//!
//! Blocks are keyed by `(from_pc, to_pc)` edges, not by address alone.
//! Distinct predecessors of one address get distinct blocks, which is what
//! lets the work-list loop observe a control transfer into a declared
//! function (tail call, shared prologue, self-tail-call) and splice in a
//! typed call instead of a branch. The first block lifted for an address
//! becomes canonical; later edges to it just branch there.

use log::{error, info};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::{
    abi::{
        INTRINSIC_ASYNC_HYPER_CALL, INTRINSIC_ERROR, INTRINSIC_FUNCTION_CALL,
        INTRINSIC_FUNCTION_RETURN, INTRINSIC_JUMP, LIFTED_SUFFIX, MEM_ARG, MEMORY_ESCAPE, PC_ARG,
        REG_GLOBAL_PREFIX, RETURN_ADDRESS_INTRINSIC, STATE_ARG, SYMBOLIC_PC, SYMBOLIC_RA,
        SYMBOLIC_SP, TYPE_HINT_PREFIX,
    },
    arch::{ArchRef, Category, Instruction},
    compiler,
    ir::{
        BinOp, BlockId, CastOp, FnSig, Function, IcmpPred, InlineHint, Linkage, Module, Op,
        Terminator, Type, ValueId,
    },
    lifter::{
        decoder::InstructionDecoder,
        state::{StateLayout, BRANCH_TAKEN_VAR, NEXT_PC_VAR, PC_VAR, RETURN_PC_VAR},
        LifterOptions, SemanticsBuilder, StateInitProcedure,
    },
    provider::{
        has_byte, is_executable, is_valid_address, ControlFlowProvider, MemoryProvider,
        TypeProvider,
    },
    spec::{FunctionDecl, ValueDecl, ValueLocation},
};

/// Lifts machine-code functions into IR.
///
/// The per-lift state is process-wide for one [`FunctionLifter::lift_function`]
/// call and cleared at its entry; the lifter is not re-entrant. Concurrent
/// lifts must use distinct instances.
pub struct FunctionLifter<'p> {
    options: LifterOptions,
    arch: ArchRef,
    memory: &'p dyn MemoryProvider,
    types: &'p dyn TypeProvider,
    control_flow: &'p dyn ControlFlowProvider,
    layout: StateLayout,

    /// Scratch module holding declarations that persist between lifts
    /// (intrinsics, sentinel globals, previously seen wrappers).
    scratch: Module,

    // Per-lift state, cleared at the start of every lift.
    func_address: u64,
    lifted: Function,
    lifted_name: String,
    state_ptr: ValueId,
    mem_slot: ValueId,
    curr_pc: Option<u64>,
    edge_to_dest_block: FxHashMap<(u64, u64), BlockId>,
    edge_work_list: BTreeSet<(u64, u64)>,
    addr_to_block: FxHashMap<u64, BlockId>,
    addr_to_decl: FxHashMap<u64, FunctionDecl>,
    addr_to_func: FxHashMap<u64, String>,

    // Persists across lifts; consumed by the entity registry.
    func_name_to_address: FxHashMap<String, u64>,
}

fn placeholder_function() -> Function {
    Function::declare("", FnSig::new(vec![], Type::Void), Linkage::Internal)
}

impl<'p> FunctionLifter<'p> {
    /// Creates a lifter over the given providers.
    pub fn new(
        arch: ArchRef,
        options: LifterOptions,
        memory: &'p dyn MemoryProvider,
        types: &'p dyn TypeProvider,
        control_flow: &'p dyn ControlFlowProvider,
    ) -> Self {
        let layout = StateLayout::new(arch.as_ref());
        Self {
            options,
            arch,
            memory,
            types,
            control_flow,
            layout,
            scratch: Module::new("scratch"),
            func_address: 0,
            lifted: placeholder_function(),
            lifted_name: String::new(),
            state_ptr: ValueId(0),
            mem_slot: ValueId(0),
            curr_pc: None,
            edge_to_dest_block: FxHashMap::default(),
            edge_work_list: BTreeSet::new(),
            addr_to_block: FxHashMap::default(),
            addr_to_decl: FxHashMap::default(),
            addr_to_func: FxHashMap::default(),
            func_name_to_address: FxHashMap::default(),
        }
    }

    /// Returns the address behind a generated wrapper name, if the lifter
    /// has declared it.
    #[must_use]
    pub fn address_of_named_function(&self, name: &str) -> Option<u64> {
        self.func_name_to_address.get(name).copied()
    }

    /// Declares the function for `decl` without lifting its body.
    ///
    /// Returns `None` when the entry address is invalid or not executable.
    pub fn declare_function(&mut self, decl: &FunctionDecl) -> Option<String> {
        let (_, availability, permission) = self.memory.query(decl.address);
        if !is_valid_address(availability) || !is_executable(permission) {
            return None;
        }
        Some(self.get_or_declare_function(decl))
    }

    /// Lifts the function described by `decl` and returns its native
    /// wrapper, with the semantic body already inlined and cleaned.
    ///
    /// Returns `None` when the entry address is invalid or not executable.
    /// When the address is valid but its byte is unavailable, the returned
    /// function is a declaration only.
    pub fn lift_function(&mut self, decl: &FunctionDecl) -> Option<Function> {
        // The lifter may be reused; all per-lift state starts empty.
        self.addr_to_decl.clear();
        self.addr_to_func.clear();
        self.edge_work_list.clear();
        self.edge_to_dest_block.clear();
        self.addr_to_block.clear();
        self.curr_pc = None;
        self.state_ptr = ValueId(0);
        self.mem_slot = ValueId(0);
        self.func_address = decl.address;

        let (_, availability, permission) = self.memory.query(decl.address);
        if !is_valid_address(availability) || !is_executable(permission) {
            return None;
        }

        let native_name = self.get_or_declare_function(decl);
        let mut native = self.native_shell(decl, &native_name);

        // Valid and executable, but the byte itself is missing: emit a
        // declaration so callers can still link against it.
        if !has_byte(availability) {
            return Some(native);
        }

        self.begin_semantic_body(&native_name);
        self.visit_instructions();
        self.build_native_wrapper(decl, &mut native);
        self.inline_and_clean(&mut native);

        self.lifted = placeholder_function();
        Some(native)
    }

    fn native_shell(&self, decl: &FunctionDecl, name: &str) -> Function {
        let mut func = Function::declare(name, decl.fn_sig(), Linkage::External);
        func.inline = InlineHint::NoInline;
        func.no_return = decl.is_noreturn;
        func.calling_convention = decl.calling_convention;
        func
    }

    fn get_or_declare_function(&mut self, decl: &FunctionDecl) -> String {
        let name = decl.wrapper_name();
        self.func_name_to_address.insert(name.clone(), decl.address);
        self.addr_to_func
            .entry(decl.address)
            .or_insert_with(|| name.clone());

        let sig = decl.fn_sig();
        let calling_convention = decl.calling_convention;
        let build_name = name.clone();
        let no_return = decl.is_noreturn;
        self.scratch.get_or_declare_function(&name, move || {
            let mut func = Function::declare(build_name, sig, Linkage::External);
            func.inline = InlineHint::NoInline;
            func.no_return = no_return;
            func.calling_convention = calling_convention;
            func
        });
        name
    }

    fn declare_intrinsic(&mut self, name: &str) {
        let sig = FnSig::new(
            vec![Type::Ptr, self.arch.address_type(), Type::Ptr],
            Type::Ptr,
        );
        self.scratch.get_or_declare_function(name, move || {
            let mut func = Function::declare(name.to_string(), sig, Linkage::External);
            func.inline = InlineHint::NoInline;
            func
        });
    }

    /// Sets up the semantic body: a `(state*, pc, mem) -> mem` function
    /// whose entry block materializes the memory slot, forces `PC` and
    /// `NEXT_PC` from the `pc` argument, and branches to the entry
    /// instruction's block (which seeds the work list).
    fn begin_semantic_body(&mut self, native_name: &str) {
        self.lifted_name = format!("{native_name}{LIFTED_SUFFIX}");
        let addr_ty = self.arch.address_type();
        let sig = FnSig::new(vec![Type::Ptr, addr_ty, Type::Ptr], Type::Ptr);
        let mut lifted = Function::declare(self.lifted_name.clone(), sig, Linkage::Internal);
        lifted.inline = InlineHint::AlwaysInline;
        self.lifted = lifted;

        let entry = self.lifted.add_block(None);
        self.state_ptr = self.lifted.arg(STATE_ARG);
        let pc = self.lifted.arg(PC_ARG);
        let mem = self.lifted.arg(MEM_ARG);

        let slot = self
            .lifted
            .push(entry, Op::Alloca { ty: Type::Ptr })
            .expect("alloca produces a value");
        self.lifted.push(
            entry,
            Op::Store {
                ptr: slot,
                value: mem,
            },
        );
        self.mem_slot = slot;

        for field in [NEXT_PC_VAR, PC_VAR] {
            let ptr = self
                .layout
                .field_addr(&mut self.lifted, entry, self.state_ptr, field);
            self.lifted.push(entry, Op::Store { ptr, value: pc });
        }

        let first = self.get_or_create_block(self.func_address);
        self.lifted
            .set_terminator(entry, Terminator::Br { target: first });
    }

    /// Returns the block for the edge `(current instruction, addr)`,
    /// creating it and enqueuing the edge if it does not exist yet.
    ///
    /// The work list is always fed here, without consulting the canonical
    /// address map, so that self-tail-calls are observed as such rather
    /// than as jumps back into the first lifted block.
    fn get_or_create_block(&mut self, addr: u64) -> BlockId {
        let from_pc = self.curr_pc.unwrap_or(0);
        if let Some(&block) = self.edge_to_dest_block.get(&(from_pc, addr)) {
            return block;
        }
        let block = self.lifted.add_block(Some(format!("inst_{addr:x}")));
        self.edge_to_dest_block.insert((from_pc, addr), block);
        self.edge_work_list.insert((addr, from_pc));
        block
    }

    fn get_or_create_target_block(&mut self, addr: u64) -> BlockId {
        let target = self.control_flow.redirection(addr);
        self.get_or_create_block(target)
    }

    fn decode(&self, addr: u64, is_delayed: bool, out: &mut Instruction) -> bool {
        InstructionDecoder::new(self.arch.as_ref(), self.memory).decode_into(
            addr, is_delayed, out,
        )
    }

    fn try_get_target_function_type(&self, address: u64) -> Option<FunctionDecl> {
        let redirected = self.control_flow.redirection(address);

        // If redirection produced nothing, retry the original address but
        // keep the redirected value as the effective entry.
        let mut decl = self.types.function_type(redirected);
        if decl.is_none() && redirected != address {
            decl = self.types.function_type(address);
        }
        let mut decl = decl?;
        decl.address = redirected;
        Some(decl)
    }

    /// Runs the work list: each entry is an edge to an address that needs
    /// decoding and lifting.
    fn visit_instructions(&mut self) {
        let mut inst = Instruction::default();
        while let Some((inst_addr, from_addr)) = self.edge_work_list.pop_first() {
            let block = self.edge_to_dest_block[&(from_addr, inst_addr)];
            if !self.lifted.blocks[block.0 as usize].is_empty() {
                continue;
            }

            // A control-flow edge into a declared function is a tail call
            // or a shared prologue: splice in a typed call and return its
            // memory result. An edge back to our own entry from a nonzero
            // predecessor is a self-tail-call and is treated the same way.
            if inst_addr != self.func_address || from_addr != 0 {
                if let Some(target_decl) = self.try_get_target_function_type(inst_addr) {
                    let called = self
                        .declare_function(&target_decl)
                        .and_then(|name| self.try_call_native_function(&target_decl, &name, block));
                    if let Some(mem) = called {
                        self.lifted
                            .set_terminator(block, Terminator::Ret { value: Some(mem) });
                        continue;
                    }
                    error!(
                        "Failed to call native function 0x{:x} at 0x{inst_addr:x} via \
                         fall-through or tail call from function 0x{:x}",
                        target_decl.address, self.func_address
                    );
                    // Recover by decoding the instructions directly.
                }
            }

            if let Some(&canonical) = self.addr_to_block.get(&inst_addr) {
                // Already lifted via another control-flow edge.
                self.lifted
                    .set_terminator(block, Terminator::Br { target: canonical });
                continue;
            }
            self.addr_to_block.insert(inst_addr, block);

            if !self.decode(inst_addr, false, &mut inst) {
                error!(
                    "Could not decode instruction at 0x{inst_addr:x} reachable from \
                     instruction 0x{from_addr:x} in function at 0x{:x}",
                    self.func_address
                );
                self.terminating_tail_call(block, INTRINSIC_ERROR, true);
                continue;
            }

            let decoded = inst.clone();
            self.visit_instruction(&decoded, block);
        }
    }

    /// Lifts one instruction into `block`, then wires control flow by
    /// category.
    fn visit_instruction(&mut self, inst: &Instruction, block: BlockId) {
        self.curr_pc = Some(inst.pc);

        // Semantics first: even unsupported instructions record their
        // program-counter bookkeeping.
        self.lift_into_block(inst, block, false);

        // Decode the delay slot up front; which paths it lands on is
        // decided per edge by the annulment query.
        let mut delayed_storage = Instruction::default();
        let delayed = if self.arch.may_have_delay_slot(inst) {
            if self.decode(inst.delayed_pc, true, &mut delayed_storage) {
                Some(&delayed_storage)
            } else {
                error!(
                    "Unable to decode or use delayed instruction at 0x{:x}",
                    inst.delayed_pc
                );
                None
            }
        } else {
            None
        };

        if self.options.symbolic_register_types {
            let mut hints: Vec<(String, Type, Option<u64>)> = Vec::new();
            self.types
                .register_hints_at(self.func_address, inst.pc, &mut |name, ty, value| {
                    hints.push((name.to_string(), ty.clone(), value));
                });
            for (name, ty, value) in hints {
                self.visit_typed_hinted_register(block, &name, &ty, value);
            }
        }

        match inst.category {
            Category::Invalid => self.visit_invalid(block),
            Category::Error => self.visit_error(inst, delayed, block),
            Category::Normal | Category::NoOp => self.visit_normal(inst, block),
            Category::DirectJump => self.visit_direct_jump(inst, delayed, block),
            Category::IndirectJump => self.visit_indirect_jump(inst, delayed, block),
            Category::ConditionalIndirectJump => {
                self.visit_conditional_indirect_jump(inst, delayed, block);
            }
            Category::FunctionReturn => self.visit_function_return(inst, delayed, block),
            Category::ConditionalFunctionReturn => {
                self.visit_conditional_function_return(inst, delayed, block);
            }
            // The conditional variant is dispatched identically to the
            // unconditional one; the predicate is not consulted here.
            Category::DirectFunctionCall | Category::ConditionalDirectFunctionCall => {
                self.visit_direct_function_call(inst, delayed, block);
            }
            Category::IndirectFunctionCall => {
                self.visit_indirect_function_call(inst, delayed, block);
            }
            Category::ConditionalIndirectFunctionCall => {
                self.visit_conditional_indirect_function_call(inst, delayed, block);
            }
            Category::ConditionalBranch => self.visit_conditional_branch(inst, delayed, block),
            Category::AsyncHyperCall => self.visit_async_hyper_call(inst, delayed, block),
            Category::ConditionalAsyncHyperCall => {
                self.visit_conditional_async_hyper_call(inst, delayed, block);
            }
        }

        self.curr_pc = None;
    }

    fn lift_into_block(&mut self, inst: &Instruction, block: BlockId, is_delayed: bool) {
        let arch = self.arch.clone();
        let addr_ty = arch.address_type();
        let mut builder =
            SemanticsBuilder::new(&mut self.lifted, block, self.state_ptr, &self.layout, addr_ty);
        arch.lift_instruction(inst, &mut builder, is_delayed);
    }

    fn visit_delayed_instruction(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
        on_taken_path: bool,
    ) {
        if let Some(delayed) = delayed {
            if self
                .arch
                .next_instruction_is_delayed(inst, delayed, on_taken_path)
            {
                self.lift_into_block(delayed, block, true);
            }
        }
    }

    fn load_state_field(&mut self, block: BlockId, field: &str) -> ValueId {
        let ty = self
            .layout
            .field_type(field)
            .expect("pseudo-register exists")
            .clone();
        let ptr = self
            .layout
            .field_addr(&mut self.lifted, block, self.state_ptr, field);
        self.lifted
            .push(block, Op::Load { ptr, ty })
            .expect("load produces a value")
    }

    fn store_state_field(&mut self, block: BlockId, field: &str, value: ValueId) {
        let ptr = self
            .layout
            .field_addr(&mut self.lifted, block, self.state_ptr, field);
        self.lifted.push(block, Op::Store { ptr, value });
    }

    fn load_branch_taken(&mut self, block: BlockId) -> ValueId {
        let flag = self.load_state_field(block, BRANCH_TAKEN_VAR);
        let zero = self.lifted.const_int(Type::Int(8), 0);
        self.lifted
            .push(
                block,
                Op::Icmp {
                    pred: IcmpPred::Ne,
                    lhs: flag,
                    rhs: zero,
                },
            )
            .expect("icmp produces a value")
    }

    fn load_memory_pointer(&mut self, block: BlockId) -> ValueId {
        let slot = self.mem_slot;
        self.lifted
            .push(
                block,
                Op::Load {
                    ptr: slot,
                    ty: Type::Ptr,
                },
            )
            .expect("load produces a value")
    }

    /// Terminates `block` with a tail call to `intrinsic`.
    ///
    /// With `mute_state` set, the state-pointer argument becomes an
    /// undefined value: the only argument of these intrinsics worth
    /// observing is the program counter, and hiding the state pointer
    /// keeps alias conservatism from poisoning what reaches it.
    fn terminating_tail_call(&mut self, block: BlockId, intrinsic: &str, mute_state: bool) {
        self.declare_intrinsic(intrinsic);
        let state = if mute_state {
            self.lifted.undef(Type::Ptr)
        } else {
            self.state_ptr
        };
        let pc = self.load_state_field(block, NEXT_PC_VAR);
        let mem = self.load_memory_pointer(block);
        self.lifted.set_terminator(
            block,
            Terminator::TailCall {
                callee: intrinsic.to_string(),
                args: vec![state, pc, mem],
            },
        );
    }

    /// Adds a plain call to the unknown-callee intrinsic and threads the
    /// memory pointer through it.
    fn add_call_intrinsic(&mut self, block: BlockId) {
        self.declare_intrinsic(INTRINSIC_FUNCTION_CALL);
        let state = self.state_ptr;
        let pc = self.load_state_field(block, NEXT_PC_VAR);
        let mem = self.load_memory_pointer(block);
        let result = self
            .lifted
            .push(
                block,
                Op::Call {
                    callee: INTRINSIC_FUNCTION_CALL.to_string(),
                    args: vec![state, pc, mem],
                    ret_ty: Type::Ptr,
                },
            )
            .expect("intrinsic returns memory");
        let slot = self.mem_slot;
        self.lifted.push(
            block,
            Op::Store {
                ptr: slot,
                value: result,
            },
        );
    }

    fn split_on_branch_taken(&mut self, block: BlockId) -> (BlockId, BlockId) {
        let cond = self.load_branch_taken(block);
        let taken = self.lifted.add_block(None);
        let not_taken = self.lifted.add_block(None);
        self.lifted.set_terminator(
            block,
            Terminator::CondBr {
                cond,
                then_dest: taken,
                else_dest: not_taken,
            },
        );
        (taken, not_taken)
    }

    // Category visitors. These mirror the dispatch table: each one decides
    // where delay slots land and how the block(s) terminate.

    fn visit_invalid(&mut self, block: BlockId) {
        self.terminating_tail_call(block, INTRINSIC_ERROR, true);
    }

    fn visit_error(&mut self, inst: &Instruction, delayed: Option<&Instruction>, block: BlockId) {
        self.visit_delayed_instruction(inst, delayed, block, true);
        self.terminating_tail_call(block, INTRINSIC_ERROR, true);
    }

    fn visit_normal(&mut self, inst: &Instruction, block: BlockId) {
        let target = self.get_or_create_target_block(inst.next_pc);
        self.lifted.set_terminator(block, Terminator::Br { target });
    }

    fn visit_direct_jump(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        self.visit_delayed_instruction(inst, delayed, block, true);
        let target = self.get_or_create_target_block(inst.branch_taken_pc);
        self.lifted.set_terminator(block, Terminator::Br { target });
    }

    fn visit_indirect_jump(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        self.visit_delayed_instruction(inst, delayed, block, true);
        self.terminating_tail_call(block, INTRINSIC_JUMP, false);
    }

    fn visit_conditional_indirect_jump(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        let (taken, not_taken) = self.split_on_branch_taken(block);
        self.visit_delayed_instruction(inst, delayed, taken, true);
        self.visit_delayed_instruction(inst, delayed, not_taken, false);
        self.terminating_tail_call(taken, INTRINSIC_JUMP, false);
        let target = self.get_or_create_target_block(inst.branch_not_taken_pc);
        self.lifted
            .set_terminator(not_taken, Terminator::Br { target });
    }

    fn visit_function_return(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        self.visit_delayed_instruction(inst, delayed, block, true);
        self.terminating_tail_call(block, INTRINSIC_FUNCTION_RETURN, true);
    }

    fn visit_conditional_function_return(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        let (taken, not_taken) = self.split_on_branch_taken(block);
        self.visit_delayed_instruction(inst, delayed, taken, true);
        self.terminating_tail_call(taken, INTRINSIC_FUNCTION_RETURN, true);
        self.visit_delayed_instruction(inst, delayed, not_taken, false);
        let target = self.get_or_create_target_block(inst.branch_not_taken_pc);
        self.lifted
            .set_terminator(not_taken, Terminator::Br { target });
    }

    /// Tries to resolve `inst.branch_taken_pc` to a declared function and
    /// splice in a typed call; degrades to the call intrinsic otherwise.
    fn call_function(&mut self, inst: &Instruction, block: BlockId) {
        match self.try_get_target_function_type(inst.branch_taken_pc) {
            Some(other_decl) => match self.declare_function(&other_decl) {
                Some(name) => {
                    if self
                        .try_call_native_function(&other_decl, &name, block)
                        .is_none()
                    {
                        error!(
                            "Failed to call native function at address 0x{:x} via call at \
                             address 0x{:x} in function at address 0x{:x}",
                            other_decl.address, inst.pc, self.func_address
                        );
                        self.add_call_intrinsic(block);
                    }
                }
                None => {
                    error!(
                        "Failed to call non-executable memory or invalid address 0x{:x} via \
                         call at address 0x{:x} in function at address 0x{:x}",
                        inst.branch_taken_pc, inst.pc, self.func_address
                    );
                    self.add_call_intrinsic(block);
                }
            },
            None => {
                error!(
                    "Missing type information for function at address 0x{:x}, called at \
                     address 0x{:x} in function at address 0x{:x}",
                    inst.branch_taken_pc, inst.pc, self.func_address
                );
                self.add_call_intrinsic(block);
            }
        }
    }

    fn visit_direct_function_call(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        self.visit_delayed_instruction(inst, delayed, block, true);
        self.call_function(inst, block);
        self.visit_after_function_call(inst, block);
    }

    fn visit_indirect_function_call(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        self.visit_delayed_instruction(inst, delayed, block, true);
        self.add_call_intrinsic(block);
        self.visit_after_function_call(inst, block);
    }

    fn visit_conditional_indirect_function_call(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        let (taken, not_taken) = self.split_on_branch_taken(block);
        self.visit_delayed_instruction(inst, delayed, taken, true);
        self.add_call_intrinsic(taken);
        self.visit_after_function_call(inst, taken);
        self.visit_delayed_instruction(inst, delayed, not_taken, false);
        let target = self.get_or_create_target_block(inst.branch_not_taken_pc);
        self.lifted
            .set_terminator(not_taken, Terminator::Br { target });
    }

    fn visit_conditional_branch(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        let (taken, not_taken) = self.split_on_branch_taken(block);
        self.visit_delayed_instruction(inst, delayed, taken, true);
        self.visit_delayed_instruction(inst, delayed, not_taken, false);
        let taken_target = self.get_or_create_target_block(inst.branch_taken_pc);
        self.lifted.set_terminator(
            taken,
            Terminator::Br {
                target: taken_target,
            },
        );
        let not_taken_target = self.get_or_create_target_block(inst.branch_not_taken_pc);
        self.lifted.set_terminator(
            not_taken,
            Terminator::Br {
                target: not_taken_target,
            },
        );
    }

    fn visit_async_hyper_call(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        self.visit_delayed_instruction(inst, delayed, block, true);
        self.terminating_tail_call(block, INTRINSIC_ASYNC_HYPER_CALL, false);
    }

    fn visit_conditional_async_hyper_call(
        &mut self,
        inst: &Instruction,
        delayed: Option<&Instruction>,
        block: BlockId,
    ) {
        let (taken, not_taken) = self.split_on_branch_taken(block);
        self.visit_delayed_instruction(inst, delayed, taken, true);
        self.visit_delayed_instruction(inst, delayed, not_taken, false);
        self.terminating_tail_call(taken, INTRINSIC_ASYNC_HYPER_CALL, false);
        let target = self.get_or_create_target_block(inst.branch_not_taken_pc);
        self.lifted
            .set_terminator(not_taken, Terminator::Br { target });
    }

    /// Figures out where execution resumes after a call, and with which
    /// return-PC value.
    ///
    /// SPARC compilers may follow a call with an `unimp imm22` word that
    /// tells the callee to return a structure of `imm22` bytes; execution
    /// resumes past it. The probe requires all four bytes present and
    /// executable.
    fn load_function_return_address(
        &mut self,
        inst: &Instruction,
        block: BlockId,
    ) -> (u64, ValueId) {
        let pc = inst.branch_not_taken_pc;
        let ret_pc = self.load_state_field(block, RETURN_PC_VAR);
        if !self.arch.is_sparc() {
            return (pc, ret_pc);
        }

        let mut bytes = [0u8; 4];
        for (index, byte) in bytes.iter_mut().enumerate() {
            let (value, availability, permission) = self.memory.query(pc + index as u64);
            if !has_byte(availability) {
                error!(
                    "Byte at address 0x{:x} is not available for inspection to figure out \
                     return address of call instruction at address 0x{pc:x}",
                    pc + index as u64
                );
                return (pc, ret_pc);
            }
            if !is_executable(permission) {
                error!(
                    "Byte at address 0x{:x} being inspected to figure out return address of \
                     call instruction at address 0x{pc:x} is not executable",
                    pc + index as u64
                );
                return (pc, ret_pc);
            }
            *byte = value;
        }

        let word = u32::from_be_bytes(bytes);
        let op = word >> 30;
        let op2 = (word >> 22) & 0x7;
        if op == 0 && op2 == 0 {
            let imm22 = word & 0x3f_ffff;
            info!(
                "Found structure return of size {imm22} to 0x{pc:x} at 0x{:x}",
                inst.pc
            );
            let four = self.lifted.const_int(self.arch.address_type(), 4);
            let adjusted = self
                .lifted
                .push(
                    block,
                    Op::Binary {
                        op: BinOp::Add,
                        lhs: ret_pc,
                        rhs: four,
                    },
                )
                .expect("add produces a value");
            (pc + 4, adjusted)
        } else {
            (pc, ret_pc)
        }
    }

    /// Wires the resumption edge after a call site: both program-counter
    /// pseudo-registers receive the return-PC value, then control branches
    /// to the resume address's block.
    fn visit_after_function_call(&mut self, inst: &Instruction, block: BlockId) {
        let (ret_pc, ret_pc_value) = self.load_function_return_address(inst, block);
        self.store_state_field(block, PC_VAR, ret_pc_value);
        self.store_state_field(block, NEXT_PC_VAR, ret_pc_value);
        let target = self.get_or_create_target_block(ret_pc);
        self.lifted.set_terminator(block, Terminator::Br { target });
    }

    /// Marshals a typed call to another native function from lifted code:
    /// loads the callee's parameters out of the state/memory, calls, and
    /// stores the return values back.
    fn try_call_native_function(
        &mut self,
        decl: &FunctionDecl,
        name: &str,
        block: BlockId,
    ) -> Option<ValueId> {
        if !self.can_marshal(decl) {
            return None;
        }
        self.addr_to_decl
            .entry(decl.address)
            .or_insert_with(|| decl.clone());

        let mut args = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let value = self.load_native_value(block, &param.value);
            args.push(value);
        }

        let ret_ty = decl.fn_sig().ret;
        let result = self.lifted.push(
            block,
            Op::Call {
                callee: name.to_string(),
                args,
                ret_ty,
            },
        );

        match decl.returns.len() {
            0 => {}
            1 => {
                let value = result.expect("non-void call produces a value");
                self.store_native_value(block, &decl.returns[0], value);
            }
            _ => {
                let aggregate = result.expect("non-void call produces a value");
                for (index, ret) in decl.returns.iter().enumerate() {
                    let element = self
                        .lifted
                        .push(
                            block,
                            Op::ExtractValue {
                                agg: aggregate,
                                index: index as u32,
                            },
                        )
                        .expect("extractvalue produces a value");
                    self.store_native_value(block, ret, element);
                }
            }
        }

        // The callee's contract fixes the stack pointer's exit value
        // relative to its entry value.
        if decl.return_stack_pointer_offset != 0 {
            let sp_reg = decl.return_stack_pointer.clone();
            let sp = self.load_state_field(block, &sp_reg);
            let offset = self.lifted.const_int(
                self.arch.address_type(),
                decl.return_stack_pointer_offset as u64,
            );
            let adjusted = self
                .lifted
                .push(
                    block,
                    Op::Binary {
                        op: BinOp::Add,
                        lhs: sp,
                        rhs: offset,
                    },
                )
                .expect("add produces a value");
            self.store_state_field(block, &sp_reg, adjusted);
        }

        Some(self.load_memory_pointer(block))
    }

    /// Checks that every parameter and return location of `decl` can be
    /// marshaled against this architecture's state layout.
    fn can_marshal(&self, decl: &FunctionDecl) -> bool {
        let check = |value: &ValueDecl| match &value.location {
            ValueLocation::Register(name) => self
                .layout
                .field_type(name)
                .is_some_and(|field| casts_exist(field, &value.ty)),
            ValueLocation::Memory { base, .. } => self.layout.field_index(base).is_some(),
        };
        decl.params.iter().all(|param| check(&param.value))
            && decl.returns.iter().all(check)
            && check(&decl.return_address)
            && self
                .layout
                .field_index(&decl.return_stack_pointer)
                .is_some()
    }

    fn load_native_value(&mut self, block: BlockId, value: &ValueDecl) -> ValueId {
        match &value.location {
            ValueLocation::Register(name) => {
                let loaded = self.load_state_field(block, &name.clone());
                adapt_value(&mut self.lifted, block, loaded, &value.ty)
            }
            ValueLocation::Memory { base, offset } => {
                let address = self.native_memory_address(block, &base.clone(), *offset);
                self.lifted
                    .push(
                        block,
                        Op::Load {
                            ptr: address,
                            ty: value.ty.clone(),
                        },
                    )
                    .expect("load produces a value")
            }
        }
    }

    fn store_native_value(&mut self, block: BlockId, value_decl: &ValueDecl, value: ValueId) {
        match &value_decl.location {
            ValueLocation::Register(name) => {
                let name = name.clone();
                let field_ty = self
                    .layout
                    .field_type(&name)
                    .expect("marshaling was pre-checked")
                    .clone();
                let adapted = adapt_value(&mut self.lifted, block, value, &field_ty);
                self.store_state_field(block, &name, adapted);
            }
            ValueLocation::Memory { base, offset } => {
                let address = self.native_memory_address(block, &base.clone(), *offset);
                self.lifted.push(
                    block,
                    Op::Store {
                        ptr: address,
                        value,
                    },
                );
            }
        }
    }

    fn native_memory_address(&mut self, block: BlockId, base: &str, offset: i64) -> ValueId {
        let base_value = self.load_state_field(block, base);
        let offset_value = self
            .lifted
            .const_int(self.arch.address_type(), offset as u64);
        let address = self
            .lifted
            .push(
                block,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: base_value,
                    rhs: offset_value,
                },
            )
            .expect("add produces a value");
        self.lifted
            .push(
                block,
                Op::Cast {
                    op: CastOp::IntToPtr,
                    value: address,
                    ty: Type::Ptr,
                },
            )
            .expect("cast produces a value")
    }

    /// Applies a register type hint at the current instruction (§ type
    /// hints): optionally pins the register to its known concrete value,
    /// and for pointer-typed hints routes the register value through an
    /// uninterpreted `__anvill_type_*` function so the type survives
    /// optimization.
    fn visit_typed_hinted_register(
        &mut self,
        block: BlockId,
        reg_name: &str,
        ty: &Type,
        maybe_value: Option<u64>,
    ) {
        let Some(reg) = self.arch.register_by_name(reg_name).cloned() else {
            return;
        };
        // Only top-level pointer-sized integer registers participate.
        if reg.ty != self.arch.address_type() {
            return;
        }
        if self.options.symbolic_stack_pointer && reg.name == self.arch.stack_pointer_register() {
            return;
        }

        let mut reg_value = None;
        if self.options.store_inferred_register_values {
            if let Some(value) = maybe_value {
                let constant = self.lifted.const_int(reg.ty.clone(), value);
                self.store_state_field(block, reg.name, constant);
                reg_value = Some(constant);
            }
        }

        if !ty.is_ptr() {
            return;
        }

        let value = match reg_value {
            Some(value) => value,
            None => self.load_state_field(block, reg.name),
        };

        let taint_name = format!("{TYPE_HINT_PREFIX}{}", ty.mangled());
        let taint_sig = FnSig::new(vec![reg.ty.clone()], Type::Ptr);
        let build_name = taint_name.clone();
        self.scratch.get_or_declare_function(&taint_name, move || {
            let mut func = Function::declare(build_name, taint_sig, Linkage::External);
            func.read_none = true;
            func
        });

        let tainted = self
            .lifted
            .push(
                block,
                Op::Call {
                    callee: taint_name,
                    args: vec![value],
                    ret_ty: Type::Ptr,
                },
            )
            .expect("taint call produces a value");
        let replacement = self
            .lifted
            .push(
                block,
                Op::Cast {
                    op: CastOp::PtrToInt,
                    value: tainted,
                    ty: reg.ty.clone(),
                },
            )
            .expect("cast produces a value");
        self.store_state_field(block, reg.name, replacement);
    }

    /// Generates the native wrapper body: allocate and initialize the
    /// state, marshal arguments in, call the semantic body, marshal the
    /// return value(s) out, escape the memory pointer, return.
    fn build_native_wrapper(&mut self, decl: &FunctionDecl, native: &mut Function) {
        if !native.is_declaration() {
            return;
        }
        let entry = native.add_block(None);
        let state_ty = self.layout.struct_type().clone();
        let state = native
            .push(
                entry,
                Op::Alloca {
                    ty: state_ty.clone(),
                },
            )
            .expect("alloca produces a value");

        match self.options.state_struct_init_procedure {
            StateInitProcedure::None => {}
            StateInitProcedure::Zeroes => {
                let zero = native.zero(state_ty.clone());
                native.push(
                    entry,
                    Op::Store {
                        ptr: state,
                        value: zero,
                    },
                );
            }
            StateInitProcedure::Undef => {
                let undef = native.undef(state_ty.clone());
                native.push(
                    entry,
                    Op::Store {
                        ptr: state,
                        value: undef,
                    },
                );
            }
            StateInitProcedure::GlobalVars => {
                self.init_state_from_register_globals(native, entry, state);
            }
            StateInitProcedure::GlobalVarsAndZeroes => {
                let zero = native.zero(state_ty.clone());
                native.push(
                    entry,
                    Op::Store {
                        ptr: state,
                        value: zero,
                    },
                );
                self.init_state_from_register_globals(native, entry, state);
            }
            StateInitProcedure::GlobalVarsAndUndef => {
                let undef = native.undef(state_ty.clone());
                native.push(
                    entry,
                    Op::Store {
                        ptr: state,
                        value: undef,
                    },
                );
                self.init_state_from_register_globals(native, entry, state);
            }
        }

        let addr_ty = self.arch.address_type();

        // Program counter: a relocatable expression anchored on the
        // sentinel global, or a plain integer.
        let pc_value = if self.options.symbolic_program_counter {
            self.scratch.get_or_declare_global(SYMBOLIC_PC, Type::Int(8));
            native.symbol_offset(SYMBOLIC_PC, self.func_address, addr_ty.clone())
        } else {
            native.const_int(addr_ty.clone(), self.func_address)
        };
        let pc_ptr = self.layout.field_addr(native, entry, state, PC_VAR);
        native.push(
            entry,
            Op::Store {
                ptr: pc_ptr,
                value: pc_value,
            },
        );

        if self.options.symbolic_stack_pointer {
            self.scratch.get_or_declare_global(SYMBOLIC_SP, Type::Int(8));
            let sp_value = native.symbol_offset(SYMBOLIC_SP, 0, addr_ty.clone());
            let sp_ptr =
                self.layout
                    .field_addr(native, entry, state, self.arch.stack_pointer_register());
            native.push(
                entry,
                Op::Store {
                    ptr: sp_ptr,
                    value: sp_value,
                },
            );
        }

        // Return address, symbolic or architectural.
        let ra_value = if self.options.symbolic_return_address {
            self.scratch.get_or_declare_global(SYMBOLIC_RA, Type::Int(8));
            native.symbol_offset(SYMBOLIC_RA, 0, addr_ty.clone())
        } else {
            let ra_sig = FnSig::new(vec![Type::Int(32)], Type::Ptr);
            self.scratch
                .get_or_declare_function(RETURN_ADDRESS_INTRINSIC, move || {
                    Function::declare(
                        RETURN_ADDRESS_INTRINSIC.to_string(),
                        ra_sig,
                        Linkage::External,
                    )
                });
            let level = native.const_int(Type::Int(32), 0);
            let raw = native
                .push(
                    entry,
                    Op::Call {
                        callee: RETURN_ADDRESS_INTRINSIC.to_string(),
                        args: vec![level],
                        ret_ty: Type::Ptr,
                    },
                )
                .expect("intrinsic produces a value");
            native
                .push(
                    entry,
                    Op::Cast {
                        op: CastOp::PtrToInt,
                        value: raw,
                        ty: addr_ty.clone(),
                    },
                )
                .expect("cast produces a value")
        };
        store_native_value_into(native, entry, &self.layout, state, &decl.return_address, ra_value);

        // Marshal parameters into their declared locations.
        for (index, param) in decl.params.iter().enumerate() {
            let arg = native.arg(index);
            store_native_value_into(native, entry, &self.layout, state, &param.value, arg);
        }

        // Call the semantic body.
        let initial_mem = native.null_ptr();
        let mem = native
            .push(
                entry,
                Op::Call {
                    callee: self.lifted_name.clone(),
                    args: vec![state, pc_value, initial_mem],
                    ret_ty: Type::Ptr,
                },
            )
            .expect("semantic body returns memory");

        // Marshal the return value(s) out.
        let ret_value = match decl.returns.len() {
            0 => None,
            1 => Some(load_native_value_from(
                native,
                entry,
                &self.layout,
                state,
                &decl.returns[0],
            )),
            _ => {
                let ret_ty = decl.fn_sig().ret;
                let mut aggregate = native.undef(ret_ty);
                for (index, ret) in decl.returns.iter().enumerate() {
                    let element =
                        load_native_value_from(native, entry, &self.layout, state, ret);
                    aggregate = native
                        .push(
                            entry,
                            Op::InsertValue {
                                agg: aggregate,
                                elem: element,
                                index: index as u32,
                            },
                        )
                        .expect("insertvalue produces a value");
                }
                Some(aggregate)
            }
        };

        // The memory pointer escapes so the function's final writes stay
        // observable.
        let escape_sig = FnSig::new(vec![Type::Ptr], Type::Void);
        self.scratch.get_or_declare_function(MEMORY_ESCAPE, move || {
            let mut func =
                Function::declare(MEMORY_ESCAPE.to_string(), escape_sig, Linkage::External);
            func.inline = InlineHint::NoInline;
            func
        });
        native.push(
            entry,
            Op::Call {
                callee: MEMORY_ESCAPE.to_string(),
                args: vec![mem],
                ret_ty: Type::Void,
            },
        );

        native.set_terminator(entry, Terminator::Ret { value: ret_value });
    }

    /// Loads each top-level register's initial value from its
    /// `__anvill_reg_<name>` global. The globals mark unmodelled external
    /// inputs that survive optimization as observable uses.
    fn init_state_from_register_globals(
        &mut self,
        native: &mut Function,
        entry: BlockId,
        state: ValueId,
    ) {
        let skip_sp = self.options.symbolic_stack_pointer;
        let sp_name = self.arch.stack_pointer_register();
        let registers: Vec<_> = self.arch.registers().to_vec();
        for reg in registers {
            if skip_sp && reg.name == sp_name {
                continue;
            }
            let global_name = format!("{REG_GLOBAL_PREFIX}{}", reg.name);
            self.scratch
                .get_or_declare_global(&global_name, reg.ty.clone());
            let global = native.global_addr(global_name);
            let value = native
                .push(
                    entry,
                    Op::Load {
                        ptr: global,
                        ty: reg.ty.clone(),
                    },
                )
                .expect("load produces a value");
            let field = self.layout.field_addr(native, entry, state, reg.name);
            native.push(entry, Op::Store { ptr: field, value });
        }
    }

    /// Recursively inlines the semantic body (and anything else inlinable)
    /// into the wrapper, then runs the fixed local cleanup and strips
    /// decoration names.
    fn inline_and_clean(&mut self, native: &mut Function) {
        let lifted_name = self.lifted_name.clone();
        let lifted = &self.lifted;
        let scratch = &self.scratch;
        compiler::inline_all(native, |name: &str| {
            if name == lifted_name {
                Some(lifted)
            } else {
                scratch.function(name)
            }
        });
        compiler::run_local_cleanup(native);
        native.clear_names();
    }

    /// Returns the scratch module (declaration shells and sentinels).
    #[must_use]
    pub fn scratch_module(&self) -> &Module {
        &self.scratch
    }
}

fn casts_exist(from: &Type, to: &Type) -> bool {
    from == to
        || (from.is_int() && to.is_int())
        || (from.is_int() && to.is_ptr())
        || (from.is_ptr() && to.is_int())
}

/// Converts `value` to `target` where a lossless-enough cast exists
/// (integer resize, pointer/integer round trips).
fn adapt_value(func: &mut Function, block: BlockId, value: ValueId, target: &Type) -> ValueId {
    let current = func.value_type(value);
    if &current == target {
        return value;
    }
    let op = match (&current, target) {
        (Type::Int(from), Type::Int(to)) => {
            if from > to {
                CastOp::Trunc
            } else {
                CastOp::Zext
            }
        }
        (Type::Int(_), Type::Ptr) => CastOp::IntToPtr,
        (Type::Ptr, Type::Int(_)) => CastOp::PtrToInt,
        _ => CastOp::Bitcast,
    };
    func.push(
        block,
        Op::Cast {
            op,
            value,
            ty: target.clone(),
        },
    )
    .expect("cast produces a value")
}

fn value_location_address(
    func: &mut Function,
    block: BlockId,
    layout: &StateLayout,
    state: ValueId,
    base: &str,
    offset: i64,
    addr_ty: Type,
) -> ValueId {
    let base_ptr = layout.field_addr(func, block, state, base);
    let base_value = func
        .push(
            block,
            Op::Load {
                ptr: base_ptr,
                ty: addr_ty,
            },
        )
        .expect("load produces a value");
    let offset_value = {
        let ty = func.value_type(base_value);
        func.const_int(ty, offset as u64)
    };
    let address = func
        .push(
            block,
            Op::Binary {
                op: BinOp::Add,
                lhs: base_value,
                rhs: offset_value,
            },
        )
        .expect("add produces a value");
    func.push(
        block,
        Op::Cast {
            op: CastOp::IntToPtr,
            value: address,
            ty: Type::Ptr,
        },
    )
    .expect("cast produces a value")
}

/// Stores `value` into the location `decl` names, relative to `state`.
fn store_native_value_into(
    func: &mut Function,
    block: BlockId,
    layout: &StateLayout,
    state: ValueId,
    decl: &ValueDecl,
    value: ValueId,
) {
    match &decl.location {
        ValueLocation::Register(name) => {
            let field_ty = layout
                .field_type(name)
                .unwrap_or_else(|| panic!("state layout has no field '{name}'"))
                .clone();
            let adapted = adapt_value(func, block, value, &field_ty);
            let ptr = layout.field_addr(func, block, state, name);
            func.push(
                block,
                Op::Store {
                    ptr,
                    value: adapted,
                },
            );
        }
        ValueLocation::Memory { base, offset } => {
            let base_ty = layout
                .field_type(base)
                .unwrap_or_else(|| panic!("state layout has no field '{base}'"))
                .clone();
            let address = value_location_address(func, block, layout, state, base, *offset, base_ty);
            func.push(block, Op::Store { ptr: address, value });
        }
    }
}

/// Loads the value of the location `decl` names, relative to `state`.
fn load_native_value_from(
    func: &mut Function,
    block: BlockId,
    layout: &StateLayout,
    state: ValueId,
    decl: &ValueDecl,
) -> ValueId {
    match &decl.location {
        ValueLocation::Register(name) => {
            let field_ty = layout
                .field_type(name)
                .unwrap_or_else(|| panic!("state layout has no field '{name}'"))
                .clone();
            let ptr = layout.field_addr(func, block, state, name);
            let raw = func
                .push(block, Op::Load { ptr, ty: field_ty })
                .expect("load produces a value");
            adapt_value(func, block, raw, &decl.ty)
        }
        ValueLocation::Memory { base, offset } => {
            let base_ty = layout
                .field_type(base)
                .unwrap_or_else(|| panic!("state layout has no field '{base}'"))
                .clone();
            let address = value_location_address(func, block, layout, state, base, *offset, base_ty);
            func.push(
                block,
                Op::Load {
                    ptr: address,
                    ty: decl.ty.clone(),
                },
            )
            .expect("load produces a value")
        }
    }
}
