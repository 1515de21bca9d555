//! Functions, basic blocks, and instructions.
//!
//! Instructions follow a `dest = op(operands)` form with explicit operands,
//! and every basic block ends in exactly one terminator. Values are stored
//! in a per-function arena and referenced by [`ValueId`]; instructions live
//! in a per-function arena referenced by [`InstId`], with blocks holding
//! ordered instruction-id lists. This keeps splicing (inlining, block
//! splitting) cheap: moving an instruction never invalidates the ids that
//! reference it.
//!
//! # Thread Safety
//!
//! All types in this module are `Send` and `Sync`.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::ir::{FnSig, Type};

/// Identifies a value within one function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Identifies a basic block within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Identifies an instruction within one function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// Integer constant of the given type. The value is stored
    /// zero-extended; signedness is an interpretation of the consumer.
    Int {
        /// The integer type of the constant.
        ty: Type,
        /// The constant bits, zero-extended to 64.
        value: u64,
    },
    /// The null pointer.
    NullPtr,
    /// The all-zero value of the given type (`zeroinitializer`).
    Zero(Type),
    /// An undefined value of the given type.
    Undef(Type),
    /// The address of a module-level symbol (global or function).
    GlobalAddr(String),
    /// The relocatable expression `ptrtoint(&symbol) + offset`, of integer
    /// type `ty`. Used for symbolic program counters.
    SymbolOffset {
        /// The module-level symbol the expression is anchored to.
        symbol: String,
        /// Byte offset added to the symbol address.
        offset: u64,
        /// The integer type of the expression.
        ty: Type,
    },
}

/// How a value comes into existence.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDef {
    /// The `index`-th function argument.
    Arg {
        /// Zero-based argument position.
        index: u32,
        /// The argument's type.
        ty: Type,
    },
    /// A constant.
    Const(Const),
    /// The result of an instruction.
    Inst {
        /// The result type.
        ty: Type,
    },
}

/// Integer binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinOp {
    /// Returns the textual mnemonic used by the IR writer.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::UDiv => "udiv",
            BinOp::SDiv => "sdiv",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
        }
    }

    /// Returns `true` for operations that commute.
    #[must_use]
    pub const fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor
        )
    }
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum IcmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl IcmpPred {
    /// Returns the textual mnemonic used by the IR writer.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            IcmpPred::Eq => "eq",
            IcmpPred::Ne => "ne",
            IcmpPred::Ult => "ult",
            IcmpPred::Ule => "ule",
            IcmpPred::Ugt => "ugt",
            IcmpPred::Uge => "uge",
            IcmpPred::Slt => "slt",
            IcmpPred::Sle => "sle",
            IcmpPred::Sgt => "sgt",
            IcmpPred::Sge => "sge",
        }
    }
}

/// Value cast operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CastOp {
    Zext,
    Sext,
    Trunc,
    PtrToInt,
    IntToPtr,
    Bitcast,
}

impl CastOp {
    /// Returns the textual mnemonic used by the IR writer.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            CastOp::Zext => "zext",
            CastOp::Sext => "sext",
            CastOp::Trunc => "trunc",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::Bitcast => "bitcast",
        }
    }
}

/// A non-terminator operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Stack allocation of one value of `ty`; produces a pointer.
    Alloca {
        /// The allocated type.
        ty: Type,
    },
    /// Memory read of `ty` through `ptr`.
    Load {
        /// The address read from.
        ptr: ValueId,
        /// The type of the value read.
        ty: Type,
    },
    /// Memory write of `value` through `ptr`.
    Store {
        /// The address written to.
        ptr: ValueId,
        /// The value written.
        value: ValueId,
    },
    /// Address of field `index` of a `base_ty` struct at `base`.
    FieldPtr {
        /// Pointer to the aggregate.
        base: ValueId,
        /// The aggregate's type (a [`Type::Struct`]).
        base_ty: Type,
        /// Zero-based field index.
        index: u32,
    },
    /// Integer binary operation.
    Binary {
        /// The operation.
        op: BinOp,
        /// Left operand.
        lhs: ValueId,
        /// Right operand.
        rhs: ValueId,
    },
    /// Integer comparison; produces an `i1`.
    Icmp {
        /// The predicate.
        pred: IcmpPred,
        /// Left operand.
        lhs: ValueId,
        /// Right operand.
        rhs: ValueId,
    },
    /// Value cast to `ty`.
    Cast {
        /// The cast kind.
        op: CastOp,
        /// The value being cast.
        value: ValueId,
        /// The destination type.
        ty: Type,
    },
    /// Direct call to the module-level function named `callee`.
    Call {
        /// Symbol name of the callee.
        callee: String,
        /// Argument values.
        args: Vec<ValueId>,
        /// The callee's return type (carried here so result typing does
        /// not require module access).
        ret_ty: Type,
    },
    /// Functional aggregate update; produces a copy of `agg` with field
    /// `index` replaced by `elem`.
    InsertValue {
        /// The aggregate being updated.
        agg: ValueId,
        /// The replacement element.
        elem: ValueId,
        /// Zero-based field index.
        index: u32,
    },
    /// Reads field `index` out of the aggregate `agg`.
    ExtractValue {
        /// The aggregate being read.
        agg: ValueId,
        /// Zero-based field index.
        index: u32,
    },
    /// Two-way value selection on an `i1` condition.
    Select {
        /// The condition.
        cond: ValueId,
        /// Value when the condition is 1.
        if_true: ValueId,
        /// Value when the condition is 0.
        if_false: ValueId,
    },
    /// SSA merge point. Only introduced by memory-to-register promotion.
    Phi {
        /// The merged type.
        ty: Type,
        /// `(predecessor, value)` pairs, one per incoming edge.
        incomings: Vec<(BlockId, ValueId)>,
    },
}

impl Op {
    /// Returns the result type of this operation, or `None` if it produces
    /// no value.
    #[must_use]
    pub fn result_type(&self, func: &Function) -> Option<Type> {
        match self {
            Op::Alloca { .. } | Op::FieldPtr { .. } => Some(Type::Ptr),
            Op::Load { ty, .. } => Some(ty.clone()),
            Op::Store { .. } => None,
            Op::Binary { lhs, .. } => Some(func.value_type(*lhs)),
            Op::Icmp { .. } => Some(Type::Int(1)),
            Op::Cast { ty, .. } => Some(ty.clone()),
            Op::Call { ret_ty, .. } => {
                if ret_ty.is_void() {
                    None
                } else {
                    Some(ret_ty.clone())
                }
            }
            Op::InsertValue { agg, .. } => Some(func.value_type(*agg)),
            Op::ExtractValue { agg, index } => match func.value_type(*agg) {
                Type::Struct(fields) => fields.get(*index as usize).cloned(),
                other => Some(other),
            },
            Op::Select { if_true, .. } => Some(func.value_type(*if_true)),
            Op::Phi { ty, .. } => Some(ty.clone()),
        }
    }

    /// Returns `true` if the operation has no side effects and can be
    /// removed when its result is unused.
    #[must_use]
    pub const fn is_pure(&self) -> bool {
        !matches!(self, Op::Store { .. } | Op::Call { .. })
    }

    /// Invokes `f` for every value operand.
    pub fn for_each_operand(&self, mut f: impl FnMut(ValueId)) {
        match self {
            Op::Alloca { .. } => {}
            Op::Load { ptr, .. } => f(*ptr),
            Op::Store { ptr, value } => {
                f(*ptr);
                f(*value);
            }
            Op::FieldPtr { base, .. } => f(*base),
            Op::Binary { lhs, rhs, .. } | Op::Icmp { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Op::Cast { value, .. } => f(*value),
            Op::Call { args, .. } => {
                for arg in args {
                    f(*arg);
                }
            }
            Op::InsertValue { agg, elem, .. } => {
                f(*agg);
                f(*elem);
            }
            Op::ExtractValue { agg, .. } => f(*agg),
            Op::Select {
                cond,
                if_true,
                if_false,
            } => {
                f(*cond);
                f(*if_true);
                f(*if_false);
            }
            Op::Phi { incomings, .. } => {
                for (_, value) in incomings {
                    f(*value);
                }
            }
        }
    }

    /// Invokes `f` with a mutable reference to every value operand.
    pub fn map_operands(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Op::Alloca { .. } => {}
            Op::Load { ptr, .. } => f(ptr),
            Op::Store { ptr, value } => {
                f(ptr);
                f(value);
            }
            Op::FieldPtr { base, .. } => f(base),
            Op::Binary { lhs, rhs, .. } | Op::Icmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Op::Cast { value, .. } => f(value),
            Op::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            Op::InsertValue { agg, elem, .. } => {
                f(agg);
                f(elem);
            }
            Op::ExtractValue { agg, .. } => f(agg),
            Op::Select {
                cond,
                if_true,
                if_false,
            } => {
                f(cond);
                f(if_true);
                f(if_false);
            }
            Op::Phi { incomings, .. } => {
                for (_, value) in incomings {
                    f(value);
                }
            }
        }
    }
}

/// An instruction: an operation plus its optional result value.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    /// The result value, if the operation produces one.
    pub dest: Option<ValueId>,
    /// The operation.
    pub op: Op,
}

/// A basic block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// The block is still under construction.
    None,
    /// Unconditional branch.
    Br {
        /// The successor block.
        target: BlockId,
    },
    /// Two-way branch on an `i1` condition.
    CondBr {
        /// The condition.
        cond: ValueId,
        /// Successor when the condition is 1.
        then_dest: BlockId,
        /// Successor when the condition is 0.
        else_dest: BlockId,
    },
    /// Function return.
    Ret {
        /// The returned value, or `None` for `void`.
        value: Option<ValueId>,
    },
    /// Terminating tail call: transfer to `callee` and return its result.
    TailCall {
        /// Symbol name of the callee.
        callee: String,
        /// Argument values.
        args: Vec<ValueId>,
    },
}

impl Terminator {
    /// Invokes `f` for every value operand.
    pub fn for_each_operand(&self, mut f: impl FnMut(ValueId)) {
        match self {
            Terminator::None | Terminator::Br { .. } => {}
            Terminator::CondBr { cond, .. } => f(*cond),
            Terminator::Ret { value } => {
                if let Some(value) = value {
                    f(*value);
                }
            }
            Terminator::TailCall { args, .. } => {
                for arg in args {
                    f(*arg);
                }
            }
        }
    }

    /// Invokes `f` with a mutable reference to every value operand.
    pub fn map_operands(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Terminator::None | Terminator::Br { .. } => {}
            Terminator::CondBr { cond, .. } => f(cond),
            Terminator::Ret { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            Terminator::TailCall { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
        }
    }

    /// Invokes `f` for every successor block.
    pub fn for_each_successor(&self, mut f: impl FnMut(BlockId)) {
        match self {
            Terminator::Br { target } => f(*target),
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => {
                f(*then_dest);
                f(*else_dest);
            }
            _ => {}
        }
    }

    /// Invokes `f` with a mutable reference to every successor block.
    pub fn map_successors(&mut self, mut f: impl FnMut(&mut BlockId)) {
        match self {
            Terminator::Br { target } => f(target),
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => {
                f(then_dest);
                f(else_dest);
            }
            _ => {}
        }
    }
}

/// A basic block: an ordered instruction list plus a terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Optional decoration name (e.g. `inst_1000`); cleared after cleanup.
    pub name: Option<String>,
    /// Instruction ids in execution order.
    pub insts: Vec<InstId>,
    /// The block terminator.
    pub term: Terminator,
}

impl Block {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            insts: Vec::new(),
            term: Terminator::None,
        }
    }

    /// Returns `true` if the block has neither instructions nor a terminator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty() && matches!(self.term, Terminator::None)
    }
}

/// Symbol linkage of a function or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Visible outside the module.
    External,
    /// Private to the module.
    Internal,
}

/// Inlining disposition of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineHint {
    /// No preference.
    Default,
    /// Must be inlined into callers (semantic bodies).
    AlwaysInline,
    /// Must never be inlined (native wrappers, intrinsics).
    NoInline,
}

/// A function: a signature plus (for definitions) a block list and the
/// value/instruction arenas.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Symbol name.
    pub name: String,
    /// The function signature.
    pub sig: FnSig,
    /// Symbol linkage.
    pub linkage: Linkage,
    /// Inlining disposition.
    pub inline: InlineHint,
    /// `true` for uninterpreted functions that read no memory (type-hint
    /// taints). Such functions are never code-motion barriers.
    pub read_none: bool,
    /// `true` when the declared contract says the function never returns.
    pub no_return: bool,
    /// Calling convention identifier from the declaration; 0 when unknown.
    pub calling_convention: u32,
    /// Basic blocks; index 0 is the entry. Empty for declarations.
    pub blocks: Vec<Block>,
    /// Instruction arena.
    pub insts: Vec<Inst>,
    /// Value arena.
    pub values: Vec<ValueDef>,
    /// Argument values, one per signature parameter.
    pub args: Vec<ValueId>,
    /// Optional decoration names for values; cleared after cleanup.
    pub value_names: FxHashMap<ValueId, String>,
}

impl Function {
    /// Creates a declaration (no body).
    #[must_use]
    pub fn declare(name: impl Into<String>, sig: FnSig, linkage: Linkage) -> Self {
        let mut func = Self {
            name: name.into(),
            sig,
            linkage,
            inline: InlineHint::Default,
            read_none: false,
            no_return: false,
            calling_convention: 0,
            blocks: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
            args: Vec::new(),
            value_names: FxHashMap::default(),
        };
        func.create_args();
        func
    }

    fn create_args(&mut self) {
        for (index, ty) in self.sig.params.clone().into_iter().enumerate() {
            let id = self.new_value(ValueDef::Arg {
                index: index as u32,
                ty,
            });
            self.args.push(id);
        }
    }

    /// Returns `true` if this function has no body.
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the `index`-th argument value.
    #[must_use]
    pub fn arg(&self, index: usize) -> ValueId {
        self.args[index]
    }

    /// Appends a new basic block and returns its id.
    pub fn add_block(&mut self, name: Option<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(name));
        id
    }

    /// Adds a value definition to the arena.
    pub fn new_value(&mut self, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(def);
        id
    }

    /// Creates an integer constant.
    pub fn const_int(&mut self, ty: Type, value: u64) -> ValueId {
        let masked = match ty.int_bits() {
            Some(bits) if bits < 64 => value & ((1u64 << bits) - 1),
            _ => value,
        };
        self.new_value(ValueDef::Const(Const::Int { ty, value: masked }))
    }

    /// Creates an undefined value.
    pub fn undef(&mut self, ty: Type) -> ValueId {
        self.new_value(ValueDef::Const(Const::Undef(ty)))
    }

    /// Creates a null pointer constant.
    pub fn null_ptr(&mut self) -> ValueId {
        self.new_value(ValueDef::Const(Const::NullPtr))
    }

    /// Creates an all-zero constant of `ty`.
    pub fn zero(&mut self, ty: Type) -> ValueId {
        self.new_value(ValueDef::Const(Const::Zero(ty)))
    }

    /// Creates an address-of-symbol constant.
    pub fn global_addr(&mut self, symbol: impl Into<String>) -> ValueId {
        self.new_value(ValueDef::Const(Const::GlobalAddr(symbol.into())))
    }

    /// Creates a `ptrtoint(&symbol) + offset` constant expression.
    pub fn symbol_offset(&mut self, symbol: impl Into<String>, offset: u64, ty: Type) -> ValueId {
        self.new_value(ValueDef::Const(Const::SymbolOffset {
            symbol: symbol.into(),
            offset,
            ty,
        }))
    }

    /// Appends `op` to `block` and returns its result value, if any.
    pub fn push(&mut self, block: BlockId, op: Op) -> Option<ValueId> {
        let result_ty = op.result_type(self);
        let dest = result_ty.map(|ty| self.new_value(ValueDef::Inst { ty }));
        let inst_id = InstId(self.insts.len() as u32);
        self.insts.push(Inst { dest, op });
        self.blocks[block.0 as usize].insts.push(inst_id);
        dest
    }

    /// Inserts `op` into `block` at `position` and returns its result
    /// value, if any.
    pub fn insert(&mut self, block: BlockId, position: usize, op: Op) -> Option<ValueId> {
        let result_ty = op.result_type(self);
        let dest = result_ty.map(|ty| self.new_value(ValueDef::Inst { ty }));
        let inst_id = InstId(self.insts.len() as u32);
        self.insts.push(Inst { dest, op });
        self.blocks[block.0 as usize].insts.insert(position, inst_id);
        dest
    }

    /// Sets `block`'s terminator.
    pub fn set_terminator(&mut self, block: BlockId, term: Terminator) {
        self.blocks[block.0 as usize].term = term;
    }

    /// Returns the type of `value`.
    #[must_use]
    pub fn value_type(&self, value: ValueId) -> Type {
        match &self.values[value.0 as usize] {
            ValueDef::Arg { ty, .. } | ValueDef::Inst { ty } => ty.clone(),
            ValueDef::Const(c) => match c {
                Const::Int { ty, .. } => ty.clone(),
                Const::NullPtr | Const::GlobalAddr(_) => Type::Ptr,
                Const::Zero(ty) | Const::Undef(ty) => ty.clone(),
                Const::SymbolOffset { ty, .. } => ty.clone(),
            },
        }
    }

    /// Returns the constant integer value of `value`, if it is one.
    #[must_use]
    pub fn as_const_int(&self, value: ValueId) -> Option<u64> {
        match &self.values[value.0 as usize] {
            ValueDef::Const(Const::Int { value, .. }) => Some(*value),
            _ => None,
        }
    }

    /// Returns `true` if `value` is an undefined constant.
    #[must_use]
    pub fn is_undef(&self, value: ValueId) -> bool {
        matches!(
            &self.values[value.0 as usize],
            ValueDef::Const(Const::Undef(_))
        )
    }

    /// Returns a reference to the instruction with id `id`.
    #[must_use]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0 as usize]
    }

    /// Returns a mutable reference to the instruction with id `id`.
    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.0 as usize]
    }

    /// Computes the predecessor lists of all blocks.
    #[must_use]
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for (index, block) in self.blocks.iter().enumerate() {
            block
                .term
                .for_each_successor(|succ| preds[succ.0 as usize].push(BlockId(index as u32)));
        }
        preds
    }

    /// Replaces every use of `from` with `to` across the whole body.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) {
        for inst in &mut self.insts {
            inst.op.map_operands(|operand| {
                if *operand == from {
                    *operand = to;
                }
            });
        }
        for block in &mut self.blocks {
            block.term.map_operands(|operand| {
                if *operand == from {
                    *operand = to;
                }
            });
        }
    }

    /// Assigns a decoration name to a value.
    pub fn set_value_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.value_names.insert(value, name.into());
    }

    /// Clears all block and value decoration names.
    pub fn clear_names(&mut self) {
        for block in &mut self.blocks {
            block.name = None;
        }
        self.value_names.clear();
    }

    /// Erases the body, leaving a declaration shell. Signature, linkage,
    /// and attributes are retained.
    pub fn erase_body(&mut self) {
        self.blocks.clear();
        self.insts.clear();
        self.values.clear();
        self.args.clear();
        self.value_names.clear();
        self.create_args();
    }

    /// Invokes `f` for every call-site callee name in the body, including
    /// tail calls.
    pub fn for_each_callee(&self, mut f: impl FnMut(&str)) {
        for block in &self.blocks {
            for &inst_id in &block.insts {
                if let Op::Call { callee, .. } = &self.insts[inst_id.0 as usize].op {
                    f(callee);
                }
            }
            if let Terminator::TailCall { callee, .. } = &block.term {
                f(callee);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_func() -> Function {
        Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        )
    }

    #[test]
    fn test_declaration_has_no_body() {
        let func = make_func();
        assert!(func.is_declaration());
        assert_eq!(func.args.len(), 1);
        assert_eq!(func.value_type(func.arg(0)), Type::Int(64));
    }

    #[test]
    fn test_push_assigns_result_values() {
        let mut func = make_func();
        let entry = func.add_block(None);
        let one = func.const_int(Type::Int(64), 1);
        let sum = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: func.arg(0),
                    rhs: one,
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(sum) });

        assert!(!func.is_declaration());
        assert_eq!(func.value_type(sum), Type::Int(64));
        assert_eq!(func.blocks[0].insts.len(), 1);
    }

    #[test]
    fn test_store_produces_no_value() {
        let mut func = make_func();
        let entry = func.add_block(None);
        let slot = func.push(entry, Op::Alloca { ty: Type::Int(64) }).unwrap();
        let arg = func.arg(0);
        let result = func.push(
            entry,
            Op::Store {
                ptr: slot,
                value: arg,
            },
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_const_int_masks_to_width() {
        let mut func = make_func();
        let value = func.const_int(Type::Int(8), 0x1ff);
        assert_eq!(func.as_const_int(value), Some(0xff));
    }

    #[test]
    fn test_replace_all_uses() {
        let mut func = make_func();
        let entry = func.add_block(None);
        let one = func.const_int(Type::Int(64), 1);
        let arg = func.arg(0);
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

        let two = func.const_int(Type::Int(64), 2);
        func.replace_all_uses(one, two);

        match &func.inst(InstId(0)).op {
            Op::Binary { rhs, .. } => assert_eq!(*rhs, two),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_predecessors() {
        let mut func = make_func();
        let entry = func.add_block(None);
        let a = func.add_block(None);
        let b = func.add_block(None);
        let cond = func.const_int(Type::Int(1), 1);
        func.set_terminator(
            entry,
            Terminator::CondBr {
                cond,
                then_dest: a,
                else_dest: b,
            },
        );
        func.set_terminator(a, Terminator::Br { target: b });
        func.set_terminator(b, Terminator::Ret { value: None });

        let preds = func.predecessors();
        assert_eq!(preds[a.0 as usize], vec![entry]);
        assert_eq!(preds[b.0 as usize], vec![entry, a]);
    }

    #[test]
    fn test_erase_body_keeps_signature() {
        let mut func = make_func();
        let entry = func.add_block(None);
        func.set_terminator(entry, Terminator::Ret { value: None });
        assert!(!func.is_declaration());

        func.erase_body();
        assert!(func.is_declaration());
        assert_eq!(func.sig.params.len(), 1);
        assert_eq!(func.args.len(), 1);
    }
}
