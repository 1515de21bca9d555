//! Instruction-semantics emission API.
//!
//! Architecture backends express an instruction's effect by calling into a
//! [`SemanticsBuilder`], which appends IR to the basic block currently
//! being lifted. The builder knows the synthetic state layout, so backends
//! speak in register names and let it produce the field addressing.

use crate::{
    ir::{BinOp, BlockId, CastOp, Function, IcmpPred, Op, Type, ValueId},
    lifter::state::{StateLayout, BRANCH_TAKEN_VAR, NEXT_PC_VAR, PC_VAR},
};

/// Emits state-mutating IR for one instruction into one basic block.
pub struct SemanticsBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
    state_ptr: ValueId,
    layout: &'f StateLayout,
    addr_ty: Type,
}

impl<'f> SemanticsBuilder<'f> {
    /// Creates a builder targeting `block` of `func`.
    pub fn new(
        func: &'f mut Function,
        block: BlockId,
        state_ptr: ValueId,
        layout: &'f StateLayout,
        addr_ty: Type,
    ) -> Self {
        Self {
            func,
            block,
            state_ptr,
            layout,
            addr_ty,
        }
    }

    /// The IR type of a target address.
    #[must_use]
    pub fn addr_type(&self) -> Type {
        self.addr_ty.clone()
    }

    /// Creates an address-sized integer constant.
    pub fn const_addr(&mut self, value: u64) -> ValueId {
        let ty = self.addr_ty.clone();
        self.func.const_int(ty, value)
    }

    /// Creates an integer constant.
    pub fn const_int(&mut self, ty: Type, value: u64) -> ValueId {
        self.func.const_int(ty, value)
    }

    /// Emits the address of register `name` in the state structure.
    pub fn reg_addr(&mut self, name: &str) -> ValueId {
        self.layout
            .field_addr(self.func, self.block, self.state_ptr, name)
    }

    /// Emits a load of register `name`.
    pub fn read_reg(&mut self, name: &str) -> ValueId {
        let ty = self
            .layout
            .field_type(name)
            .unwrap_or_else(|| panic!("state layout has no field '{name}'"))
            .clone();
        let ptr = self.reg_addr(name);
        self.func
            .push(self.block, Op::Load { ptr, ty })
            .expect("load produces a value")
    }

    /// Emits a store of `value` into register `name`.
    pub fn write_reg(&mut self, name: &str, value: ValueId) {
        let ptr = self.reg_addr(name);
        self.func.push(self.block, Op::Store { ptr, value });
    }

    /// Stores concrete `pc`/`next_pc` values into the pseudo-registers.
    ///
    /// Every instruction's semantics begin with this, so downstream passes
    /// can observe which program-counter value each effect belongs to.
    pub fn write_pc_bookkeeping(&mut self, pc: u64, next_pc: u64) {
        let pc_value = self.const_addr(pc);
        self.write_reg(PC_VAR, pc_value);
        let next_value = self.const_addr(next_pc);
        self.write_reg(NEXT_PC_VAR, next_value);
    }

    /// Stores a dynamic target into both `PC` and `NEXT_PC`.
    pub fn write_pc_dynamic(&mut self, target: ValueId) {
        self.write_reg(PC_VAR, target);
        self.write_reg(NEXT_PC_VAR, target);
    }

    /// Records an `i1` branch condition in `BRANCH_TAKEN`.
    pub fn set_branch_taken(&mut self, cond: ValueId) {
        let flag = self.cast(CastOp::Zext, cond, Type::Int(8));
        self.write_reg(BRANCH_TAKEN_VAR, flag);
    }

    /// Records a constant branch decision in `BRANCH_TAKEN`.
    pub fn set_branch_taken_const(&mut self, taken: bool) {
        let flag = self.func.const_int(Type::Int(8), u64::from(taken));
        self.write_reg(BRANCH_TAKEN_VAR, flag);
    }

    /// Stores an `i1` condition into the 8-bit flag register `name`.
    pub fn set_flag(&mut self, name: &str, cond: ValueId) {
        let widened = self.cast(CastOp::Zext, cond, Type::Int(8));
        self.write_reg(name, widened);
    }

    /// Emits a memory load of `ty` from the integer address `addr`.
    pub fn read_mem(&mut self, addr: ValueId, ty: Type) -> ValueId {
        let ptr = self.cast(CastOp::IntToPtr, addr, Type::Ptr);
        self.func
            .push(self.block, Op::Load { ptr, ty })
            .expect("load produces a value")
    }

    /// Emits a memory store of `value` to the integer address `addr`.
    pub fn write_mem(&mut self, addr: ValueId, value: ValueId) {
        let ptr = self.cast(CastOp::IntToPtr, addr, Type::Ptr);
        self.func.push(self.block, Op::Store { ptr, value });
    }

    /// Emits an integer binary operation.
    pub fn binary(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.func
            .push(self.block, Op::Binary { op, lhs, rhs })
            .expect("binary op produces a value")
    }

    /// Emits an integer comparison.
    pub fn icmp(&mut self, pred: IcmpPred, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.func
            .push(self.block, Op::Icmp { pred, lhs, rhs })
            .expect("icmp produces a value")
    }

    /// Emits a cast.
    pub fn cast(&mut self, op: CastOp, value: ValueId, ty: Type) -> ValueId {
        self.func
            .push(self.block, Op::Cast { op, value, ty })
            .expect("cast produces a value")
    }

    /// Emits a select between two values.
    pub fn select(&mut self, cond: ValueId, if_true: ValueId, if_false: ValueId) -> ValueId {
        self.func
            .push(
                self.block,
                Op::Select {
                    cond,
                    if_true,
                    if_false,
                },
            )
            .expect("select produces a value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch,
        ir::{FnSig, Linkage},
        lifter::state::RETURN_PC_VAR,
    };

    fn builder_fixture() -> (Function, StateLayout) {
        let arch = arch::build("amd64").unwrap();
        let layout = StateLayout::new(arch.as_ref());
        let func = Function::declare(
            "t",
            FnSig::new(vec![Type::Ptr], Type::Void),
            Linkage::Internal,
        );
        (func, layout)
    }

    #[test]
    fn test_read_write_reg_emit_field_addressing() {
        let (mut func, layout) = builder_fixture();
        let entry = func.add_block(None);
        let state = func.arg(0);
        let mut builder = SemanticsBuilder::new(&mut func, entry, state, &layout, Type::Int(64));

        let value = builder.read_reg("RAX");
        builder.write_reg("RBX", value);
        builder.write_pc_bookkeeping(0x1000, 0x1002);

        // fieldptr + load, fieldptr + store, then two of each for the pcs.
        assert!(func.blocks[0].insts.len() >= 8);
        let has_field_ptr = func
            .insts
            .iter()
            .any(|inst| matches!(inst.op, Op::FieldPtr { .. }));
        assert!(has_field_ptr);
    }

    #[test]
    fn test_branch_taken_is_widened() {
        let (mut func, layout) = builder_fixture();
        let entry = func.add_block(None);
        let state = func.arg(0);
        let mut builder = SemanticsBuilder::new(&mut func, entry, state, &layout, Type::Int(64));

        let a = builder.const_addr(1);
        let b = builder.const_addr(2);
        let cond = builder.icmp(IcmpPred::Eq, a, b);
        builder.set_branch_taken(cond);

        let has_zext = func.insts.iter().any(|inst| {
            matches!(
                inst.op,
                Op::Cast {
                    op: CastOp::Zext,
                    ..
                }
            )
        });
        assert!(has_zext);
    }

    #[test]
    fn test_return_pc_field_exists() {
        let (_, layout) = builder_fixture();
        assert!(layout.field_index(RETURN_PC_VAR).is_some());
    }
}
