//! Synthetic CPU state layout.
//!
//! Every semantic effect of a lifted instruction flows through one struct
//! whose fields mirror the architecture's top-level registers. Four
//! pseudo-registers follow the architectural ones:
//!
//! - `PC` / `NEXT_PC` - current and next program counter
//! - `RETURN_PC` - the return address a call semantic expects execution to
//!   resume at
//! - `BRANCH_TAKEN` - an 8-bit flag conditional semantics write and the
//!   control-flow dispatcher reads
//!
//! The layout is derived once per architecture and shared by every lift.

use rustc_hash::FxHashMap;

use crate::{
    arch::Arch,
    ir::{BlockId, Function, Op, Type, ValueId},
};

/// Name of the program-counter pseudo-register.
pub const PC_VAR: &str = "PC";

/// Name of the next-program-counter pseudo-register.
pub const NEXT_PC_VAR: &str = "NEXT_PC";

/// Name of the return-program-counter pseudo-register.
pub const RETURN_PC_VAR: &str = "RETURN_PC";

/// Name of the branch-taken pseudo-register.
pub const BRANCH_TAKEN_VAR: &str = "BRANCH_TAKEN";

/// Field layout of the synthetic state structure.
pub struct StateLayout {
    fields: Vec<(String, Type)>,
    index: FxHashMap<String, u32>,
    struct_ty: Type,
    arch_register_count: usize,
}

impl StateLayout {
    /// Builds the layout for `arch`.
    #[must_use]
    pub fn new(arch: &dyn Arch) -> Self {
        let addr_ty = arch.address_type();
        let mut fields: Vec<(String, Type)> = arch
            .registers()
            .iter()
            .map(|reg| (reg.name.to_string(), reg.ty.clone()))
            .collect();
        let arch_register_count = fields.len();

        fields.push((PC_VAR.to_string(), addr_ty.clone()));
        fields.push((NEXT_PC_VAR.to_string(), addr_ty.clone()));
        fields.push((RETURN_PC_VAR.to_string(), addr_ty));
        fields.push((BRANCH_TAKEN_VAR.to_string(), Type::Int(8)));

        let mut index = FxHashMap::default();
        for (position, (name, _)) in fields.iter().enumerate() {
            let previous = index.insert(name.clone(), position as u32);
            debug_assert!(previous.is_none(), "duplicate state field '{name}'");
        }

        let struct_ty = Type::Struct(fields.iter().map(|(_, ty)| ty.clone()).collect());
        Self {
            fields,
            index,
            struct_ty,
            arch_register_count,
        }
    }

    /// Returns the state structure type.
    #[must_use]
    pub fn struct_type(&self) -> &Type {
        &self.struct_ty
    }

    /// Returns the field index of `name`, if the field exists.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Returns the type of field `name`, if the field exists.
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<&Type> {
        let index = self.field_index(name)?;
        Some(&self.fields[index as usize].1)
    }

    /// Number of architectural (non-pseudo) register fields.
    #[must_use]
    pub fn arch_register_count(&self) -> usize {
        self.arch_register_count
    }

    /// Emits the address of field `name` relative to `state_ptr`.
    ///
    /// The field must exist; layouts are built from the same architecture
    /// that names the registers.
    pub fn field_addr(
        &self,
        func: &mut Function,
        block: BlockId,
        state_ptr: ValueId,
        name: &str,
    ) -> ValueId {
        let index = self
            .field_index(name)
            .unwrap_or_else(|| panic!("state layout has no field '{name}'"));
        func.push(
            block,
            Op::FieldPtr {
                base: state_ptr,
                base_ty: self.struct_ty.clone(),
                index,
            },
        )
        .expect("fieldptr produces a value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;

    #[test]
    fn test_layout_has_pseudo_registers() {
        let arch = arch::build("amd64").unwrap();
        let layout = StateLayout::new(arch.as_ref());

        assert!(layout.field_index(PC_VAR).is_some());
        assert!(layout.field_index(NEXT_PC_VAR).is_some());
        assert!(layout.field_index(RETURN_PC_VAR).is_some());
        assert_eq!(layout.field_type(BRANCH_TAKEN_VAR), Some(&Type::Int(8)));
        assert!(layout.field_index("NO_SUCH_REG").is_none());
    }

    #[test]
    fn test_pseudo_registers_follow_arch_registers() {
        let arch = arch::build("amd64").unwrap();
        let layout = StateLayout::new(arch.as_ref());
        let count = layout.arch_register_count();
        assert_eq!(layout.field_index(PC_VAR), Some(count as u32));
        match layout.struct_type() {
            Type::Struct(fields) => assert_eq!(fields.len(), count + 4),
            other => panic!("unexpected state type {other}"),
        }
    }

    #[test]
    fn test_register_fields_match_arch() {
        let arch = arch::build("amd64").unwrap();
        let layout = StateLayout::new(arch.as_ref());
        for reg in arch.registers() {
            assert_eq!(layout.field_type(reg.name), Some(&reg.ty), "{}", reg.name);
        }
    }
}
