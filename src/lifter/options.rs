//! Lifter configuration.

/// How the state structure is initialized in a native wrapper's prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateInitProcedure {
    /// Leave the allocated structure uninitialized.
    None,
    /// Store an all-zero structure.
    Zeroes,
    /// Store an undefined structure.
    Undef,
    /// Load each top-level register from its `__anvill_reg_<name>` global.
    GlobalVars,
    /// Zero-fill, then load registers from their globals.
    GlobalVarsAndZeroes,
    /// Undef-fill, then load registers from their globals.
    GlobalVarsAndUndef,
}

impl StateInitProcedure {
    /// Returns `true` for the variants that read the per-register globals.
    #[must_use]
    pub const fn uses_register_globals(&self) -> bool {
        matches!(
            self,
            StateInitProcedure::GlobalVars
                | StateInitProcedure::GlobalVarsAndZeroes
                | StateInitProcedure::GlobalVarsAndUndef
        )
    }
}

/// Options controlling how functions are lifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifterOptions {
    /// Initialize the program counter with the relocatable
    /// `&__anvill_pc + address` expression instead of a plain integer.
    /// The taint this leaves on derived values is what makes
    /// cross-references discoverable after optimization.
    pub symbolic_program_counter: bool,
    /// Initialize the stack pointer as the address of `__anvill_sp`.
    pub symbolic_stack_pointer: bool,
    /// Initialize the return address as the address of `__anvill_ra`
    /// instead of the architectural return-address intrinsic.
    pub symbolic_return_address: bool,
    /// Store concrete register values supplied by type hints.
    pub store_inferred_register_values: bool,
    /// Emit `__anvill_type_*` taint calls for pointer-typed hints.
    pub symbolic_register_types: bool,
    /// State structure initialization procedure.
    pub state_struct_init_procedure: StateInitProcedure,
}

impl Default for LifterOptions {
    fn default() -> Self {
        Self {
            symbolic_program_counter: true,
            symbolic_stack_pointer: true,
            symbolic_return_address: true,
            store_inferred_register_values: true,
            symbolic_register_types: true,
            state_struct_init_procedure: StateInitProcedure::Zeroes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_symbolic() {
        let options = LifterOptions::default();
        assert!(options.symbolic_program_counter);
        assert!(options.symbolic_stack_pointer);
        assert!(options.symbolic_return_address);
        assert_eq!(
            options.state_struct_init_procedure,
            StateInitProcedure::Zeroes
        );
    }

    #[test]
    fn test_register_global_variants() {
        assert!(!StateInitProcedure::Zeroes.uses_register_globals());
        assert!(StateInitProcedure::GlobalVars.uses_register_globals());
        assert!(StateInitProcedure::GlobalVarsAndUndef.uses_register_globals());
    }
}
