//! Names that form the ABI between lifted IR and downstream consumers.
//!
//! Everything produced by the lifter that a later pass is expected to
//! recognize is referenced by name, and those names are fixed here. They are
//! not lifter state: the symbols are created in the output module on first
//! use and reused thereafter.
//!
//! # Sentinel globals
//!
//! - [`SYMBOLIC_PC`] - base of the relocatable program-counter expression
//! - [`SYMBOLIC_SP`] - symbolic stack-pointer base
//! - [`SYMBOLIC_RA`] - symbolic return-address base
//! - [`REG_GLOBAL_PREFIX`] - per-register unmodelled-input globals
//!
//! # Intrinsic functions
//!
//! The five control-flow intrinsics share the semantic-body shape
//! `(state*, pc, mem) -> mem` and are declared without bodies. The memory
//! escape function takes the final memory pointer and returns nothing; its
//! only purpose is to keep late memory writes observable.

/// Prefix shared by every symbol this crate introduces into output IR.
pub const NAME_PREFIX: &str = "__anvill_";

/// Base global for the relocatable program-counter constant expression.
pub const SYMBOLIC_PC: &str = "__anvill_pc";

/// Base global for the symbolic stack pointer.
pub const SYMBOLIC_SP: &str = "__anvill_sp";

/// Base global for the symbolic return address.
pub const SYMBOLIC_RA: &str = "__anvill_ra";

/// Prefix of the per-register external globals used by the `GlobalVars`
/// family of state initialization procedures (`__anvill_reg_<name>`).
pub const REG_GLOBAL_PREFIX: &str = "__anvill_reg_";

/// Prefix of the uninterpreted type-hint functions (`__anvill_type_<mangled>`).
pub const TYPE_HINT_PREFIX: &str = "__anvill_type_";

/// Terminator intrinsic for undecodable or trapping instructions.
pub const INTRINSIC_ERROR: &str = "__anvill_error";

/// Terminator intrinsic standing in for an unresolved indirect jump.
pub const INTRINSIC_JUMP: &str = "__anvill_jump";

/// Call intrinsic standing in for a call whose callee type is unknown.
pub const INTRINSIC_FUNCTION_CALL: &str = "__anvill_function_call";

/// Terminator intrinsic marking a return from the lifted function.
pub const INTRINSIC_FUNCTION_RETURN: &str = "__anvill_function_return";

/// Terminator intrinsic for asynchronous hyper calls (system calls, traps).
pub const INTRINSIC_ASYNC_HYPER_CALL: &str = "__anvill_async_hyper_call";

/// Declared sink that consumes the final memory pointer of a native wrapper
/// so dead-store elimination cannot discard the function's last writes.
pub const MEMORY_ESCAPE: &str = "__anvill_memory_escape";

/// Architectural return-address intrinsic used when the return address is
/// initialized concretely rather than symbolically.
pub const RETURN_ADDRESS_INTRINSIC: &str = "llvm.returnaddress";

/// Suffix appended to a native wrapper's name to form its semantic body's name.
pub const LIFTED_SUFFIX: &str = ".lifted";

/// Argument position of the state pointer in a semantic body.
pub const STATE_ARG: usize = 0;

/// Argument position of the program counter in a semantic body.
pub const PC_ARG: usize = 1;

/// Argument position of the memory pointer in a semantic body.
pub const MEM_ARG: usize = 2;

/// Returns `true` if `name` belongs to this crate's output-IR namespace.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with(NAME_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved_name(SYMBOLIC_PC));
        assert!(is_reserved_name("__anvill_reg_RAX"));
        assert!(!is_reserved_name("sub_1000_v_0"));
        assert!(!is_reserved_name(RETURN_ADDRESS_INTRINSIC));
    }
}
