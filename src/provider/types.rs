//! Address-keyed type oracle.
//!
//! The type provider is authoritative: the lifter recognizes call and
//! tail-call targets only where the provider supplies a [`FunctionDecl`],
//! and it never invents types on its own. Register hints are advisory;
//! they influence lifted IR (taints, inferred constants) but never change
//! semantics.

use crate::{ir::Type, spec::FunctionDecl};

/// Visitor invoked once per register type hint at an instruction.
///
/// Arguments: register name, hinted high-level type, optional concrete
/// value of the register at that point.
pub type RegisterHintVisitor<'a> = dyn FnMut(&str, &Type, Option<u64>) + 'a;

/// Supplier of function declarations and per-instruction register hints.
pub trait TypeProvider {
    /// Returns the declared function type at `addr`, if one is known.
    fn function_type(&self, addr: u64) -> Option<FunctionDecl>;

    /// Invokes `visitor` for each register type hint attached to the
    /// instruction at `inst_addr` inside the function at `func_addr`.
    fn register_hints_at(
        &self,
        func_addr: u64,
        inst_addr: u64,
        visitor: &mut RegisterHintVisitor<'_>,
    );
}
