//! Provider seams between the lifter and its caller.
//!
//! The function lifter is written entirely against three small traits: a
//! byte oracle ([`MemoryProvider`]), a type oracle ([`TypeProvider`]), and
//! a target redirection table ([`ControlFlowProvider`]). The
//! [`crate::spec::Program`] type implements all three over a parsed
//! specification, but tests and embedders can substitute their own.

mod control_flow;
mod memory;
mod types;

pub use control_flow::{ControlFlowProvider, NullControlFlowProvider};
pub use memory::{
    has_byte, is_executable, is_valid_address, ByteAvailability, BytePermission, ByteQuery,
    MemoryProvider,
};
pub use types::{RegisterHintVisitor, TypeProvider};
