//! Specification model: declarations, programs, and the JSON reader.
//!
//! A specification describes *what* to lift: function contracts keyed by
//! address, global variables, raw memory ranges, symbol names, and
//! control-flow redirections. The [`Program`] aggregates all of it and
//! backs the three provider traits the lifter consumes.
//!
//! # Key Types
//! - [`FunctionDecl`] / [`ParameterDecl`] / [`ValueDecl`] - function contracts
//! - [`GlobalVarDecl`] / [`TypedRegisterDecl`] / [`ByteRange`] - other inputs
//! - [`Program`] - the owning store and provider implementation
//!
//! # Entry Points
//! - [`parse_program`] - JSON text to [`Program`]
//! - [`parse_type`] - the nested textual type encoding

mod decl;
mod json;
mod program;
mod types;

pub use decl::{
    ByteRange, FunctionDecl, GlobalVarDecl, ParameterDecl, TypedRegisterDecl, ValueDecl,
    ValueLocation,
};
pub use json::{parse_program, parse_type_str};
pub use program::Program;
pub use types::parse_type;
