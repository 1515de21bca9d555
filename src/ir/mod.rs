//! The lifted intermediate representation.
//!
//! This is the output language of the lifter: typed functions over an
//! opaque-pointer type model, with `dest = op(operands)` instructions and
//! explicit terminators, grouped into a [`Module`].
//!
//! # Key Types
//! - [`Module`] - Functions and globals keyed by symbol name
//! - [`Function`] - A signature plus blocks and value/instruction arenas
//! - [`Op`] / [`Terminator`] - Operations and block terminators
//! - [`Type`] / [`FnSig`] - The type model
//!
//! # Writers
//! - [`std::fmt::Display`] impls - the textual form (`--ir_out`)
//! - [`bitcode::write_module`] - the compact binary form (`--bc_out`)

pub mod bitcode;
mod display;
mod function;
mod module;
mod types;

pub use function::{
    BinOp, Block, BlockId, CastOp, Const, Function, IcmpPred, InlineHint, Inst, InstId, Linkage,
    Op, Terminator, ValueDef, ValueId,
};
pub use module::{Global, GlobalInit, Module};
pub use types::{FnSig, Type};
