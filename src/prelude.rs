//! # liftscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used
//! types from the liftscope library. Import it to get quick access to the
//! essentials for driving a lift.
//!
//! # Usage
//!
//! ```rust,no_run
//! use liftscope::prelude::*;
//!
//! let program = parse_program(r#"{"arch": "amd64"}"#, None, None)?;
//! let mut lifter = EntityLifter::new(
//!     program.arch().clone(),
//!     LifterOptions::default(),
//!     &program,
//!     &program,
//!     &program,
//! );
//! program.for_each_function(|decl| {
//!     let _ = lifter.lift_entity(decl);
//! });
//! # Ok::<(), liftscope::Error>(())
//! ```

pub use crate::{
    arch::{build as build_arch, Arch, ArchName, ArchRef, OsName},
    ir::{FnSig, Function, Module, Type},
    lifter::{EntityLifter, FunctionLifter, LifterOptions, StateInitProcedure},
    provider::{ControlFlowProvider, MemoryProvider, TypeProvider},
    spec::{parse_program, parse_type, FunctionDecl, GlobalVarDecl, Program},
    Error, Result,
};
