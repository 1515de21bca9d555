//! Machine-code lifting.
//!
//! The lifter turns a declared function ([`crate::spec::FunctionDecl`])
//! into two cooperating IR functions: a *semantic body* that threads a
//! synthetic CPU state, and a *native wrapper* whose signature matches the
//! declaration's calling-convention-native type. The wrapper marshals
//! arguments into the state, calls the body, marshals results out, and the
//! two are then collapsed by recursive inlining plus a fixed cleanup
//! pipeline.
//!
//! # Key Types
//! - [`EntityLifter`] - public entry point; owns the output module
//! - [`FunctionLifter`] - the per-function orchestration core
//! - [`LifterOptions`] / [`StateInitProcedure`] - configuration
//! - [`InstructionDecoder`] - availability-gated decoding
//! - [`SemanticsBuilder`] - the API architecture backends emit through
//!
//! # Example
//!
//! ```rust,no_run
//! use liftscope::lifter::{EntityLifter, LifterOptions};
//! use liftscope::spec::parse_program;
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
//! println!("{}", lifter.module());
//! # Ok::<(), liftscope::Error>(())
//! ```

mod decoder;
mod function;
mod options;
mod registry;
mod semantics;
pub mod state;

pub use decoder::InstructionDecoder;
pub use function::FunctionLifter;
pub use options::{LifterOptions, StateInitProcedure};
pub use registry::EntityLifter;
pub use semantics::SemanticsBuilder;
