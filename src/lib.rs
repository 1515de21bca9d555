// Copyright 2025-2026 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![allow(dead_code)]

//! # liftscope
//!
//! A cross-platform library for lifting machine-code functions, described by a
//! declarative JSON specification, into a typed intermediate representation.
//! `liftscope` speculatively decodes instructions over possibly-partial
//! memory, recovers control flow (including delay slots, tail calls, and
//! indirect transfers), and presents each lifted function with its
//! calling-convention-native signature rather than a raw CPU-state-threading
//! form.
//!
//! # Architecture
//!
//! The library is organized into layers that mirror the flow of a lift:
//!
//! - **Specification Layer**: JSON parsing, declarations, and the [`spec::Program`] store
//! - **Provider Layer**: the memory/type/control-flow oracles the lifter consumes
//! - **Architecture Layer**: per-target decoding and instruction semantics
//! - **Lifting Layer**: the work-list driver, two-layer function construction, and entity registry
//! - **IR Layer**: the output language, with textual and binary writers
//! - **Compiler Layer**: recursive inlining plus the fixed local cleanup pipeline
//!
//! ## Key Components
//!
//! - [`lifter::EntityLifter`] - main entry point; lifts entities into an output module
//! - [`spec::parse_program`] - JSON specification to [`spec::Program`]
//! - [`arch::build`] - architecture backend construction
//! - [`ir::Module`] - the lifted output
//! - [`crate::Error`] and [`crate::Result`] - error handling
//!
//! # Two layers per function
//!
//! Every lifted address produces two cooperating functions. The *semantic
//! body* has the fixed shape `(state*, pc, mem) -> mem` and threads a
//! synthetic CPU state through per-instruction semantics. The *native
//! wrapper* carries the declared high-level signature: it allocates the
//! state, marshals arguments in, calls the body, marshals return values
//! out, and hands the final memory pointer to a declared escape function so
//! late writes stay observable. The body is then recursively inlined into
//! the wrapper and a fixed cleanup pipeline (CFG simplification, promotion,
//! reassociation, store/code elimination, scalar replacement, combining)
//! runs over the result.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use liftscope::lifter::{EntityLifter, LifterOptions};
//! use liftscope::spec::parse_program;
//!
//! let text = std::fs::read_to_string("spec.json")?;
//! let program = parse_program(&text, None, None)?;
//!
//! let mut lifter = EntityLifter::new(
//!     program.arch().clone(),
//!     LifterOptions::default(),
//!     &program,
//!     &program,
//!     &program,
//! );
//! program.for_each_variable(|decl| {
//!     lifter.lift_variable(decl);
//! });
//! program.for_each_function(|decl| {
//!     let _ = lifter.lift_entity(decl);
//! });
//!
//! println!("{}", lifter.module());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Output ABI
//!
//! Lifted IR references a small set of reserved names (`__anvill_pc`,
//! `__anvill_sp`, `__anvill_ra`, `__anvill_reg_*`, `__anvill_type_*`, the
//! control-flow intrinsics, and the memory-escape sink). They are the
//! contract between this crate and downstream passes; see [`abi`].
//!
//! # Thread Safety
//!
//! Provider traits and architecture backends are `Send` and `Sync`. The
//! lifters themselves are single-threaded and not re-entrant: concurrent
//! lifts must use distinct [`lifter::EntityLifter`] instances producing
//! into distinct modules.

#[macro_use]
mod error;

/// Reserved names in output IR: sentinels, intrinsics, prefixes.
pub mod abi;

/// Architecture backends: decoding, categorization, semantics.
pub mod arch;

/// The local cleanup passes and the recursive inliner.
pub mod compiler;

/// The lifted intermediate representation.
pub mod ir;

/// The function lifter, entity registry, and configuration.
pub mod lifter;

/// Provider traits: memory, types, control-flow redirection.
pub mod provider;

/// Specifications: declarations, programs, the JSON reader.
pub mod spec;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust,no_run
/// use liftscope::prelude::*;
///
/// let program = parse_program(r#"{"arch": "amd64"}"#, None, None)?;
/// let mut lifter = EntityLifter::new(
///     program.arch().clone(),
///     LifterOptions::default(),
///     &program,
///     &program,
///     &program,
/// );
/// # Ok::<(), liftscope::Error>(())
/// ```
pub mod prelude;

/// `liftscope` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is
/// always [`crate::Error`], used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `liftscope` Error type.
///
/// The main error type for all operations in this crate. Provides detailed
/// error information for specification parsing, type resolution, and
/// lifting.
pub use error::Error;
