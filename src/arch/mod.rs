//! Architecture backends.
//!
//! Everything the lifter knows about a target architecture flows through
//! the [`Arch`] trait: the register file, instruction decoding (normal and
//! delay-slot), control-flow categorization, delay-slot/annulment rules,
//! and per-instruction semantics emission. The decoded representation is
//! architecture-neutral ([`Instruction`]); backends re-derive their own
//! operation details from the instruction bytes when emitting semantics.
//!
//! # Backends
//! - [`x86::X86Arch`] - x86-64, decoded with iced-x86
//! - [`sparc::SparcArch`] - SPARC32, hand-decoded fixed-width words

pub mod sparc;
pub mod x86;

use std::sync::Arc;

use strum::{Display, EnumString};

use crate::{ir::Type, lifter::SemanticsBuilder, Error, Result};

/// Names of the supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ArchName {
    /// 64-bit x86.
    #[strum(serialize = "amd64", serialize = "x86_64", serialize = "x86-64")]
    Amd64,
    /// 32-bit SPARC (v8).
    #[strum(serialize = "sparc32", serialize = "sparc")]
    Sparc32,
}

/// Names of the operating systems a spec may target.
///
/// The OS does not change lifting behavior in this crate; it is parsed,
/// validated, and recorded for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OsName {
    /// Linux.
    Linux,
    /// macOS.
    #[strum(serialize = "macos", serialize = "darwin")]
    Macos,
    /// Windows.
    Windows,
    /// Solaris (the usual host for SPARC32 specs).
    Solaris,
}

/// A top-level architectural register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterInfo {
    /// Canonical register name as it appears in specifications.
    pub name: &'static str,
    /// The register's IR type.
    pub ty: Type,
}

/// Control-flow category of a decoded instruction.
///
/// The category alone determines how the function lifter wires a decoded
/// instruction into the control-flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Decoding failed or produced an undefined encoding.
    Invalid,
    /// Valid instruction with guaranteed trap semantics (e.g. `ud2`).
    Error,
    /// Straight-line instruction.
    Normal,
    /// Straight-line instruction with no architectural effect.
    NoOp,
    /// Jump with a decode-time-known target.
    DirectJump,
    /// Jump through a register or memory operand.
    IndirectJump,
    /// Predicated indirect jump.
    ConditionalIndirectJump,
    /// Return from function.
    FunctionReturn,
    /// Predicated return from function.
    ConditionalFunctionReturn,
    /// Call with a decode-time-known target.
    DirectFunctionCall,
    /// Predicated direct call.
    ConditionalDirectFunctionCall,
    /// Call through a register or memory operand.
    IndirectFunctionCall,
    /// Predicated indirect call.
    ConditionalIndirectFunctionCall,
    /// Two-way conditional branch.
    ConditionalBranch,
    /// Non-local transfer to the supervisor (system call, trap).
    AsyncHyperCall,
    /// Predicated hyper call.
    ConditionalAsyncHyperCall,
}

/// An architecture-neutral decoded instruction record.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Address of the instruction.
    pub pc: u64,
    /// Address of the next sequential instruction.
    pub next_pc: u64,
    /// Address of the delay-slot instruction, when the architecture has
    /// delay slots; otherwise equal to `next_pc`.
    pub delayed_pc: u64,
    /// The instruction bytes that were decoded.
    pub bytes: Vec<u8>,
    /// Control-flow category driving dispatch.
    pub category: Category,
    /// Target when the transfer is taken (jumps, branches, calls).
    pub branch_taken_pc: u64,
    /// Fall-through / resume address.
    pub branch_not_taken_pc: u64,
    /// `false` when decoding failed.
    pub is_valid: bool,
}

impl Default for Instruction {
    fn default() -> Self {
        Self {
            pc: 0,
            next_pc: 0,
            delayed_pc: 0,
            bytes: Vec::new(),
            category: Category::Invalid,
            branch_taken_pc: 0,
            branch_not_taken_pc: 0,
            is_valid: false,
        }
    }
}

impl Instruction {
    /// Resets the record for reuse by the decoder.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns `true` if decoding succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Returns `true` for the error category.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.category == Category::Error
    }
}

/// A target architecture.
///
/// Implementations are stateless and shared behind an [`ArchRef`].
pub trait Arch: Send + Sync {
    /// The architecture's name.
    fn name(&self) -> ArchName;

    /// Width of an address in bits.
    fn address_bits(&self) -> u16;

    /// Maximum encoded instruction length in bytes.
    fn max_instruction_size(&self) -> usize;

    /// The top-level register file, in state-structure order.
    fn registers(&self) -> &[RegisterInfo];

    /// Looks up a top-level register by (possibly aliased) name.
    fn register_by_name(&self, name: &str) -> Option<&RegisterInfo>;

    /// Canonical name of the stack-pointer register.
    fn stack_pointer_register(&self) -> &'static str;

    /// Decodes the instruction at `addr` from `bytes` into `out`.
    ///
    /// Returns `false` (leaving `out` invalid) when the bytes do not form
    /// an instruction.
    fn decode(&self, addr: u64, bytes: &[u8], out: &mut Instruction) -> bool;

    /// Decodes an instruction that sits in a delay slot.
    ///
    /// Architectures without delay slots reject everything here.
    fn decode_delayed(&self, addr: u64, bytes: &[u8], out: &mut Instruction) -> bool;

    /// Returns `true` if `inst` may be followed by a delay slot.
    fn may_have_delay_slot(&self, inst: &Instruction) -> bool;

    /// Returns `true` if `delayed` actually executes on the given path of
    /// `inst` (annulment rules).
    fn next_instruction_is_delayed(
        &self,
        inst: &Instruction,
        delayed: &Instruction,
        on_taken_path: bool,
    ) -> bool;

    /// Emits IR that applies `inst`'s effect to the synthetic state.
    ///
    /// `is_delayed` is `true` when the instruction is being lifted out of
    /// a delay slot onto one of the enclosing transfer's paths.
    fn lift_instruction(&self, inst: &Instruction, builder: &mut SemanticsBuilder, is_delayed: bool);

    /// Returns `true` for SPARC targets, which get the structure-return
    /// probe after calls.
    fn is_sparc(&self) -> bool {
        false
    }

    /// The IR type of an address on this architecture.
    fn address_type(&self) -> Type {
        Type::Int(self.address_bits())
    }
}

/// Shared handle to an architecture backend.
pub type ArchRef = Arc<dyn Arch>;

/// Builds the architecture backend for `name`.
///
/// # Errors
/// Returns [`Error::UnknownArch`] if the name does not parse or the
/// architecture is unsupported.
pub fn build(name: &str) -> Result<ArchRef> {
    let parsed: ArchName = name
        .parse()
        .map_err(|_| Error::UnknownArch(name.to_string()))?;
    Ok(match parsed {
        ArchName::Amd64 => Arc::new(x86::X86Arch::new()),
        ArchName::Sparc32 => Arc::new(sparc::SparcArch::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_name_parsing() {
        assert_eq!("amd64".parse::<ArchName>().unwrap(), ArchName::Amd64);
        assert_eq!("x86_64".parse::<ArchName>().unwrap(), ArchName::Amd64);
        assert_eq!("sparc32".parse::<ArchName>().unwrap(), ArchName::Sparc32);
        assert!("mips".parse::<ArchName>().is_err());
    }

    #[test]
    fn test_build_known_arches() {
        assert!(build("amd64").is_ok());
        assert!(build("sparc32").is_ok());
        assert!(matches!(build("riscv"), Err(Error::UnknownArch(_))));
    }

    #[test]
    fn test_os_name_parsing() {
        assert_eq!("linux".parse::<OsName>().unwrap(), OsName::Linux);
        assert_eq!("darwin".parse::<OsName>().unwrap(), OsName::Macos);
        assert!("plan9".parse::<OsName>().is_err());
    }
}
