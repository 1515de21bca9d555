//! Declarations supplied by a specification.
//!
//! These are the long-lived inputs of a lift: function contracts
//! ([`FunctionDecl`]), variable declarations ([`GlobalVarDecl`]),
//! per-instruction register hints ([`TypedRegisterDecl`]), and raw memory
//! ([`ByteRange`]). They are owned by the caller's [`crate::spec::Program`]
//! and borrowed by the lifter for the duration of one lift.

use std::fmt;

use std::collections::HashMap;

use crate::{
    arch::ArchRef,
    ir::{FnSig, Type},
};

/// Where a value lives at a function boundary.
///
/// Exactly one of the two forms is set; the enum makes the invariant
/// structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueLocation {
    /// A named architectural register.
    Register(String),
    /// A memory location addressed as `base + offset` at entry.
    Memory {
        /// Name of the base register.
        base: String,
        /// Signed byte offset from the base register's entry value.
        offset: i64,
    },
}

impl fmt::Display for ValueLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueLocation::Register(name) => write!(f, "{name}"),
            ValueLocation::Memory { base, offset } => write!(f, "[{base}{offset:+}]"),
        }
    }
}

/// A typed value location.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDecl {
    /// Where the value lives.
    pub location: ValueLocation,
    /// The value's high-level type.
    pub ty: Type,
}

/// A function parameter: a [`ValueDecl`] plus an optional name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDecl {
    /// Parameter name, kept only to make output easier to read.
    pub name: Option<String>,
    /// The parameter's location and type.
    pub value: ValueDecl,
}

/// A per-instruction register type hint.
///
/// Hints never alter semantics; they only let the lifter thread type
/// information (and optionally a concrete value) through the produced IR.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRegisterDecl {
    /// The hinted register's name.
    pub register: String,
    /// The hinted high-level type.
    pub ty: Type,
    /// Concrete value of the register at the instruction, if known.
    pub value: Option<u64>,
}

/// A global variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVarDecl {
    /// The variable's address.
    pub address: u64,
    /// The variable's type.
    pub ty: Type,
}

impl GlobalVarDecl {
    /// Returns the symbol name this variable lifts to.
    #[must_use]
    pub fn name(&self) -> String {
        format!("data_{:x}", self.address)
    }
}

/// A contiguous run of mapped target memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    /// First mapped address.
    pub address: u64,
    /// The mapped bytes.
    pub data: Vec<u8>,
    /// `true` if the range is writable at runtime.
    pub is_writeable: bool,
    /// `true` if the range may be executed.
    pub is_executable: bool,
}

/// The declared contract of a machine-code function.
#[derive(Clone)]
pub struct FunctionDecl {
    /// Entry address. Set to the *effective* (post-redirection) target
    /// when the declaration was found through target resolution.
    pub address: u64,
    /// The target architecture.
    pub arch: ArchRef,
    /// Parameters in call order.
    pub params: Vec<ParameterDecl>,
    /// Return values in aggregate order.
    pub returns: Vec<ValueDecl>,
    /// Where the return address is stored on entry.
    pub return_address: ValueDecl,
    /// Register defining the stack pointer's exit value.
    pub return_stack_pointer: String,
    /// Offset of the exit stack pointer from its entry value.
    pub return_stack_pointer_offset: i64,
    /// Register hints keyed by instruction address.
    pub register_hints: HashMap<u64, Vec<TypedRegisterDecl>>,
    /// `true` if the function never returns.
    pub is_noreturn: bool,
    /// `true` if the function is variadic.
    pub is_variadic: bool,
    /// Calling convention identifier.
    pub calling_convention: u32,
}

impl FunctionDecl {
    /// Returns the calling-convention-native signature of the function.
    ///
    /// Multiple return values aggregate into a struct, matching how the
    /// native wrapper assembles them by element insertion.
    #[must_use]
    pub fn fn_sig(&self) -> FnSig {
        let params = self
            .params
            .iter()
            .map(|param| param.value.ty.clone())
            .collect();
        let ret = match self.returns.len() {
            0 => Type::Void,
            1 => self.returns[0].ty.clone(),
            _ => Type::Struct(self.returns.iter().map(|ret| ret.ty.clone()).collect()),
        };
        let mut sig = FnSig::new(params, ret);
        sig.variadic = self.is_variadic;
        sig
    }

    /// Returns the generated wrapper name for this declaration:
    /// `sub_<hexaddr>_<mangled type>_<calling convention>`.
    ///
    /// The name encodes the type so that redeclarations at one address
    /// with different types coexist under distinct identities.
    #[must_use]
    pub fn wrapper_name(&self) -> String {
        let func_ty = Type::Func(Box::new(self.fn_sig()));
        format!(
            "sub_{:x}_{}_{}",
            self.address,
            func_ty.mangled(),
            self.calling_convention
        )
    }
}

impl fmt::Debug for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDecl")
            .field("address", &format_args!("0x{:x}", self.address))
            .field("arch", &self.arch.name())
            .field("params", &self.params.len())
            .field("returns", &self.returns.len())
            .field("is_noreturn", &self.is_noreturn)
            .field("is_variadic", &self.is_variadic)
            .field("calling_convention", &self.calling_convention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;

    fn make_decl(returns: Vec<ValueDecl>) -> FunctionDecl {
        FunctionDecl {
            address: 0x1000,
            arch: arch::build("amd64").unwrap(),
            params: vec![],
            returns,
            return_address: ValueDecl {
                location: ValueLocation::Memory {
                    base: "RSP".to_string(),
                    offset: 0,
                },
                ty: Type::Int(64),
            },
            return_stack_pointer: "RSP".to_string(),
            return_stack_pointer_offset: 8,
            register_hints: HashMap::new(),
            is_noreturn: false,
            is_variadic: false,
            calling_convention: 0,
        }
    }

    #[test]
    fn test_void_signature() {
        let decl = make_decl(vec![]);
        let sig = decl.fn_sig();
        assert!(sig.params.is_empty());
        assert_eq!(sig.ret, Type::Void);
    }

    #[test]
    fn test_multi_return_aggregates() {
        let ret = |ty| ValueDecl {
            location: ValueLocation::Register("RAX".to_string()),
            ty,
        };
        let decl = make_decl(vec![ret(Type::Int(64)), ret(Type::Int(64))]);
        assert_eq!(
            decl.fn_sig().ret,
            Type::Struct(vec![Type::Int(64), Type::Int(64)])
        );
    }

    #[test]
    fn test_wrapper_name_encodes_type_and_cc() {
        let decl = make_decl(vec![]);
        assert_eq!(decl.wrapper_name(), "sub_1000_Frvz_0");
    }
}
