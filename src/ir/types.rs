//! Type model for lifted IR.
//!
//! The model is deliberately small: integers of arbitrary bit width, two
//! float widths, an opaque pointer type, structs, arrays, and function
//! types. Pointers do not carry a pointee type; loads and stores carry the
//! accessed type instead, which keeps declaration sharing trivial when
//! functions are cloned between modules.

use std::fmt;

/// A type in lifted IR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// The absence of a value. Only valid as a function return type.
    Void,
    /// Integer of the given bit width (1, 8, 16, 32, 64, ...).
    Int(u16),
    /// IEEE-754 float of the given bit width (32 or 64).
    Float(u16),
    /// Opaque pointer. The accessed type lives on the memory operation.
    Ptr,
    /// Ordered field list.
    Struct(Vec<Type>),
    /// Fixed-length array.
    Array(Box<Type>, u64),
    /// Function type.
    Func(Box<FnSig>),
}

/// A function signature: parameter types, return type, variadic flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnSig {
    /// Parameter types in declaration order.
    pub params: Vec<Type>,
    /// Return type. [`Type::Void`] for no return value.
    pub ret: Type,
    /// `true` if the function accepts additional untyped arguments.
    pub variadic: bool,
}

impl FnSig {
    /// Creates a non-variadic signature.
    #[must_use]
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret,
            variadic: false,
        }
    }
}

impl Type {
    /// Returns `true` for integer types.
    #[must_use]
    pub const fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    /// Returns `true` for the opaque pointer type.
    #[must_use]
    pub const fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    /// Returns `true` for [`Type::Void`].
    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Returns the integer bit width, if this is an integer type.
    #[must_use]
    pub const fn int_bits(&self) -> Option<u16> {
        match self {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Appends the name-safe mangling of this type to `out`.
    ///
    /// The mangling is a variant of the spec's textual type encoding with
    /// bracket characters replaced so the result can be embedded in symbol
    /// names (`sub_<addr>_<mangled>_<cc>`, `__anvill_type_<mangled>`).
    pub fn mangle_into(&self, out: &mut String) {
        match self {
            Type::Void => out.push('v'),
            Type::Int(8) => out.push('b'),
            Type::Int(16) => out.push('h'),
            Type::Int(32) => out.push('i'),
            Type::Int(64) => out.push('l'),
            Type::Int(bits) => {
                out.push('I');
                out.push_str(&bits.to_string());
            }
            Type::Float(32) => out.push('f'),
            Type::Float(_) => out.push('d'),
            Type::Ptr => out.push('p'),
            Type::Struct(fields) => {
                out.push('s');
                for field in fields {
                    field.mangle_into(out);
                }
                out.push('z');
            }
            Type::Array(elem, len) => {
                out.push('a');
                out.push_str(&len.to_string());
                out.push('_');
                elem.mangle_into(out);
            }
            Type::Func(sig) => {
                out.push('F');
                for param in &sig.params {
                    param.mangle_into(out);
                }
                if sig.variadic {
                    out.push('V');
                }
                out.push('r');
                sig.ret.mangle_into(out);
                out.push('z');
            }
        }
    }

    /// Returns the name-safe mangling of this type.
    #[must_use]
    pub fn mangled(&self) -> String {
        let mut out = String::new();
        self.mangle_into(&mut out);
        out
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Float(bits) => write!(f, "f{bits}"),
            Type::Ptr => write!(f, "ptr"),
            Type::Struct(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "}}")
            }
            Type::Array(elem, len) => write!(f, "[{len} x {elem}]"),
            Type::Func(sig) => {
                write!(f, "{} (", sig.ret)?;
                for (i, param) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                if sig.variadic {
                    if !sig.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(Type::Int(64).to_string(), "i64");
        assert_eq!(Type::Ptr.to_string(), "ptr");
        assert_eq!(
            Type::Struct(vec![Type::Int(64), Type::Int(8)]).to_string(),
            "{i64, i8}"
        );
        assert_eq!(
            Type::Array(Box::new(Type::Int(8)), 4).to_string(),
            "[4 x i8]"
        );
    }

    #[test]
    fn test_mangle_primitives() {
        assert_eq!(Type::Void.mangled(), "v");
        assert_eq!(Type::Int(8).mangled(), "b");
        assert_eq!(Type::Int(64).mangled(), "l");
        assert_eq!(Type::Int(128).mangled(), "I128");
        assert_eq!(Type::Ptr.mangled(), "p");
    }

    #[test]
    fn test_mangle_function() {
        let sig = FnSig::new(vec![Type::Int(32), Type::Ptr], Type::Void);
        assert_eq!(Type::Func(Box::new(sig)).mangled(), "Fiprvz");
    }

    #[test]
    fn test_mangle_is_name_safe() {
        let ty = Type::Func(Box::new(FnSig {
            params: vec![
                Type::Struct(vec![Type::Int(16), Type::Float(32)]),
                Type::Array(Box::new(Type::Int(8)), 12),
            ],
            ret: Type::Ptr,
            variadic: true,
        }));
        let mangled = ty.mangled();
        assert!(mangled
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
