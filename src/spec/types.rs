//! Parser for the nested textual type encoding.
//!
//! Parameter, return-value, and variable types in a specification are
//! single strings in a compact prefix encoding:
//!
//! | Encoding | Type |
//! |----------|------|
//! | `b` / `B` | i8 (signed / unsigned) |
//! | `h` / `H` | i16 |
//! | `i` / `I` | i32 |
//! | `l` / `L` | i64 |
//! | `f` | f32 |
//! | `d` | f64 |
//! | `v` | void |
//! | `*T` | pointer to `T` |
//! | `[T N]` | array of `N` elements of `T` |
//! | `{T1 T2 ...}` | struct |
//! | `(T1 ... Tr)` | function taking `T1..`, returning `Tr` |
//!
//! Signed and unsigned letters map to the same IR integer widths; the IR
//! type model does not track signedness. Whitespace between elements is
//! permitted and ignored.

use crate::{
    ir::{FnSig, Type},
    Error, Result,
};

struct TypeCursor<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
}

impl<'a> TypeCursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            position: 0,
        }
    }

    fn error(&self) -> Error {
        Error::TypeParse {
            spec: self.input.to_string(),
            offset: self.position,
        }
    }

    fn skip_whitespace(&mut self) {
        while self
            .bytes
            .get(self.position)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.position += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.bytes.get(self.position).copied()
    }

    fn bump(&mut self) -> Result<u8> {
        let byte = self.peek().ok_or_else(|| self.error())?;
        self.position += 1;
        Ok(byte)
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.bump()? == byte {
            Ok(())
        } else {
            self.position -= 1;
            Err(self.error())
        }
    }

    fn parse_decimal(&mut self) -> Result<u64> {
        self.skip_whitespace();
        let start = self.position;
        while self
            .bytes
            .get(self.position)
            .is_some_and(u8::is_ascii_digit)
        {
            self.position += 1;
        }
        if start == self.position {
            return Err(self.error());
        }
        self.input[start..self.position]
            .parse()
            .map_err(|_| self.error())
    }

    fn parse_type(&mut self) -> Result<Type> {
        match self.bump()? {
            b'b' | b'B' => Ok(Type::Int(8)),
            b'h' | b'H' => Ok(Type::Int(16)),
            b'i' | b'I' => Ok(Type::Int(32)),
            b'l' | b'L' => Ok(Type::Int(64)),
            b'f' => Ok(Type::Float(32)),
            b'd' => Ok(Type::Float(64)),
            b'v' => Ok(Type::Void),
            b'*' => {
                // The pointee is parsed for well-formedness, but the IR
                // pointer type is opaque.
                self.parse_type()?;
                Ok(Type::Ptr)
            }
            b'[' => {
                let elem = self.parse_type()?;
                let len = self.parse_decimal()?;
                self.expect(b']')?;
                Ok(Type::Array(Box::new(elem), len))
            }
            b'{' => {
                let mut fields = Vec::new();
                while self.peek().ok_or_else(|| self.error())? != b'}' {
                    fields.push(self.parse_type()?);
                }
                self.expect(b'}')?;
                if fields.is_empty() {
                    return Err(self.error());
                }
                Ok(Type::Struct(fields))
            }
            b'(' => {
                let mut types = Vec::new();
                while self.peek().ok_or_else(|| self.error())? != b')' {
                    types.push(self.parse_type()?);
                }
                self.expect(b')')?;
                let ret = types.pop().ok_or_else(|| self.error())?;
                Ok(Type::Func(Box::new(FnSig::new(types, ret))))
            }
            _ => {
                self.position -= 1;
                Err(self.error())
            }
        }
    }
}

/// Parses one type from its textual encoding.
///
/// The whole input must be consumed; trailing content is an error.
///
/// # Errors
/// Returns [`Error::TypeParse`] with the offending offset on any syntax
/// error.
pub fn parse_type(input: &str) -> Result<Type> {
    let mut cursor = TypeCursor::new(input);
    let ty = cursor.parse_type()?;
    if cursor.peek().is_some() {
        return Err(cursor.error());
    }
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        assert_eq!(parse_type("b").unwrap(), Type::Int(8));
        assert_eq!(parse_type("H").unwrap(), Type::Int(16));
        assert_eq!(parse_type("i").unwrap(), Type::Int(32));
        assert_eq!(parse_type("L").unwrap(), Type::Int(64));
        assert_eq!(parse_type("f").unwrap(), Type::Float(32));
        assert_eq!(parse_type("d").unwrap(), Type::Float(64));
        assert_eq!(parse_type("v").unwrap(), Type::Void);
    }

    #[test]
    fn test_pointer_is_opaque() {
        assert_eq!(parse_type("*i").unwrap(), Type::Ptr);
        assert_eq!(parse_type("**l").unwrap(), Type::Ptr);
        // A bare `*` has no pointee and is malformed.
        assert!(parse_type("*").is_err());
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(
            parse_type("[b 16]").unwrap(),
            Type::Array(Box::new(Type::Int(8)), 16)
        );
        assert_eq!(
            parse_type("{i l}").unwrap(),
            Type::Struct(vec![Type::Int(32), Type::Int(64)])
        );
        assert_eq!(
            parse_type("{ {i i} *v }").unwrap(),
            Type::Struct(vec![
                Type::Struct(vec![Type::Int(32), Type::Int(32)]),
                Type::Ptr
            ])
        );
    }

    #[test]
    fn test_function_types() {
        let ty = parse_type("(l l i)").unwrap();
        match ty {
            Type::Func(sig) => {
                assert_eq!(sig.params, vec![Type::Int(64), Type::Int(64)]);
                assert_eq!(sig.ret, Type::Int(32));
            }
            other => panic!("unexpected type {other:?}"),
        }

        // A function with no parameters still carries a return type.
        let ty = parse_type("(v)").unwrap();
        match ty {
            Type::Func(sig) => {
                assert!(sig.params.is_empty());
                assert_eq!(sig.ret, Type::Void);
            }
            other => panic!("unexpected type {other:?}"),
        }
    }

    #[test]
    fn test_errors_carry_offsets() {
        match parse_type("{i x}") {
            Err(Error::TypeParse { offset, .. }) => assert_eq!(offset, 3),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(parse_type("").is_err());
        assert!(parse_type("{}").is_err());
        assert!(parse_type("()").is_err());
        assert!(parse_type("i j").is_err());
        assert!(parse_type("[i]").is_err());
    }
}
