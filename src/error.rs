use thiserror::Error;

macro_rules! malformed_spec {
    // Single string version
    ($msg:expr) => {
        crate::Error::MalformedSpec {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedSpec {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the error conditions that can occur while parsing a lifting
/// specification, resolving declarations against an architecture, and producing
/// IR. Each variant provides specific context about the failure mode so callers
/// can decide whether to abort the current declaration or the whole run.
///
/// # Error Categories
///
/// ## Specification Errors
/// - [`Error::MalformedSpec`] - Structurally invalid specification content
/// - [`Error::MissingField`] - A required field is absent from a declaration
/// - [`Error::ConflictingValueDecl`] - A value location names both forms, or neither
/// - [`Error::DuplicateDeclaration`] - Two declarations share one address
/// - [`Error::OverlappingRange`] - A memory range collides with a mapped one
///
/// ## Type Errors
/// - [`Error::TypeParse`] - The nested textual type encoding did not parse
///
/// ## Architecture Errors
/// - [`Error::UnknownArch`] - The architecture name is not supported
/// - [`Error::UnknownRegister`] - A register name is not part of the target
///
/// ## Lifting Errors
/// - [`Error::NotLiftable`] - The entry byte is absent or non-executable
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::JsonError`] - JSON syntax errors from the underlying parser
#[derive(Error, Debug)]
pub enum Error {
    /// The specification is damaged and could not be interpreted.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    #[error("Malformed spec - {file}:{line}: {message}")]
    MalformedSpec {
        /// The message to be printed for the malformed specification
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A required field is missing from a declaration.
    ///
    /// The first value names the field, the second names the declaration
    /// context it was expected in (e.g. `"function parameter"`).
    #[error("Missing '{0}' field in {1}")]
    MissingField(&'static str, &'static str),

    /// A value location declares both a register and a memory form, or neither.
    ///
    /// Exactly one of `register` or `memory` must be present (spec data model).
    /// The associated string describes what the value was used for.
    #[error("A {0} must be resident in exactly one of a register or a memory location")]
    ConflictingValueDecl(&'static str),

    /// Two declarations were supplied for the same address.
    #[error("Duplicate declaration at address 0x{0:x}")]
    DuplicateDeclaration(u64),

    /// A memory range overlaps one that was already mapped.
    #[error("Memory range at address 0x{0:x} overlaps an existing range")]
    OverlappingRange(u64),

    /// The nested textual type encoding could not be parsed.
    ///
    /// The fields carry the full input string and the byte offset at which
    /// parsing failed.
    #[error("Invalid type encoding '{spec}' at offset {offset}")]
    TypeParse {
        /// The type string that failed to parse
        spec: String,
        /// Byte offset of the first unparseable character
        offset: usize,
    },

    /// The requested architecture is not supported by this build.
    #[error("Unknown architecture '{0}'")]
    UnknownArch(String),

    /// A register name does not exist on the target architecture.
    #[error("Unable to locate register '{0}'")]
    UnknownRegister(String),

    /// The function cannot be lifted because its entry is not mapped as
    /// executable code.
    #[error("Address 0x{0:x} is not mapped executable code")]
    NotLiftable(u64),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// JSON syntax error from the underlying parser.
    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories or for
    /// wrapping failures with additional context.
    #[error("{0}")]
    Error(String),
}
