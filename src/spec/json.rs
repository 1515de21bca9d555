//! JSON specification reader.
//!
//! The wire format is a single JSON object with `arch`/`os` strings,
//! `functions`, `variables`, `memory`, `symbols`, and
//! `control_flow_redirections` arrays. Deserialization happens through
//! typed mirror structs; the validation that serde cannot express (the
//! exactly-one-location rule, register existence, hex shape) runs
//! explicitly afterwards so diagnostics can name the failing field and
//! address.
//!
//! A malformed function or variable entry rejects that declaration with a
//! logged error and parsing continues; structurally non-conformant
//! top-level sections fail the whole spec.

use log::{error, info, warn};
use serde::Deserialize;

use crate::{
    arch::{ArchRef, OsName},
    ir::Type,
    spec::{
        parse_type, ByteRange, FunctionDecl, GlobalVarDecl, ParameterDecl, Program,
        TypedRegisterDecl, ValueDecl, ValueLocation,
    },
    Error, Result,
};

#[derive(Debug, Deserialize)]
struct SpecJson {
    arch: Option<String>,
    os: Option<String>,
    functions: Option<Vec<serde_json::Value>>,
    variables: Option<Vec<serde_json::Value>>,
    memory: Option<Vec<RangeJson>>,
    symbols: Option<Vec<(u64, String)>>,
    control_flow_redirections: Option<Vec<(u64, u64)>>,
}

#[derive(Debug, Deserialize)]
struct MemoryLocJson {
    register: String,
    #[serde(default)]
    offset: i64,
}

#[derive(Debug, Deserialize)]
struct ValueJson {
    name: Option<String>,
    register: Option<String>,
    memory: Option<MemoryLocJson>,
    #[serde(rename = "type")]
    ty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReturnSpJson {
    register: String,
    #[serde(default)]
    offset: i64,
}

#[derive(Debug, Deserialize)]
struct RegisterInfoJson {
    address: u64,
    register: String,
    #[serde(rename = "type")]
    ty: String,
    value: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FunctionJson {
    address: u64,
    name: Option<String>,
    #[serde(default)]
    parameters: Vec<ValueJson>,
    #[serde(default)]
    return_values: Vec<ValueJson>,
    return_address: Option<ValueJson>,
    return_stack_pointer: Option<ReturnSpJson>,
    #[serde(default)]
    register_info: Vec<RegisterInfoJson>,
    #[serde(default)]
    is_noreturn: bool,
    #[serde(default)]
    is_variadic: bool,
    #[serde(default)]
    calling_convention: u32,
}

#[derive(Debug, Deserialize)]
struct VariableJson {
    address: u64,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Deserialize)]
struct RangeJson {
    address: u64,
    #[serde(default)]
    is_writeable: bool,
    #[serde(default)]
    is_executable: bool,
    data: String,
}

fn resolve_register(arch: &ArchRef, name: &str) -> Result<String> {
    arch.register_by_name(name)
        .map(|reg| reg.name.to_string())
        .ok_or_else(|| Error::UnknownRegister(name.to_string()))
}

/// Converts the JSON shape of a value location, enforcing that exactly one
/// of the `register`/`memory` forms is present.
fn parse_location(arch: &ArchRef, value: &ValueJson, desc: &'static str) -> Result<ValueLocation> {
    match (&value.register, &value.memory) {
        (Some(register), None) => Ok(ValueLocation::Register(resolve_register(arch, register)?)),
        (None, Some(memory)) => Ok(ValueLocation::Memory {
            base: resolve_register(arch, &memory.register)?,
            offset: memory.offset,
        }),
        _ => Err(Error::ConflictingValueDecl(desc)),
    }
}

fn parse_typed_value(arch: &ArchRef, value: &ValueJson, desc: &'static str) -> Result<ValueDecl> {
    let ty_str = value
        .ty
        .as_deref()
        .ok_or(Error::MissingField("type", desc))?;
    Ok(ValueDecl {
        location: parse_location(arch, value, desc)?,
        ty: parse_type(ty_str)?,
    })
}

fn parse_function(arch: &ArchRef, raw: &serde_json::Value) -> Result<(FunctionDecl, Option<String>)> {
    let json: FunctionJson = serde_json::from_value(raw.clone())
        .map_err(|e| malformed_spec!("invalid function entry: {e}"))?;

    let mut params = Vec::with_capacity(json.parameters.len());
    for param in &json.parameters {
        if param.name.is_none() {
            warn!("Missing function parameter name.");
        }
        params.push(ParameterDecl {
            name: param.name.clone(),
            value: parse_typed_value(arch, param, "function parameter")?,
        });
    }

    let mut returns = Vec::with_capacity(json.return_values.len());
    for ret in &json.return_values {
        returns.push(parse_typed_value(arch, ret, "function return value")?);
    }

    let return_address_json = json
        .return_address
        .as_ref()
        .ok_or(Error::MissingField("return_address", "function specification"))?;
    let return_address = ValueDecl {
        location: parse_location(arch, return_address_json, "return address")?,
        ty: arch.address_type(),
    };

    let return_sp = json.return_stack_pointer.as_ref().ok_or(Error::MissingField(
        "return_stack_pointer",
        "function specification",
    ))?;
    let return_stack_pointer = resolve_register(arch, &return_sp.register)?;

    let mut register_hints: std::collections::HashMap<u64, Vec<TypedRegisterDecl>> =
        std::collections::HashMap::new();
    for info in &json.register_info {
        let register = resolve_register(arch, &info.register)?;
        register_hints.entry(info.address).or_default().push(TypedRegisterDecl {
            register,
            ty: parse_type(&info.ty)?,
            value: info.value,
        });
    }

    let decl = FunctionDecl {
        address: json.address,
        arch: arch.clone(),
        params,
        returns,
        return_address,
        return_stack_pointer,
        return_stack_pointer_offset: return_sp.offset,
        register_hints,
        is_noreturn: json.is_noreturn,
        is_variadic: json.is_variadic,
        calling_convention: json.calling_convention,
    };
    Ok((decl, json.name))
}

fn parse_variable(raw: &serde_json::Value) -> Result<GlobalVarDecl> {
    let json: VariableJson = serde_json::from_value(raw.clone())
        .map_err(|e| malformed_spec!("invalid variable entry: {e}"))?;
    Ok(GlobalVarDecl {
        address: json.address,
        ty: parse_type(&json.ty)?,
    })
}

fn decode_hex(data: &str, address: u64) -> Result<Vec<u8>> {
    if data.len() % 2 != 0 {
        return Err(malformed_spec!(
            "byte string of memory range at 0x{address:x} must have an even number of characters"
        ));
    }
    let mut bytes = Vec::with_capacity(data.len() / 2);
    for pair in data.as_bytes().chunks_exact(2) {
        let hi = (pair[0] as char)
            .to_digit(16)
            .ok_or_else(|| malformed_spec!("invalid hex byte in memory range at 0x{address:x}"))?;
        let lo = (pair[1] as char)
            .to_digit(16)
            .ok_or_else(|| malformed_spec!("invalid hex byte in memory range at 0x{address:x}"))?;
        bytes.push(((hi << 4) | lo) as u8);
    }
    Ok(bytes)
}

/// Parses a JSON specification into a [`Program`].
///
/// `arch` and `os` strings inside the spec take precedence over the
/// fallbacks (the CLI's `--arch`/`--os` values). Malformed function and
/// variable entries are logged and skipped; everything else that fails
/// aborts the parse.
///
/// # Errors
/// Returns an error when the document is not a well-formed spec object,
/// the architecture is missing/unknown, or the memory/symbol/redirection
/// sections are malformed.
pub fn parse_program(
    text: &str,
    arch_fallback: Option<&str>,
    os_fallback: Option<&str>,
) -> Result<Program> {
    let spec: SpecJson = serde_json::from_str(text)?;

    let arch_name = spec
        .arch
        .as_deref()
        .or(arch_fallback)
        .ok_or_else(|| malformed_spec!("spec contains no 'arch' and no fallback was provided"))?;
    let arch = crate::arch::build(arch_name)?;

    if let Some(os_name) = spec.os.as_deref().or(os_fallback) {
        match os_name.parse::<OsName>() {
            Ok(os) => info!("Lifting for {} / {os}", arch.name()),
            Err(_) => warn!("Unrecognized os '{os_name}' in spec; continuing"),
        }
    }

    let mut program = Program::new(arch.clone());

    for raw in spec.functions.as_deref().unwrap_or_default() {
        match parse_function(&arch, raw) {
            Ok((decl, name)) => {
                let address = decl.address;
                if let Some(name) = name {
                    program.add_symbol(name, address);
                }
                if let Err(e) = program.declare_function(decl) {
                    error!("{e}");
                }
            }
            Err(e) => error!("Rejecting function declaration: {e}"),
        }
    }

    for &(from, to) in spec.control_flow_redirections.as_deref().unwrap_or_default() {
        info!("Control flow redirection: 0x{from:x} -> 0x{to:x}");
        program.add_control_flow_redirection(from, to);
    }

    for raw in spec.variables.as_deref().unwrap_or_default() {
        match parse_variable(raw) {
            Ok(decl) => {
                if let Err(e) = program.declare_variable(decl) {
                    error!("{e}");
                }
            }
            Err(e) => error!("Rejecting variable declaration: {e}"),
        }
    }

    for range in spec.memory.as_deref().unwrap_or_default() {
        let data = decode_hex(&range.data, range.address)?;
        program.map_range(ByteRange {
            address: range.address,
            data,
            is_writeable: range.is_writeable,
            is_executable: range.is_executable,
        })?;
    }

    for (address, name) in spec.symbols.as_deref().unwrap_or_default() {
        program.add_symbol(name.clone(), *address);
    }

    Ok(program)
}

/// Parses a type string for callers outside the JSON reader (register
/// hints supplied programmatically, tests).
///
/// # Errors
/// Returns [`Error::TypeParse`] on malformed input.
pub fn parse_type_str(text: &str) -> Result<Type> {
    parse_type(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "arch": "amd64",
        "os": "linux",
        "functions": [{
            "address": 4096,
            "return_address": {"memory": {"register": "RSP", "offset": 0}},
            "return_stack_pointer": {"register": "RSP", "offset": 8}
        }],
        "memory": [{
            "address": 4096,
            "is_executable": true,
            "data": "9090"
        }]
    }"#;

    #[test]
    fn test_minimal_spec() {
        let program = parse_program(MINIMAL, None, None).unwrap();
        let decl = program.function_at(0x1000).unwrap();
        assert!(decl.params.is_empty());
        assert!(decl.returns.is_empty());
        assert_eq!(decl.return_stack_pointer, "RSP");
        assert_eq!(decl.return_stack_pointer_offset, 8);
    }

    #[test]
    fn test_arch_fallback_applies() {
        let text = r#"{"functions": []}"#;
        assert!(parse_program(text, None, None).is_err());
        assert!(parse_program(text, Some("amd64"), None).is_ok());
    }

    #[test]
    fn test_spec_arch_overrides_fallback() {
        let program = parse_program(MINIMAL, Some("sparc32"), None).unwrap();
        assert_eq!(program.arch().name(), crate::arch::ArchName::Amd64);
    }

    #[test]
    fn test_conflicting_value_decl_rejects_function() {
        let text = r#"{
            "arch": "amd64",
            "functions": [{
                "address": 4096,
                "parameters": [{
                    "register": "RDI",
                    "memory": {"register": "RSP", "offset": 8},
                    "type": "l"
                }],
                "return_address": {"memory": {"register": "RSP", "offset": 0}},
                "return_stack_pointer": {"register": "RSP", "offset": 8}
            }]
        }"#;
        // The function is rejected but the spec still parses.
        let program = parse_program(text, None, None).unwrap();
        assert!(program.function_at(0x1000).is_none());
    }

    #[test]
    fn test_unknown_register_rejects_function() {
        let text = r#"{
            "arch": "amd64",
            "functions": [{
                "address": 4096,
                "return_address": {"register": "XYZZY"},
                "return_stack_pointer": {"register": "RSP", "offset": 8}
            }]
        }"#;
        let program = parse_program(text, None, None).unwrap();
        assert!(program.function_at(0x1000).is_none());
    }

    #[test]
    fn test_odd_hex_fails_spec() {
        let text = r#"{
            "arch": "amd64",
            "memory": [{"address": 4096, "data": "909"}]
        }"#;
        assert!(parse_program(text, None, None).is_err());
    }

    #[test]
    fn test_symbols_and_redirections() {
        let text = r#"{
            "arch": "amd64",
            "symbols": [[4096, "main"]],
            "control_flow_redirections": [[16640, 16896]]
        }"#;
        let program = parse_program(text, None, None).unwrap();
        let mut seen = Vec::new();
        program.for_each_symbol(|addr, name| seen.push((addr, name.to_string())));
        assert_eq!(seen, vec![(4096, "main".to_string())]);
        use crate::provider::ControlFlowProvider;
        assert_eq!(program.redirection(16640), 16896);
    }

    #[test]
    fn test_register_info_hints() {
        let text = r#"{
            "arch": "amd64",
            "functions": [{
                "address": 4096,
                "register_info": [
                    {"address": 4100, "register": "RDI", "type": "*b", "value": 8192}
                ],
                "return_address": {"memory": {"register": "RSP", "offset": 0}},
                "return_stack_pointer": {"register": "RSP", "offset": 8}
            }]
        }"#;
        let program = parse_program(text, None, None).unwrap();
        let decl = program.function_at(0x1000).unwrap();
        let hints = decl.register_hints.get(&4100).unwrap();
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].register, "RDI");
        assert_eq!(hints[0].ty, Type::Ptr);
        assert_eq!(hints[0].value, Some(8192));
    }
}
