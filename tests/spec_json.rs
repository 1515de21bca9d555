//! JSON specification round trips: parse, lift, write.

use liftscope::{
    ir::bitcode,
    lifter::{EntityLifter, LifterOptions},
    spec::parse_program,
};

const SPEC: &str = r#"{
    "arch": "amd64",
    "os": "linux",
    "functions": [{
        "address": 4096,
        "name": "entry",
        "parameters": [
            {"name": "x", "register": "RDI", "type": "l"}
        ],
        "return_values": [
            {"register": "RAX", "type": "l"}
        ],
        "return_address": {"memory": {"register": "RSP", "offset": 0}},
        "return_stack_pointer": {"register": "RSP", "offset": 8},
        "is_noreturn": false,
        "is_variadic": false,
        "calling_convention": 0
    }],
    "variables": [
        {"address": 8192, "type": "i"}
    ],
    "memory": [{
        "address": 4096,
        "is_executable": true,
        "data": "4889f8c3"
    }],
    "symbols": [[4096, "entry"], [8192, "counter"]]
}"#;

fn lift(text: &str) -> liftscope::ir::Module {
    let program = parse_program(text, None, None).unwrap();
    let mut lifter = EntityLifter::new(
        program.arch().clone(),
        LifterOptions::default(),
        &program,
        &program,
        &program,
    );
    program.for_each_variable(|decl| {
        lifter.lift_variable(decl);
    });
    program.for_each_function(|decl| {
        let _ = lifter.lift_entity(decl);
    });
    program.for_each_symbol(|address, name| {
        lifter.name_entity(address, name);
    });
    lifter.module_mut().internalize_reserved_globals();
    lifter.into_module()
}

#[test]
fn test_spec_lifts_end_to_end() {
    // 0x1000: mov rax, rdi; ret
    let module = lift(SPEC);

    // The function picked up its symbol name.
    let func = module.function("entry").expect("renamed function");
    assert!(!func.is_declaration());
    assert_eq!(func.sig.params.len(), 1);
    assert_eq!(func.sig.ret, liftscope::ir::Type::Int(64));

    // The variable entity exists under its symbol name.
    assert!(module.global("counter").is_some());

    // Sentinels were internalized.
    let pc = module.global("__anvill_pc").expect("pc sentinel");
    assert_eq!(pc.init, liftscope::ir::GlobalInit::Zero);
    assert_eq!(pc.linkage, liftscope::ir::Linkage::Internal);
}

#[test]
fn test_text_writer_is_parseable_shape() {
    let module = lift(SPEC);
    let text = module.to_string();

    assert!(text.starts_with("; ModuleID = 'lifted_code'"));
    assert!(text.contains("define i64 @entry(i64"));
    assert!(text.contains("declare ptr @__anvill_function_return(ptr, i64, ptr)"));
    assert!(text.contains("@counter = external global i32"));
}

#[test]
fn test_text_writer_round_trips_through_disk() {
    let module = lift(SPEC);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.ir");
    std::fs::write(&path, module.to_string()).unwrap();
    let read_back = std::fs::read_to_string(&path).unwrap();
    assert_eq!(read_back, module.to_string());
}

#[test]
fn test_binary_writer_emits_magic() {
    let module = lift(SPEC);
    let mut buffer = Vec::new();
    bitcode::write_module(&module, &mut buffer).unwrap();
    assert_eq!(&buffer[..4], bitcode::MAGIC);
    assert!(buffer.len() > 16);
}

#[test]
fn test_bad_function_entry_is_skipped_not_fatal() {
    let text = r#"{
        "arch": "amd64",
        "functions": [
            {"address": 4096},
            {
                "address": 8192,
                "return_address": {"memory": {"register": "RSP", "offset": 0}},
                "return_stack_pointer": {"register": "RSP", "offset": 8}
            }
        ],
        "memory": [{"address": 8192, "is_executable": true, "data": "c3"}]
    }"#;
    let program = parse_program(text, None, None).unwrap();
    // The first function is missing its required fields and is rejected;
    // the second survives.
    assert!(program.function_at(4096).is_none());
    assert!(program.function_at(8192).is_some());
}

#[test]
fn test_unknown_arch_is_fatal() {
    let text = r#"{"arch": "vax"}"#;
    assert!(parse_program(text, None, None).is_err());
}
