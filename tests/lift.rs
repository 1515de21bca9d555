//! End-to-end lifting scenarios over in-memory programs.

use std::collections::HashMap;

use liftscope::{
    arch,
    ir::{Const, Function, InlineHint, Module, Op, Terminator, ValueDef},
    lifter::{EntityLifter, LifterOptions},
    provider::{ByteAvailability, BytePermission, ByteQuery, MemoryProvider},
    spec::{ByteRange, FunctionDecl, Program, ValueDecl, ValueLocation},
};

fn x86_program(ranges: &[(u64, &[u8])]) -> Program {
    let mut program = Program::new(arch::build("amd64").unwrap());
    for &(address, data) in ranges {
        program
            .map_range(ByteRange {
                address,
                data: data.to_vec(),
                is_writeable: false,
                is_executable: true,
            })
            .unwrap();
    }
    program
}

fn x86_decl(program: &Program, address: u64) -> FunctionDecl {
    FunctionDecl {
        address,
        arch: program.arch().clone(),
        params: vec![],
        returns: vec![],
        return_address: ValueDecl {
            location: ValueLocation::Memory {
                base: "RSP".to_string(),
                offset: 0,
            },
            ty: liftscope::ir::Type::Int(64),
        },
        return_stack_pointer: "RSP".to_string(),
        return_stack_pointer_offset: 8,
        register_hints: HashMap::new(),
        is_noreturn: false,
        is_variadic: false,
        calling_convention: 0,
    }
}

fn sparc_program(ranges: &[(u64, &[u32])]) -> Program {
    let mut program = Program::new(arch::build("sparc32").unwrap());
    for &(address, words) in ranges {
        let mut data = Vec::with_capacity(words.len() * 4);
        for word in words {
            data.extend_from_slice(&word.to_be_bytes());
        }
        program
            .map_range(ByteRange {
                address,
                data,
                is_writeable: false,
                is_executable: true,
            })
            .unwrap();
    }
    program
}

fn sparc_decl(program: &Program, address: u64) -> FunctionDecl {
    FunctionDecl {
        address,
        arch: program.arch().clone(),
        params: vec![],
        returns: vec![],
        return_address: ValueDecl {
            location: ValueLocation::Register("O7".to_string()),
            ty: liftscope::ir::Type::Int(32),
        },
        return_stack_pointer: "O6".to_string(),
        return_stack_pointer_offset: 0,
        register_hints: HashMap::new(),
        is_noreturn: false,
        is_variadic: false,
        calling_convention: 0,
    }
}

fn lift_all(program: &Program) -> (Module, Vec<String>) {
    let mut lifter = EntityLifter::new(
        program.arch().clone(),
        LifterOptions::default(),
        program,
        program,
        program,
    );
    let mut names = Vec::new();
    program.for_each_function(|decl| {
        if let Some(name) = lifter.lift_entity(decl) {
            names.push(name);
        }
    });
    (lifter.into_module(), names)
}

fn callees_of(func: &Function) -> Vec<String> {
    let mut callees = Vec::new();
    func.for_each_callee(|name| callees.push(name.to_string()));
    callees
}

/// Collects the state-pointer argument (argument zero) of every call to
/// `callee` in `func`, reporting whether each one is undef.
fn state_args_undef(func: &Function, callee: &str) -> Vec<bool> {
    let mut flags = Vec::new();
    for block in &func.blocks {
        for &inst_id in &block.insts {
            if let Op::Call {
                callee: name, args, ..
            } = &func.inst(inst_id).op
            {
                if name == callee {
                    flags.push(func.is_undef(args[0]));
                }
            }
        }
        if let Terminator::TailCall { callee: name, args } = &block.term {
            if name == callee {
                flags.push(func.is_undef(args[0]));
            }
        }
    }
    flags
}

// S1: two nops, then nothing mapped. The wrapper must exist with a void
// signature, terminate through the error intrinsic with a muted state
// argument, and contain no call to any inlinable function.
#[test]
fn test_straight_line_runs_off_mapped_memory() {
    let mut program = x86_program(&[(0x1000, &[0x90, 0x90])]);
    program.declare_function(x86_decl(&program, 0x1000)).unwrap();

    let (module, names) = lift_all(&program);
    assert_eq!(names.len(), 1);
    let wrapper = module.function(&names[0]).unwrap();
    assert!(!wrapper.is_declaration());
    assert!(wrapper.sig.params.is_empty());
    assert!(wrapper.sig.ret.is_void());

    // State escape is muted on every error terminator.
    let mute_flags = state_args_undef(wrapper, "__anvill_error");
    assert!(!mute_flags.is_empty());
    assert!(mute_flags.iter().all(|&muted| muted));

    // Two-layer shape: nothing inlinable remains reachable.
    for callee in callees_of(wrapper) {
        assert!(!callee.ends_with(".lifted"), "uninlined body: {callee}");
        if let Some(target) = module.function(&callee) {
            assert!(
                target.is_declaration() || target.inline == InlineHint::NoInline,
                "inlinable callee survived: {callee}"
            );
        }
    }
}

// S2: `jmp .` - the self edge is distinct from the entry edge, and the
// work-list loop recovers it as a self-tail-call rather than an error.
#[test]
fn test_direct_jump_self_loop() {
    let mut program = x86_program(&[(0x2000, &[0xeb, 0xfe])]);
    program.declare_function(x86_decl(&program, 0x2000)).unwrap();

    let (module, names) = lift_all(&program);
    let wrapper = module.function(&names[0]).unwrap();

    let callees = callees_of(wrapper);
    assert!(
        !callees.iter().any(|name| name == "__anvill_error"),
        "self-loop must not produce an error terminator"
    );
    // The back edge into the entry resolves through the type provider and
    // becomes a (recursive) call to the wrapper itself.
    assert!(callees.iter().any(|name| name == &names[0]));
}

// S3: call + fall-through + ret. The caller's wrapper must contain a call
// to the callee's wrapper followed by a normal return path.
#[test]
fn test_direct_call_and_fall_through() {
    // 0x3000: call 0x3100; ret        0x3100: ret
    let mut program = x86_program(&[
        (0x3000, &[0xe8, 0xfb, 0x00, 0x00, 0x00, 0xc3]),
        (0x3100, &[0xc3]),
    ]);
    program.declare_function(x86_decl(&program, 0x3000)).unwrap();
    program.declare_function(x86_decl(&program, 0x3100)).unwrap();

    let (module, names) = lift_all(&program);
    let caller_name = names
        .iter()
        .find(|name| name.starts_with("sub_3000"))
        .unwrap();
    let callee_name = names
        .iter()
        .find(|name| name.starts_with("sub_3100"))
        .unwrap();

    let caller = module.function(caller_name).unwrap();
    let callees = callees_of(caller);
    assert!(callees.iter().any(|name| name == callee_name));
    assert!(callees.iter().any(|name| name == "__anvill_function_return"));
    assert!(!callees.iter().any(|name| name == "__anvill_error"));

    // Return terminators have their state escape muted too.
    let mute_flags = state_args_undef(caller, "__anvill_function_return");
    assert!(mute_flags.iter().all(|&muted| muted));
}

// S4: the entry jumps to a redirected address with a declared function at
// the redirection target: resolved as a tail call to the effective target.
#[test]
fn test_tail_call_through_redirection() {
    // 0x4000: jmp 0x4100 (e9 fb 00 00 00); redirected to 0x4200.
    let mut program = x86_program(&[
        (0x4000, &[0xe9, 0xfb, 0x00, 0x00, 0x00]),
        (0x4200, &[0xc3]),
    ]);
    program.add_control_flow_redirection(0x4100, 0x4200);
    program.declare_function(x86_decl(&program, 0x4000)).unwrap();
    program.declare_function(x86_decl(&program, 0x4200)).unwrap();

    let (module, names) = lift_all(&program);
    let entry_name = names
        .iter()
        .find(|name| name.starts_with("sub_4000"))
        .unwrap();
    let target_name = names
        .iter()
        .find(|name| name.starts_with("sub_4200"))
        .unwrap();

    let wrapper = module.function(entry_name).unwrap();
    let callees = callees_of(wrapper);
    assert!(callees.iter().any(|name| name == target_name));
    // Nothing was lifted at the unredirected address.
    assert!(!callees.iter().any(|name| name.starts_with("sub_4100")));
    assert!(!callees.iter().any(|name| name == "__anvill_error"));
}

// S5: SPARC call followed by `unimp 32`: the resume address skips the
// structure-return word, so nothing ever decodes the unimp as code.
#[test]
fn test_sparc_structure_return_slot_is_skipped() {
    // 0x5000: call 0x5100; nop (delay); unimp 32; ret; nop (delay)
    let call_word = (1u32 << 30) | 0x40; // disp30 = 0x100 / 4
    let nop = 0x0100_0000;
    let unimp = 32;
    let ret = (2u32 << 30) | (0x38 << 19) | (31 << 14) | (1 << 13) | 8;
    let mut program = sparc_program(&[
        (0x5000, &[call_word, nop, unimp, ret, nop]),
        (0x5100, &[ret, nop]),
    ]);
    program
        .declare_function(sparc_decl(&program, 0x5000))
        .unwrap();
    program
        .declare_function(sparc_decl(&program, 0x5100))
        .unwrap();

    let (module, names) = lift_all(&program);
    let caller_name = names
        .iter()
        .find(|name| name.starts_with("sub_5000"))
        .unwrap();
    let wrapper = module.function(caller_name).unwrap();
    let callees = callees_of(wrapper);

    // Resume lands on the ret at 0x500c, not the unimp at 0x5008.
    assert!(
        !callees.iter().any(|name| name == "__anvill_error"),
        "the structure-return word was decoded as code"
    );
    assert!(callees.iter().any(|name| name == "__anvill_function_return"));
    assert!(callees.iter().any(|name| name.starts_with("sub_5100")));
}

/// Memory with one executable byte and a valid-but-unavailable tail.
struct TruncatedMemory {
    base: u64,
    code: Vec<u8>,
}

impl MemoryProvider for TruncatedMemory {
    fn query(&self, addr: u64) -> ByteQuery {
        let offset = addr.wrapping_sub(self.base) as usize;
        if let Some(&byte) = self.code.get(offset) {
            (
                byte,
                ByteAvailability::Available,
                BytePermission::ReadableExecutable,
            )
        } else if offset < self.code.len() + 16 {
            (
                0,
                ByteAvailability::Unavailable,
                BytePermission::ReadableExecutable,
            )
        } else {
            (0, ByteAvailability::Unknown, BytePermission::Unknown)
        }
    }
}

// S6: bytes become unavailable mid-function. Prior blocks stay intact, the
// failing block gets a muted error terminator, and a wrapper is produced.
#[test]
fn test_unavailable_bytes_terminate_with_error() {
    let program = x86_program(&[]);
    let memory = TruncatedMemory {
        base: 0x1000,
        code: vec![0x90],
    };
    let decl = x86_decl(&program, 0x1000);

    let mut lifter = EntityLifter::new(
        program.arch().clone(),
        LifterOptions::default(),
        &memory,
        &program,
        &program,
    );
    let name = lifter.lift_entity(&decl).unwrap();
    let module = lifter.into_module();
    let wrapper = module.function(&name).unwrap();

    assert!(!wrapper.is_declaration());
    let mute_flags = state_args_undef(wrapper, "__anvill_error");
    assert!(!mute_flags.is_empty());
    assert!(mute_flags.iter().all(|&muted| muted));
}

// A declaration-only result: the entry address is valid and executable by
// permission, but its byte value is missing.
#[test]
fn test_missing_entry_byte_yields_declaration() {
    let program = x86_program(&[]);
    let memory = TruncatedMemory {
        base: 0x1000,
        code: vec![],
    };
    let decl = x86_decl(&program, 0x1000);

    let mut lifter = EntityLifter::new(
        program.arch().clone(),
        LifterOptions::default(),
        &memory,
        &program,
        &program,
    );
    let name = lifter.lift_entity(&decl).unwrap();
    let module = lifter.into_module();
    assert!(module.function(&name).unwrap().is_declaration());
}

// The symbolic program counter leaves a relocatable anchor in the module.
#[test]
fn test_symbolic_pc_references_sentinel() {
    let mut program = x86_program(&[(0x1000, &[0x90, 0x90])]);
    program.declare_function(x86_decl(&program, 0x1000)).unwrap();

    let (module, names) = lift_all(&program);
    assert!(module.global("__anvill_pc").is_some());
    let wrapper = module.function(&names[0]).unwrap();
    let references_pc = wrapper.values.iter().any(|def| {
        matches!(
            def,
            ValueDef::Const(Const::SymbolOffset { symbol, offset, .. })
                if symbol == "__anvill_pc" && *offset == 0x1000
        )
    });
    assert!(references_pc);
}
