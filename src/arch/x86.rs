//! x86-64 architecture backend.
//!
//! Decoding is a thin wrapper around iced-x86; decoded instructions are
//! classified into the neutral [`Category`] from iced's flow control plus
//! a few mnemonic special cases. Semantics are emitted for the integer
//! subset that dominates compiled code (moves, stack ops, ALU, compares,
//! branches, calls); decodable instructions outside the subset lift as
//! no-ops with a debug log, which keeps decoding failures - not semantic
//! gaps - the only source of error terminators.
//!
//! Sub-register operands are modeled against their full 64-bit registers:
//! 32-bit writes zero-extend, 8/16-bit writes merge into the low bits.

use iced_x86::{ConditionCode, Decoder, DecoderOptions, Mnemonic, OpKind, Register};
use log::debug;

use crate::{
    arch::{Arch, ArchName, Category, Instruction, RegisterInfo},
    ir::{BinOp, CastOp, IcmpPred, Type, ValueId},
    lifter::SemanticsBuilder,
};

const GPR_NAMES: [&str; 16] = [
    "RAX", "RCX", "RDX", "RBX", "RSP", "RBP", "RSI", "RDI", "R8", "R9", "R10", "R11", "R12",
    "R13", "R14", "R15",
];

const FLAG_NAMES: [&str; 5] = ["ZF", "SF", "CF", "OF", "PF"];

fn full_register_name(reg: Register) -> Option<&'static str> {
    Some(match reg.full_register() {
        Register::RAX => "RAX",
        Register::RCX => "RCX",
        Register::RDX => "RDX",
        Register::RBX => "RBX",
        Register::RSP => "RSP",
        Register::RBP => "RBP",
        Register::RSI => "RSI",
        Register::RDI => "RDI",
        Register::R8 => "R8",
        Register::R9 => "R9",
        Register::R10 => "R10",
        Register::R11 => "R11",
        Register::R12 => "R12",
        Register::R13 => "R13",
        Register::R14 => "R14",
        Register::R15 => "R15",
        _ => return None,
    })
}

/// The x86-64 backend.
pub struct X86Arch {
    registers: Vec<RegisterInfo>,
}

impl X86Arch {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        let mut registers: Vec<RegisterInfo> = GPR_NAMES
            .iter()
            .map(|&name| RegisterInfo {
                name,
                ty: Type::Int(64),
            })
            .collect();
        for &name in &FLAG_NAMES {
            registers.push(RegisterInfo {
                name,
                ty: Type::Int(8),
            });
        }
        Self { registers }
    }

    fn decode_one(&self, addr: u64, bytes: &[u8]) -> Option<iced_x86::Instruction> {
        if bytes.is_empty() {
            return None;
        }
        let mut decoder = Decoder::with_ip(64, bytes, addr, DecoderOptions::NONE);
        let decoded = decoder.decode();
        if decoded.is_invalid() {
            None
        } else {
            Some(decoded)
        }
    }
}

impl Default for X86Arch {
    fn default() -> Self {
        Self::new()
    }
}

fn categorize(decoded: &iced_x86::Instruction) -> Category {
    use iced_x86::FlowControl;

    match decoded.mnemonic() {
        Mnemonic::Nop | Mnemonic::Fnop => return Category::NoOp,
        Mnemonic::Hlt | Mnemonic::Ud0 | Mnemonic::Ud1 | Mnemonic::Ud2 => return Category::Error,
        Mnemonic::Int | Mnemonic::Int3 | Mnemonic::Into | Mnemonic::Syscall
        | Mnemonic::Sysenter => return Category::AsyncHyperCall,
        _ => {}
    }

    match decoded.flow_control() {
        FlowControl::Next | FlowControl::XbeginXabortXend => Category::Normal,
        FlowControl::UnconditionalBranch => Category::DirectJump,
        FlowControl::IndirectBranch => Category::IndirectJump,
        FlowControl::ConditionalBranch => Category::ConditionalBranch,
        FlowControl::Return => Category::FunctionReturn,
        FlowControl::Call => Category::DirectFunctionCall,
        FlowControl::IndirectCall => Category::IndirectFunctionCall,
        FlowControl::Interrupt => Category::AsyncHyperCall,
        FlowControl::Exception => Category::Error,
    }
}

impl Arch for X86Arch {
    fn name(&self) -> ArchName {
        ArchName::Amd64
    }

    fn address_bits(&self) -> u16 {
        64
    }

    fn max_instruction_size(&self) -> usize {
        15
    }

    fn registers(&self) -> &[RegisterInfo] {
        &self.registers
    }

    fn register_by_name(&self, name: &str) -> Option<&RegisterInfo> {
        self.registers
            .iter()
            .find(|reg| reg.name.eq_ignore_ascii_case(name))
    }

    fn stack_pointer_register(&self) -> &'static str {
        "RSP"
    }

    fn decode(&self, addr: u64, bytes: &[u8], out: &mut Instruction) -> bool {
        out.reset();
        let Some(decoded) = self.decode_one(addr, bytes) else {
            return false;
        };

        out.pc = addr;
        out.next_pc = addr + decoded.len() as u64;
        out.delayed_pc = out.next_pc;
        out.bytes = bytes[..decoded.len()].to_vec();
        out.category = categorize(&decoded);
        out.branch_not_taken_pc = out.next_pc;
        out.branch_taken_pc = match decoded.op0_kind() {
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                decoded.near_branch_target()
            }
            _ => 0,
        };
        out.is_valid = true;
        true
    }

    fn decode_delayed(&self, _addr: u64, _bytes: &[u8], out: &mut Instruction) -> bool {
        // x86 has no delay slots.
        out.reset();
        false
    }

    fn may_have_delay_slot(&self, _inst: &Instruction) -> bool {
        false
    }

    fn next_instruction_is_delayed(
        &self,
        _inst: &Instruction,
        _delayed: &Instruction,
        _on_taken_path: bool,
    ) -> bool {
        false
    }

    fn lift_instruction(
        &self,
        inst: &Instruction,
        builder: &mut SemanticsBuilder,
        _is_delayed: bool,
    ) {
        builder.write_pc_bookkeeping(inst.pc, inst.next_pc);
        let Some(decoded) = self.decode_one(inst.pc, &inst.bytes) else {
            return;
        };
        lift_decoded(&decoded, inst, builder);
    }
}

/// Computes the effective address of a memory operand as a 64-bit value.
fn memory_address(
    decoded: &iced_x86::Instruction,
    builder: &mut SemanticsBuilder,
) -> ValueId {
    if decoded.is_ip_rel_memory_operand() {
        return builder.const_addr(decoded.ip_rel_memory_address());
    }

    let mut address = builder.const_addr(decoded.memory_displacement64());
    if let Some(base) = full_register_name(decoded.memory_base()) {
        let base_value = builder.read_reg(base);
        address = builder.binary(BinOp::Add, base_value, address);
    }
    if let Some(index) = full_register_name(decoded.memory_index()) {
        let mut index_value = builder.read_reg(index);
        let scale = decoded.memory_index_scale();
        if scale > 1 {
            let shift = builder.const_addr(u64::from(scale.trailing_zeros()));
            index_value = builder.binary(BinOp::Shl, index_value, shift);
        }
        address = builder.binary(BinOp::Add, address, index_value);
    }
    address
}

/// Bit position of a sub-register inside its full register: 8 for the
/// legacy high-byte registers, 0 otherwise.
fn sub_register_shift(reg: Register) -> u64 {
    match reg {
        Register::AH | Register::BH | Register::CH | Register::DH => 8,
        _ => 0,
    }
}

/// Reads operand `index` as a 64-bit value (zero-extended).
fn read_operand(
    decoded: &iced_x86::Instruction,
    index: u32,
    builder: &mut SemanticsBuilder,
) -> Option<ValueId> {
    match decoded.op_kind(index) {
        OpKind::Register => {
            let reg = decoded.op_register(index);
            let name = full_register_name(reg)?;
            let mut full = builder.read_reg(name);
            let bits = (reg.size() * 8) as u16;
            if bits == 64 {
                Some(full)
            } else {
                let shift = sub_register_shift(reg);
                if shift != 0 {
                    let amount = builder.const_addr(shift);
                    full = builder.binary(BinOp::LShr, full, amount);
                }
                let narrow = builder.cast(CastOp::Trunc, full, Type::Int(bits));
                Some(builder.cast(CastOp::Zext, narrow, Type::Int(64)))
            }
        }
        OpKind::Memory => {
            let address = memory_address(decoded, builder);
            let bits = (decoded.memory_size().size() * 8).max(8) as u16;
            let loaded = builder.read_mem(address, Type::Int(bits));
            if bits == 64 {
                Some(loaded)
            } else {
                Some(builder.cast(CastOp::Zext, loaded, Type::Int(64)))
            }
        }
        OpKind::Immediate8
        | OpKind::Immediate8_2nd
        | OpKind::Immediate16
        | OpKind::Immediate32
        | OpKind::Immediate64
        | OpKind::Immediate8to16
        | OpKind::Immediate8to32
        | OpKind::Immediate8to64
        | OpKind::Immediate32to64 => Some(builder.const_addr(decoded.immediate(index))),
        OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
            Some(builder.const_addr(decoded.near_branch_target()))
        }
        _ => None,
    }
}

/// Writes a 64-bit `value` to operand `index`, applying the x86-64
/// sub-register rules.
fn write_operand(
    decoded: &iced_x86::Instruction,
    index: u32,
    value: ValueId,
    builder: &mut SemanticsBuilder,
) {
    match decoded.op_kind(index) {
        OpKind::Register => {
            let reg = decoded.op_register(index);
            let Some(name) = full_register_name(reg) else {
                return;
            };
            let bits = (reg.size() * 8) as u16;
            let stored = match bits {
                64 => value,
                // 32-bit writes zero the upper half.
                32 => {
                    let narrow = builder.cast(CastOp::Trunc, value, Type::Int(32));
                    builder.cast(CastOp::Zext, narrow, Type::Int(64))
                }
                // 8/16-bit writes preserve the rest of the register.
                _ => {
                    let shift = sub_register_shift(reg);
                    let mask = ((1u64 << bits) - 1) << shift;
                    let old = builder.read_reg(name);
                    let keep_mask = builder.const_addr(!mask);
                    let kept = builder.binary(BinOp::And, old, keep_mask);
                    let low_mask = builder.const_addr((1u64 << bits) - 1);
                    let mut low = builder.binary(BinOp::And, value, low_mask);
                    if shift != 0 {
                        let amount = builder.const_addr(shift);
                        low = builder.binary(BinOp::Shl, low, amount);
                    }
                    builder.binary(BinOp::Or, kept, low)
                }
            };
            builder.write_reg(name, stored);
        }
        OpKind::Memory => {
            let address = memory_address(decoded, builder);
            let bits = (decoded.memory_size().size() * 8).max(8) as u16;
            let stored = if bits == 64 {
                value
            } else {
                builder.cast(CastOp::Trunc, value, Type::Int(bits))
            };
            builder.write_mem(address, stored);
        }
        _ => {}
    }
}

struct FlagUpdate {
    result: ValueId,
    carry: Option<ValueId>,
    overflow: Option<ValueId>,
}

fn write_flags(builder: &mut SemanticsBuilder, update: &FlagUpdate) {
    let zero = builder.const_addr(0);
    let zf = builder.icmp(IcmpPred::Eq, update.result, zero);
    builder.set_flag("ZF", zf);
    let sf = builder.icmp(IcmpPred::Slt, update.result, zero);
    builder.set_flag("SF", sf);
    if let Some(carry) = update.carry {
        builder.set_flag("CF", carry);
    }
    if let Some(overflow) = update.overflow {
        builder.set_flag("OF", overflow);
    }

    // PF covers the low result byte.
    let mut parity = update.result;
    for shift in [4u64, 2, 1] {
        let amount = builder.const_addr(shift);
        let shifted = builder.binary(BinOp::LShr, parity, amount);
        parity = builder.binary(BinOp::Xor, parity, shifted);
    }
    let one = builder.const_addr(1);
    let low_bit = builder.binary(BinOp::And, parity, one);
    let zero = builder.const_addr(0);
    let pf = builder.icmp(IcmpPred::Eq, low_bit, zero);
    builder.set_flag("PF", pf);
}

fn add_with_flags(builder: &mut SemanticsBuilder, lhs: ValueId, rhs: ValueId) -> ValueId {
    let result = builder.binary(BinOp::Add, lhs, rhs);
    let carry = builder.icmp(IcmpPred::Ult, result, lhs);
    let lhs_diff = builder.binary(BinOp::Xor, lhs, result);
    let rhs_diff = builder.binary(BinOp::Xor, rhs, result);
    let signs = builder.binary(BinOp::And, lhs_diff, rhs_diff);
    let zero = builder.const_addr(0);
    let overflow = builder.icmp(IcmpPred::Slt, signs, zero);
    write_flags(
        builder,
        &FlagUpdate {
            result,
            carry: Some(carry),
            overflow: Some(overflow),
        },
    );
    result
}

fn sub_with_flags(builder: &mut SemanticsBuilder, lhs: ValueId, rhs: ValueId) -> ValueId {
    let result = builder.binary(BinOp::Sub, lhs, rhs);
    let carry = builder.icmp(IcmpPred::Ult, lhs, rhs);
    let operand_diff = builder.binary(BinOp::Xor, lhs, rhs);
    let result_diff = builder.binary(BinOp::Xor, lhs, result);
    let signs = builder.binary(BinOp::And, operand_diff, result_diff);
    let zero = builder.const_addr(0);
    let overflow = builder.icmp(IcmpPred::Slt, signs, zero);
    write_flags(
        builder,
        &FlagUpdate {
            result,
            carry: Some(carry),
            overflow: Some(overflow),
        },
    );
    result
}

fn logic_with_flags(
    builder: &mut SemanticsBuilder,
    op: BinOp,
    lhs: ValueId,
    rhs: ValueId,
) -> ValueId {
    let result = builder.binary(op, lhs, rhs);
    let zero = builder.const_int(Type::Int(1), 0);
    write_flags(
        builder,
        &FlagUpdate {
            result,
            carry: Some(zero),
            overflow: Some(zero),
        },
    );
    result
}

/// Lowers an iced condition code to an `i1` over the flag registers.
fn condition_value(code: ConditionCode, builder: &mut SemanticsBuilder) -> ValueId {
    let flag = |builder: &mut SemanticsBuilder, name: &str| {
        let raw = builder.read_reg(name);
        let zero = builder.const_int(Type::Int(8), 0);
        builder.icmp(IcmpPred::Ne, raw, zero)
    };
    let not = |builder: &mut SemanticsBuilder, value: ValueId| {
        let one = builder.const_int(Type::Int(1), 1);
        builder.binary(BinOp::Xor, value, one)
    };

    match code {
        ConditionCode::e => flag(builder, "ZF"),
        ConditionCode::ne => {
            let zf = flag(builder, "ZF");
            not(builder, zf)
        }
        ConditionCode::s => flag(builder, "SF"),
        ConditionCode::ns => {
            let sf = flag(builder, "SF");
            not(builder, sf)
        }
        ConditionCode::o => flag(builder, "OF"),
        ConditionCode::no => {
            let of = flag(builder, "OF");
            not(builder, of)
        }
        ConditionCode::b => flag(builder, "CF"),
        ConditionCode::ae => {
            let cf = flag(builder, "CF");
            not(builder, cf)
        }
        ConditionCode::be => {
            let cf = flag(builder, "CF");
            let zf = flag(builder, "ZF");
            builder.binary(BinOp::Or, cf, zf)
        }
        ConditionCode::a => {
            let cf = flag(builder, "CF");
            let zf = flag(builder, "ZF");
            let either = builder.binary(BinOp::Or, cf, zf);
            not(builder, either)
        }
        ConditionCode::l => {
            let sf = flag(builder, "SF");
            let of = flag(builder, "OF");
            builder.icmp(IcmpPred::Ne, sf, of)
        }
        ConditionCode::ge => {
            let sf = flag(builder, "SF");
            let of = flag(builder, "OF");
            builder.icmp(IcmpPred::Eq, sf, of)
        }
        ConditionCode::le => {
            let zf = flag(builder, "ZF");
            let sf = flag(builder, "SF");
            let of = flag(builder, "OF");
            let lt = builder.icmp(IcmpPred::Ne, sf, of);
            builder.binary(BinOp::Or, zf, lt)
        }
        ConditionCode::g => {
            let zf = flag(builder, "ZF");
            let sf = flag(builder, "SF");
            let of = flag(builder, "OF");
            let ge = builder.icmp(IcmpPred::Eq, sf, of);
            let nz = not(builder, zf);
            builder.binary(BinOp::And, ge, nz)
        }
        ConditionCode::p => flag(builder, "PF"),
        ConditionCode::np => {
            let pf = flag(builder, "PF");
            not(builder, pf)
        }
        ConditionCode::None => builder.const_int(Type::Int(1), 1),
    }
}

fn push_value(builder: &mut SemanticsBuilder, value: ValueId) {
    let rsp = builder.read_reg("RSP");
    let eight = builder.const_addr(8);
    let new_rsp = builder.binary(BinOp::Sub, rsp, eight);
    builder.write_reg("RSP", new_rsp);
    builder.write_mem(new_rsp, value);
}

fn pop_value(builder: &mut SemanticsBuilder) -> ValueId {
    let rsp = builder.read_reg("RSP");
    let value = builder.read_mem(rsp, Type::Int(64));
    let eight = builder.const_addr(8);
    let new_rsp = builder.binary(BinOp::Add, rsp, eight);
    builder.write_reg("RSP", new_rsp);
    value
}

#[allow(clippy::too_many_lines)]
fn lift_decoded(
    decoded: &iced_x86::Instruction,
    inst: &Instruction,
    builder: &mut SemanticsBuilder,
) {
    match decoded.mnemonic() {
        Mnemonic::Nop | Mnemonic::Fnop | Mnemonic::Hlt | Mnemonic::Ud0 | Mnemonic::Ud1
        | Mnemonic::Ud2 | Mnemonic::Int | Mnemonic::Int3 | Mnemonic::Into | Mnemonic::Syscall
        | Mnemonic::Sysenter => {}

        Mnemonic::Mov => {
            if let Some(value) = read_operand(decoded, 1, builder) {
                write_operand(decoded, 0, value, builder);
            }
        }
        Mnemonic::Movzx => {
            if let Some(value) = read_operand(decoded, 1, builder) {
                write_operand(decoded, 0, value, builder);
            }
        }
        Mnemonic::Movsx | Mnemonic::Movsxd => {
            if let Some(value) = read_operand(decoded, 1, builder) {
                let src_bits = (source_size_bits(decoded)).max(8);
                let narrow = builder.cast(CastOp::Trunc, value, Type::Int(src_bits));
                let wide = builder.cast(CastOp::Sext, narrow, Type::Int(64));
                write_operand(decoded, 0, wide, builder);
            }
        }
        Mnemonic::Lea => {
            let address = memory_address(decoded, builder);
            write_operand(decoded, 0, address, builder);
        }
        Mnemonic::Push => {
            if let Some(value) = read_operand(decoded, 0, builder) {
                push_value(builder, value);
            }
        }
        Mnemonic::Pop => {
            let value = pop_value(builder);
            write_operand(decoded, 0, value, builder);
        }
        Mnemonic::Xchg => {
            if let (Some(a), Some(b)) = (
                read_operand(decoded, 0, builder),
                read_operand(decoded, 1, builder),
            ) {
                write_operand(decoded, 0, b, builder);
                write_operand(decoded, 1, a, builder);
            }
        }
        Mnemonic::Leave => {
            let rbp = builder.read_reg("RBP");
            builder.write_reg("RSP", rbp);
            let value = pop_value(builder);
            builder.write_reg("RBP", value);
        }

        Mnemonic::Add => {
            if let (Some(lhs), Some(rhs)) = (
                read_operand(decoded, 0, builder),
                read_operand(decoded, 1, builder),
            ) {
                let result = add_with_flags(builder, lhs, rhs);
                write_operand(decoded, 0, result, builder);
            }
        }
        Mnemonic::Sub => {
            if let (Some(lhs), Some(rhs)) = (
                read_operand(decoded, 0, builder),
                read_operand(decoded, 1, builder),
            ) {
                let result = sub_with_flags(builder, lhs, rhs);
                write_operand(decoded, 0, result, builder);
            }
        }
        Mnemonic::Cmp => {
            if let (Some(lhs), Some(rhs)) = (
                read_operand(decoded, 0, builder),
                read_operand(decoded, 1, builder),
            ) {
                sub_with_flags(builder, lhs, rhs);
            }
        }
        Mnemonic::And | Mnemonic::Or | Mnemonic::Xor => {
            let op = match decoded.mnemonic() {
                Mnemonic::And => BinOp::And,
                Mnemonic::Or => BinOp::Or,
                _ => BinOp::Xor,
            };
            if let (Some(lhs), Some(rhs)) = (
                read_operand(decoded, 0, builder),
                read_operand(decoded, 1, builder),
            ) {
                let result = logic_with_flags(builder, op, lhs, rhs);
                write_operand(decoded, 0, result, builder);
            }
        }
        Mnemonic::Test => {
            if let (Some(lhs), Some(rhs)) = (
                read_operand(decoded, 0, builder),
                read_operand(decoded, 1, builder),
            ) {
                logic_with_flags(builder, BinOp::And, lhs, rhs);
            }
        }
        Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Sar => {
            let op = match decoded.mnemonic() {
                Mnemonic::Shl => BinOp::Shl,
                Mnemonic::Shr => BinOp::LShr,
                _ => BinOp::AShr,
            };
            if let (Some(value), Some(count)) = (
                read_operand(decoded, 0, builder),
                read_operand(decoded, 1, builder),
            ) {
                let mask = builder.const_addr(0x3f);
                let amount = builder.binary(BinOp::And, count, mask);
                let result = builder.binary(op, value, amount);
                write_flags(
                    builder,
                    &FlagUpdate {
                        result,
                        carry: None,
                        overflow: None,
                    },
                );
                write_operand(decoded, 0, result, builder);
            }
        }
        Mnemonic::Inc | Mnemonic::Dec => {
            if let Some(value) = read_operand(decoded, 0, builder) {
                let one = builder.const_addr(1);
                let result = if decoded.mnemonic() == Mnemonic::Inc {
                    builder.binary(BinOp::Add, value, one)
                } else {
                    builder.binary(BinOp::Sub, value, one)
                };
                // INC/DEC leave CF untouched.
                write_flags(
                    builder,
                    &FlagUpdate {
                        result,
                        carry: None,
                        overflow: None,
                    },
                );
                write_operand(decoded, 0, result, builder);
            }
        }
        Mnemonic::Neg => {
            if let Some(value) = read_operand(decoded, 0, builder) {
                let zero = builder.const_addr(0);
                let result = sub_with_flags(builder, zero, value);
                write_operand(decoded, 0, result, builder);
            }
        }
        Mnemonic::Not => {
            if let Some(value) = read_operand(decoded, 0, builder) {
                let ones = builder.const_addr(u64::MAX);
                let result = builder.binary(BinOp::Xor, value, ones);
                write_operand(decoded, 0, result, builder);
            }
        }
        Mnemonic::Imul => {
            // Two- and three-operand forms; the one-operand widening form
            // is left unmodeled.
            if decoded.op_count() >= 2 {
                let lhs_index = if decoded.op_count() == 3 { 1 } else { 0 };
                if let (Some(lhs), Some(rhs)) = (
                    read_operand(decoded, lhs_index, builder),
                    read_operand(decoded, decoded.op_count() - 1, builder),
                ) {
                    let result = builder.binary(BinOp::Mul, lhs, rhs);
                    write_operand(decoded, 0, result, builder);
                }
            } else {
                debug!("unmodeled one-operand imul at 0x{:x}", inst.pc);
            }
        }
        Mnemonic::Cdq => {
            let rax = builder.read_reg("RAX");
            let low = builder.cast(CastOp::Trunc, rax, Type::Int(32));
            let wide = builder.cast(CastOp::Sext, low, Type::Int(64));
            let thirty_one = builder.const_addr(31);
            let sign = builder.binary(BinOp::AShr, wide, thirty_one);
            let mask = builder.const_addr(0xffff_ffff);
            let edx = builder.binary(BinOp::And, sign, mask);
            builder.write_reg("RDX", edx);
        }
        Mnemonic::Cwde => {
            let rax = builder.read_reg("RAX");
            let low = builder.cast(CastOp::Trunc, rax, Type::Int(16));
            let wide = builder.cast(CastOp::Sext, low, Type::Int(32));
            let eax = builder.cast(CastOp::Zext, wide, Type::Int(64));
            builder.write_reg("RAX", eax);
        }
        Mnemonic::Cdqe => {
            let rax = builder.read_reg("RAX");
            let low = builder.cast(CastOp::Trunc, rax, Type::Int(32));
            let wide = builder.cast(CastOp::Sext, low, Type::Int(64));
            builder.write_reg("RAX", wide);
        }

        Mnemonic::Jmp => {
            if let Some(target) = read_operand(decoded, 0, builder) {
                builder.write_pc_dynamic(target);
            }
        }
        Mnemonic::Call => {
            let return_pc = builder.const_addr(inst.next_pc);
            push_value(builder, return_pc);
            let return_pc = builder.const_addr(inst.next_pc);
            builder.write_reg(crate::lifter::state::RETURN_PC_VAR, return_pc);
            if let Some(target) = read_operand(decoded, 0, builder) {
                builder.write_pc_dynamic(target);
            }
        }
        Mnemonic::Ret => {
            let target = pop_value(builder);
            if decoded.op_count() > 0 {
                // ret imm16 releases the callee-cleaned bytes.
                let extra = builder.const_addr(decoded.immediate(0));
                let rsp = builder.read_reg("RSP");
                let adjusted = builder.binary(BinOp::Add, rsp, extra);
                builder.write_reg("RSP", adjusted);
            }
            builder.write_pc_dynamic(target);
        }

        Mnemonic::Loop | Mnemonic::Loope | Mnemonic::Loopne => {
            let rcx = builder.read_reg("RCX");
            let one = builder.const_addr(1);
            let next = builder.binary(BinOp::Sub, rcx, one);
            builder.write_reg("RCX", next);
            let zero = builder.const_addr(0);
            let cond = builder.icmp(IcmpPred::Ne, next, zero);
            finish_conditional(decoded, inst, cond, builder);
        }
        Mnemonic::Jrcxz | Mnemonic::Jecxz => {
            let rcx = builder.read_reg("RCX");
            let zero = builder.const_addr(0);
            let cond = builder.icmp(IcmpPred::Eq, rcx, zero);
            finish_conditional(decoded, inst, cond, builder);
        }

        mnemonic => {
            if decoded.flow_control() == iced_x86::FlowControl::ConditionalBranch {
                let cond = condition_value(decoded.condition_code(), builder);
                finish_conditional(decoded, inst, cond, builder);
            } else {
                debug!("no semantics for {mnemonic:?} at 0x{:x}", inst.pc);
            }
        }
    }
}

fn finish_conditional(
    decoded: &iced_x86::Instruction,
    inst: &Instruction,
    cond: ValueId,
    builder: &mut SemanticsBuilder,
) {
    builder.set_branch_taken(cond);
    let taken = builder.const_addr(decoded.near_branch_target());
    let not_taken = builder.const_addr(inst.next_pc);
    let target = builder.select(cond, taken, not_taken);
    builder.write_pc_dynamic(target);
}

fn source_size_bits(decoded: &iced_x86::Instruction) -> u16 {
    match decoded.op1_kind() {
        OpKind::Register => (decoded.op1_register().size() * 8) as u16,
        OpKind::Memory => (decoded.memory_size().size() * 8) as u16,
        _ => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], addr: u64) -> Instruction {
        let arch = X86Arch::new();
        let mut inst = Instruction::default();
        assert!(arch.decode(addr, bytes, &mut inst));
        inst
    }

    #[test]
    fn test_decode_nop() {
        let inst = decode(&[0x90], 0x1000);
        assert_eq!(inst.category, Category::NoOp);
        assert_eq!(inst.next_pc, 0x1001);
        assert_eq!(inst.bytes, vec![0x90]);
    }

    #[test]
    fn test_decode_direct_jump() {
        // jmp +0 (to next instruction): eb 00
        let inst = decode(&[0xeb, 0x00], 0x2000);
        assert_eq!(inst.category, Category::DirectJump);
        assert_eq!(inst.branch_taken_pc, 0x2002);
    }

    #[test]
    fn test_decode_self_jump() {
        // jmp . : eb fe
        let inst = decode(&[0xeb, 0xfe], 0x2000);
        assert_eq!(inst.category, Category::DirectJump);
        assert_eq!(inst.branch_taken_pc, 0x2000);
    }

    #[test]
    fn test_decode_call_and_ret() {
        // call rel32 +0xfb (0x3000 + 5 + 0xfb = 0x3100)
        let inst = decode(&[0xe8, 0xfb, 0x00, 0x00, 0x00], 0x3000);
        assert_eq!(inst.category, Category::DirectFunctionCall);
        assert_eq!(inst.branch_taken_pc, 0x3100);
        assert_eq!(inst.branch_not_taken_pc, 0x3005);

        let inst = decode(&[0xc3], 0x3005);
        assert_eq!(inst.category, Category::FunctionReturn);
    }

    #[test]
    fn test_decode_conditional_branch() {
        // je +2
        let inst = decode(&[0x74, 0x02], 0x4000);
        assert_eq!(inst.category, Category::ConditionalBranch);
        assert_eq!(inst.branch_taken_pc, 0x4004);
        assert_eq!(inst.branch_not_taken_pc, 0x4002);
    }

    #[test]
    fn test_decode_indirect_jump_and_call() {
        // jmp rax : ff e0; call rax : ff d0
        let inst = decode(&[0xff, 0xe0], 0x5000);
        assert_eq!(inst.category, Category::IndirectJump);
        let inst = decode(&[0xff, 0xd0], 0x5000);
        assert_eq!(inst.category, Category::IndirectFunctionCall);
    }

    #[test]
    fn test_decode_error_and_hypercall() {
        // ud2 : 0f 0b
        let inst = decode(&[0x0f, 0x0b], 0x6000);
        assert_eq!(inst.category, Category::Error);
        // syscall : 0f 05
        let inst = decode(&[0x0f, 0x05], 0x6000);
        assert_eq!(inst.category, Category::AsyncHyperCall);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let arch = X86Arch::new();
        let mut inst = Instruction::default();
        // A lone 0xe8 is a truncated call.
        assert!(!arch.decode(0x1000, &[0xe8], &mut inst));
        assert!(!inst.is_valid());
        assert!(!arch.decode(0x1000, &[], &mut inst));
    }

    #[test]
    fn test_register_lookup_aliases_case() {
        let arch = X86Arch::new();
        assert!(arch.register_by_name("RAX").is_some());
        assert!(arch.register_by_name("rax").is_some());
        assert!(arch.register_by_name("XMM0").is_none());
    }
}
