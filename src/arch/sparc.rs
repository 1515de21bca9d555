//! SPARC32 (v8) architecture backend.
//!
//! Instructions are fixed-width 32-bit big-endian words, decoded by hand.
//! Control transfers execute with a delay slot; conditional branches carry
//! an annul bit that decides whether the slot executes on the not-taken
//! path (and, for branch-always, at all). The backend models a flat
//! register file: `save`/`restore` copy between the out and in registers
//! and adjust the stack pointer, but window rotation beyond the visible
//! window is not modeled.

use log::debug;

use crate::{
    arch::{Arch, ArchName, Category, Instruction, RegisterInfo},
    ir::{BinOp, CastOp, IcmpPred, Type, ValueId},
    lifter::{state::RETURN_PC_VAR, SemanticsBuilder},
};

const OP_BRANCH: u32 = 0;
const OP_CALL: u32 = 1;
const OP_ALU: u32 = 2;
const OP_MEM: u32 = 3;

const OP2_UNIMP: u32 = 0b000;
const OP2_BICC: u32 = 0b010;
const OP2_SETHI: u32 = 0b100;

const OP3_JMPL: u32 = 0x38;
const OP3_RETT: u32 = 0x39;
const OP3_TICC: u32 = 0x3a;
const OP3_SAVE: u32 = 0x3c;
const OP3_RESTORE: u32 = 0x3d;

const COND_NEVER: u32 = 0b0000;
const COND_ALWAYS: u32 = 0b1000;

const REG_O7: u32 = 15;
const REG_I7: u32 = 31;

fn gpr_name(index: u32) -> &'static str {
    const NAMES: [&str; 32] = [
        "G0", "G1", "G2", "G3", "G4", "G5", "G6", "G7", "O0", "O1", "O2", "O3", "O4", "O5", "O6",
        "O7", "L0", "L1", "L2", "L3", "L4", "L5", "L6", "L7", "I0", "I1", "I2", "I3", "I4", "I5",
        "I6", "I7",
    ];
    NAMES[index as usize]
}

#[derive(Debug, Clone, Copy)]
struct Word {
    raw: u32,
}

impl Word {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        Some(Self {
            raw: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }

    fn op(self) -> u32 {
        self.raw >> 30
    }

    fn op2(self) -> u32 {
        (self.raw >> 22) & 0x7
    }

    fn op3(self) -> u32 {
        (self.raw >> 19) & 0x3f
    }

    fn rd(self) -> u32 {
        (self.raw >> 25) & 0x1f
    }

    fn rs1(self) -> u32 {
        (self.raw >> 14) & 0x1f
    }

    fn rs2(self) -> u32 {
        self.raw & 0x1f
    }

    fn uses_immediate(self) -> bool {
        (self.raw >> 13) & 1 == 1
    }

    fn simm13(self) -> i32 {
        ((self.raw & 0x1fff) as i32) << 19 >> 19
    }

    fn imm22(self) -> u32 {
        self.raw & 0x3f_ffff
    }

    fn disp22(self) -> i32 {
        ((self.raw & 0x3f_ffff) as i32) << 10 >> 10
    }

    fn disp30(self) -> i32 {
        ((self.raw & 0x3fff_ffff) as i32) << 2 >> 2
    }

    fn annul(self) -> bool {
        (self.raw >> 29) & 1 == 1
    }

    fn cond(self) -> u32 {
        (self.raw >> 25) & 0xf
    }

    fn is_nop(self) -> bool {
        // nop == sethi 0, %g0
        self.op() == OP_BRANCH && self.op2() == OP2_SETHI && self.rd() == 0 && self.imm22() == 0
    }
}

/// The SPARC32 backend.
pub struct SparcArch {
    registers: Vec<RegisterInfo>,
}

impl SparcArch {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        let mut registers: Vec<RegisterInfo> = (0..32)
            .map(|index| RegisterInfo {
                name: gpr_name(index),
                ty: Type::Int(32),
            })
            .collect();
        for name in ["ICC_N", "ICC_Z", "ICC_V", "ICC_C"] {
            registers.push(RegisterInfo {
                name,
                ty: Type::Int(8),
            });
        }
        Self { registers }
    }

    fn categorize(word: Word) -> Category {
        match word.op() {
            OP_CALL => Category::DirectFunctionCall,
            OP_BRANCH => match word.op2() {
                OP2_UNIMP => Category::Error,
                OP2_BICC => match word.cond() {
                    COND_NEVER => Category::NoOp,
                    COND_ALWAYS => Category::DirectJump,
                    _ => Category::ConditionalBranch,
                },
                OP2_SETHI => {
                    if word.is_nop() {
                        Category::NoOp
                    } else {
                        Category::Normal
                    }
                }
                _ => Category::Normal,
            },
            OP_ALU => match word.op3() {
                OP3_JMPL => {
                    if word.rd() == REG_O7 {
                        Category::IndirectFunctionCall
                    } else if word.rd() == 0
                        && word.uses_immediate()
                        && word.simm13() == 8
                        && (word.rs1() == REG_I7 || word.rs1() == REG_O7)
                    {
                        // ret (jmpl %i7+8) / retl (jmpl %o7+8)
                        Category::FunctionReturn
                    } else {
                        Category::IndirectJump
                    }
                }
                OP3_RETT => Category::FunctionReturn,
                OP3_TICC => {
                    if word.cond() == COND_ALWAYS {
                        Category::AsyncHyperCall
                    } else {
                        Category::ConditionalAsyncHyperCall
                    }
                }
                _ => Category::Normal,
            },
            _ => Category::Normal,
        }
    }

    fn decode_word(addr: u64, bytes: &[u8], out: &mut Instruction) -> Option<Word> {
        out.reset();
        let word = Word::from_bytes(bytes)?;

        out.pc = addr;
        out.next_pc = addr + 4;
        out.delayed_pc = addr + 4;
        out.bytes = bytes[..4].to_vec();
        out.category = Self::categorize(word);
        out.is_valid = true;

        match word.op() {
            OP_CALL => {
                out.branch_taken_pc = addr.wrapping_add_signed(i64::from(word.disp30()) * 4);
                out.branch_not_taken_pc = addr + 8;
            }
            OP_BRANCH if word.op2() == OP2_BICC => {
                out.branch_taken_pc = addr.wrapping_add_signed(i64::from(word.disp22()) * 4);
                out.branch_not_taken_pc = addr + 8;
            }
            OP_ALU if word.op3() == OP3_JMPL => {
                out.branch_not_taken_pc = addr + 8;
            }
            _ => {
                out.branch_not_taken_pc = out.next_pc;
            }
        }
        Some(word)
    }
}

impl Default for SparcArch {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for SparcArch {
    fn name(&self) -> ArchName {
        ArchName::Sparc32
    }

    fn address_bits(&self) -> u16 {
        32
    }

    fn max_instruction_size(&self) -> usize {
        4
    }

    fn registers(&self) -> &[RegisterInfo] {
        &self.registers
    }

    fn register_by_name(&self, name: &str) -> Option<&RegisterInfo> {
        let canonical = if name.eq_ignore_ascii_case("SP") {
            "O6"
        } else if name.eq_ignore_ascii_case("FP") {
            "I6"
        } else {
            name
        };
        self.registers
            .iter()
            .find(|reg| reg.name.eq_ignore_ascii_case(canonical))
    }

    fn stack_pointer_register(&self) -> &'static str {
        "O6"
    }

    fn decode(&self, addr: u64, bytes: &[u8], out: &mut Instruction) -> bool {
        Self::decode_word(addr, bytes, out).is_some()
    }

    fn decode_delayed(&self, addr: u64, bytes: &[u8], out: &mut Instruction) -> bool {
        // A delay slot holds an ordinary instruction; control transfers in
        // delay slots are not supported by this backend.
        if Self::decode_word(addr, bytes, out).is_none() {
            return false;
        }
        matches!(out.category, Category::Normal | Category::NoOp)
    }

    fn may_have_delay_slot(&self, inst: &Instruction) -> bool {
        let Some(word) = Word::from_bytes(&inst.bytes) else {
            return false;
        };
        match word.op() {
            OP_CALL => true,
            OP_BRANCH => word.op2() == OP2_BICC,
            OP_ALU => matches!(word.op3(), OP3_JMPL | OP3_RETT),
            _ => false,
        }
    }

    fn next_instruction_is_delayed(
        &self,
        inst: &Instruction,
        delayed: &Instruction,
        on_taken_path: bool,
    ) -> bool {
        if !delayed.is_valid() {
            return false;
        }
        let Some(word) = Word::from_bytes(&inst.bytes) else {
            return false;
        };
        match word.op() {
            OP_CALL => on_taken_path,
            OP_ALU if matches!(word.op3(), OP3_JMPL | OP3_RETT) => on_taken_path,
            OP_BRANCH if word.op2() == OP2_BICC => {
                if !word.annul() {
                    return true;
                }
                // Annulled: branch-always never executes the slot; a
                // conditional branch executes it on the taken path only.
                match word.cond() {
                    COND_ALWAYS | COND_NEVER => false,
                    _ => on_taken_path,
                }
            }
            _ => false,
        }
    }

    fn lift_instruction(
        &self,
        inst: &Instruction,
        builder: &mut SemanticsBuilder,
        _is_delayed: bool,
    ) {
        builder.write_pc_bookkeeping(inst.pc, inst.next_pc);
        let Some(word) = Word::from_bytes(&inst.bytes) else {
            return;
        };
        lift_word(word, inst, builder);
    }

    fn is_sparc(&self) -> bool {
        true
    }
}

fn read_gpr(builder: &mut SemanticsBuilder, index: u32) -> ValueId {
    if index == 0 {
        builder.const_int(Type::Int(32), 0)
    } else {
        builder.read_reg(gpr_name(index))
    }
}

fn write_gpr(builder: &mut SemanticsBuilder, index: u32, value: ValueId) {
    // %g0 discards writes.
    if index != 0 {
        builder.write_reg(gpr_name(index), value);
    }
}

/// Second ALU operand: `%rs2` or the sign-extended 13-bit immediate.
fn operand2(builder: &mut SemanticsBuilder, word: Word) -> ValueId {
    if word.uses_immediate() {
        builder.const_int(Type::Int(32), word.simm13() as u32 as u64)
    } else {
        read_gpr(builder, word.rs2())
    }
}

fn effective_address(builder: &mut SemanticsBuilder, word: Word) -> ValueId {
    let base = read_gpr(builder, word.rs1());
    let offset = operand2(builder, word);
    builder.binary(BinOp::Add, base, offset)
}

fn set_icc_logic(builder: &mut SemanticsBuilder, result: ValueId) {
    let zero = builder.const_int(Type::Int(32), 0);
    let z = builder.icmp(IcmpPred::Eq, result, zero);
    builder.set_flag("ICC_Z", z);
    let n = builder.icmp(IcmpPred::Slt, result, zero);
    builder.set_flag("ICC_N", n);
    let fls = builder.const_int(Type::Int(1), 0);
    builder.set_flag("ICC_C", fls);
    builder.set_flag("ICC_V", fls);
}

fn set_icc_add(builder: &mut SemanticsBuilder, lhs: ValueId, rhs: ValueId, result: ValueId) {
    let zero = builder.const_int(Type::Int(32), 0);
    let z = builder.icmp(IcmpPred::Eq, result, zero);
    builder.set_flag("ICC_Z", z);
    let n = builder.icmp(IcmpPred::Slt, result, zero);
    builder.set_flag("ICC_N", n);
    let c = builder.icmp(IcmpPred::Ult, result, lhs);
    builder.set_flag("ICC_C", c);
    let lhs_diff = builder.binary(BinOp::Xor, lhs, result);
    let rhs_diff = builder.binary(BinOp::Xor, rhs, result);
    let signs = builder.binary(BinOp::And, lhs_diff, rhs_diff);
    let v = builder.icmp(IcmpPred::Slt, signs, zero);
    builder.set_flag("ICC_V", v);
}

fn set_icc_sub(builder: &mut SemanticsBuilder, lhs: ValueId, rhs: ValueId, result: ValueId) {
    let zero = builder.const_int(Type::Int(32), 0);
    let z = builder.icmp(IcmpPred::Eq, result, zero);
    builder.set_flag("ICC_Z", z);
    let n = builder.icmp(IcmpPred::Slt, result, zero);
    builder.set_flag("ICC_N", n);
    let c = builder.icmp(IcmpPred::Ult, lhs, rhs);
    builder.set_flag("ICC_C", c);
    let operand_diff = builder.binary(BinOp::Xor, lhs, rhs);
    let result_diff = builder.binary(BinOp::Xor, lhs, result);
    let signs = builder.binary(BinOp::And, operand_diff, result_diff);
    let v = builder.icmp(IcmpPred::Slt, signs, zero);
    builder.set_flag("ICC_V", v);
}

/// Lowers a Bicc condition field to an `i1` over the ICC flags.
fn branch_condition(builder: &mut SemanticsBuilder, cond: u32) -> ValueId {
    let flag = |builder: &mut SemanticsBuilder, name: &str| {
        let raw = builder.read_reg(name);
        let zero = builder.const_int(Type::Int(8), 0);
        builder.icmp(IcmpPred::Ne, raw, zero)
    };
    let not = |builder: &mut SemanticsBuilder, value: ValueId| {
        let one = builder.const_int(Type::Int(1), 1);
        builder.binary(BinOp::Xor, value, one)
    };

    match cond {
        COND_NEVER => builder.const_int(Type::Int(1), 0),
        COND_ALWAYS => builder.const_int(Type::Int(1), 1),
        // bne / be
        0b1001 => {
            let z = flag(builder, "ICC_Z");
            not(builder, z)
        }
        0b0001 => flag(builder, "ICC_Z"),
        // bg / ble
        0b1010 => {
            let z = flag(builder, "ICC_Z");
            let n = flag(builder, "ICC_N");
            let v = flag(builder, "ICC_V");
            let nv = builder.binary(BinOp::Xor, n, v);
            let le = builder.binary(BinOp::Or, z, nv);
            not(builder, le)
        }
        0b0010 => {
            let z = flag(builder, "ICC_Z");
            let n = flag(builder, "ICC_N");
            let v = flag(builder, "ICC_V");
            let nv = builder.binary(BinOp::Xor, n, v);
            builder.binary(BinOp::Or, z, nv)
        }
        // bge / bl
        0b1011 => {
            let n = flag(builder, "ICC_N");
            let v = flag(builder, "ICC_V");
            let nv = builder.binary(BinOp::Xor, n, v);
            not(builder, nv)
        }
        0b0011 => {
            let n = flag(builder, "ICC_N");
            let v = flag(builder, "ICC_V");
            builder.binary(BinOp::Xor, n, v)
        }
        // bgu / bleu
        0b1100 => {
            let c = flag(builder, "ICC_C");
            let z = flag(builder, "ICC_Z");
            let cz = builder.binary(BinOp::Or, c, z);
            not(builder, cz)
        }
        0b0100 => {
            let c = flag(builder, "ICC_C");
            let z = flag(builder, "ICC_Z");
            builder.binary(BinOp::Or, c, z)
        }
        // bcc / bcs
        0b1101 => {
            let c = flag(builder, "ICC_C");
            not(builder, c)
        }
        0b0101 => flag(builder, "ICC_C"),
        // bpos / bneg
        0b1110 => {
            let n = flag(builder, "ICC_N");
            not(builder, n)
        }
        0b0110 => flag(builder, "ICC_N"),
        // bvc / bvs
        0b1111 => {
            let v = flag(builder, "ICC_V");
            not(builder, v)
        }
        0b0111 => flag(builder, "ICC_V"),
        _ => builder.const_int(Type::Int(1), 0),
    }
}

#[allow(clippy::too_many_lines)]
fn lift_word(word: Word, inst: &Instruction, builder: &mut SemanticsBuilder) {
    match word.op() {
        OP_CALL => {
            // The link register receives the call's own address.
            let own_pc = builder.const_int(Type::Int(32), inst.pc);
            write_gpr(builder, REG_O7, own_pc);
            let return_pc = builder.const_int(Type::Int(32), inst.pc + 8);
            builder.write_reg(RETURN_PC_VAR, return_pc);
            let target = builder.const_int(Type::Int(32), inst.branch_taken_pc);
            builder.write_pc_dynamic(target);
        }
        OP_BRANCH => match word.op2() {
            OP2_BICC => {
                let cond = branch_condition(builder, word.cond());
                builder.set_branch_taken(cond);
                let taken = builder.const_int(Type::Int(32), inst.branch_taken_pc);
                let not_taken = builder.const_int(Type::Int(32), inst.branch_not_taken_pc);
                let target = builder.select(cond, taken, not_taken);
                builder.write_pc_dynamic(target);
            }
            OP2_SETHI => {
                if !word.is_nop() {
                    let value =
                        builder.const_int(Type::Int(32), u64::from(word.imm22()) << 10);
                    write_gpr(builder, word.rd(), value);
                }
            }
            OP2_UNIMP => {}
            op2 => debug!("no semantics for sparc op2 {op2:#b} at 0x{:x}", inst.pc),
        },
        OP_ALU => lift_alu(word, inst, builder),
        OP_MEM => lift_mem(word, inst, builder),
        _ => {}
    }
}

fn lift_alu(word: Word, inst: &Instruction, builder: &mut SemanticsBuilder) {
    let op3 = word.op3();
    match op3 {
        OP3_JMPL => {
            let target = effective_address(builder, word);
            let own_pc = builder.const_int(Type::Int(32), inst.pc);
            write_gpr(builder, word.rd(), own_pc);
            if word.rd() == REG_O7 {
                let return_pc = builder.const_int(Type::Int(32), inst.pc + 8);
                builder.write_reg(RETURN_PC_VAR, return_pc);
            }
            builder.write_pc_dynamic(target);
        }
        OP3_RETT => {
            let target = effective_address(builder, word);
            builder.write_pc_dynamic(target);
        }
        OP3_TICC => {
            let cond = branch_condition(builder, word.cond());
            builder.set_branch_taken(cond);
        }
        OP3_SAVE | OP3_RESTORE => {
            let value = effective_address(builder, word);
            if op3 == OP3_SAVE {
                // New window: the caller's outs become the callee's ins.
                for index in 0..8 {
                    let out = read_gpr(builder, 8 + index);
                    write_gpr(builder, 24 + index, out);
                }
            } else {
                for index in 0..8 {
                    let input = read_gpr(builder, 24 + index);
                    write_gpr(builder, 8 + index, input);
                }
            }
            write_gpr(builder, word.rd(), value);
        }
        // Shifts use the low five bits of the count.
        0x25 | 0x26 | 0x27 => {
            let value = read_gpr(builder, word.rs1());
            let raw_count = operand2(builder, word);
            let mask = builder.const_int(Type::Int(32), 0x1f);
            let count = builder.binary(BinOp::And, raw_count, mask);
            let op = match op3 {
                0x25 => BinOp::Shl,
                0x26 => BinOp::LShr,
                _ => BinOp::AShr,
            };
            let result = builder.binary(op, value, count);
            write_gpr(builder, word.rd(), result);
        }
        _ => {
            let sets_cc = op3 & 0x10 != 0;
            let base_op = op3 & !0x10;
            let lhs = read_gpr(builder, word.rs1());
            let rhs = operand2(builder, word);
            let (bin_op, invert_rhs) = match base_op {
                0x00 => (BinOp::Add, false),
                0x01 => (BinOp::And, false),
                0x02 => (BinOp::Or, false),
                0x03 => (BinOp::Xor, false),
                0x04 => (BinOp::Sub, false),
                0x05 => (BinOp::And, true),
                0x06 => (BinOp::Or, true),
                0x07 => (BinOp::Xor, true),
                0x0a => (BinOp::Mul, false),
                0x0b => (BinOp::Mul, false),
                0x0e => (BinOp::UDiv, false),
                0x0f => (BinOp::SDiv, false),
                _ => {
                    debug!("no semantics for sparc op3 {op3:#x} at 0x{:x}", inst.pc);
                    return;
                }
            };
            let rhs = if invert_rhs {
                let ones = builder.const_int(Type::Int(32), 0xffff_ffff);
                builder.binary(BinOp::Xor, rhs, ones)
            } else {
                rhs
            };
            let result = builder.binary(bin_op, lhs, rhs);
            if sets_cc {
                match bin_op {
                    BinOp::Add => set_icc_add(builder, lhs, rhs, result),
                    BinOp::Sub => set_icc_sub(builder, lhs, rhs, result),
                    _ => set_icc_logic(builder, result),
                }
            }
            write_gpr(builder, word.rd(), result);
        }
    }
}

fn lift_mem(word: Word, inst: &Instruction, builder: &mut SemanticsBuilder) {
    let op3 = word.op3();
    let address = effective_address(builder, word);
    match op3 {
        // ld / ldub / lduh
        0x00 => {
            let value = builder.read_mem(address, Type::Int(32));
            write_gpr(builder, word.rd(), value);
        }
        0x01 | 0x02 => {
            let bits = if op3 == 0x01 { 8 } else { 16 };
            let narrow = builder.read_mem(address, Type::Int(bits));
            let value = builder.cast(CastOp::Zext, narrow, Type::Int(32));
            write_gpr(builder, word.rd(), value);
        }
        // ldsb / ldsh
        0x09 | 0x0a => {
            let bits = if op3 == 0x09 { 8 } else { 16 };
            let narrow = builder.read_mem(address, Type::Int(bits));
            let value = builder.cast(CastOp::Sext, narrow, Type::Int(32));
            write_gpr(builder, word.rd(), value);
        }
        // ldd
        0x03 => {
            let even = builder.read_mem(address, Type::Int(32));
            write_gpr(builder, word.rd() & !1, even);
            let four = builder.const_int(Type::Int(32), 4);
            let second = builder.binary(BinOp::Add, address, four);
            let odd = builder.read_mem(second, Type::Int(32));
            write_gpr(builder, (word.rd() & !1) + 1, odd);
        }
        // st / stb / sth
        0x04 => {
            let value = read_gpr(builder, word.rd());
            builder.write_mem(address, value);
        }
        0x05 | 0x06 => {
            let bits = if op3 == 0x05 { 8 } else { 16 };
            let value = read_gpr(builder, word.rd());
            let narrow = builder.cast(CastOp::Trunc, value, Type::Int(bits));
            builder.write_mem(address, narrow);
        }
        // std
        0x07 => {
            let even = read_gpr(builder, word.rd() & !1);
            builder.write_mem(address, even);
            let four = builder.const_int(Type::Int(32), 4);
            let second = builder.binary(BinOp::Add, address, four);
            let odd = read_gpr(builder, (word.rd() & !1) + 1);
            builder.write_mem(second, odd);
        }
        _ => debug!("no semantics for sparc memory op3 {op3:#x} at 0x{:x}", inst.pc),
    }
}

#[cfg(test)]
fn encode_word(raw: u32) -> [u8; 4] {
    raw.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: u32, addr: u64) -> Instruction {
        let arch = SparcArch::new();
        let mut inst = Instruction::default();
        assert!(arch.decode(addr, &encode_word(raw), &mut inst));
        inst
    }

    /// call disp30
    fn call_word(from: u64, to: u64) -> u32 {
        let disp = ((to.wrapping_sub(from)) as i64 / 4) as u32 & 0x3fff_ffff;
        (1 << 30) | disp
    }

    /// bicc: cond + annul + disp22
    fn bicc_word(cond: u32, annul: bool, disp_words: i32) -> u32 {
        (u32::from(annul) << 29)
            | (cond << 25)
            | (OP2_BICC << 22)
            | ((disp_words as u32) & 0x3f_ffff)
    }

    #[test]
    fn test_decode_call() {
        let inst = decode(call_word(0x4000, 0x4100), 0x4000);
        assert_eq!(inst.category, Category::DirectFunctionCall);
        assert_eq!(inst.branch_taken_pc, 0x4100);
        assert_eq!(inst.branch_not_taken_pc, 0x4008);
        assert_eq!(inst.delayed_pc, 0x4004);
    }

    #[test]
    fn test_decode_branch_always_and_never() {
        let inst = decode(bicc_word(COND_ALWAYS, false, 4), 0x1000);
        assert_eq!(inst.category, Category::DirectJump);
        assert_eq!(inst.branch_taken_pc, 0x1010);

        let inst = decode(bicc_word(COND_NEVER, false, 4), 0x1000);
        assert_eq!(inst.category, Category::NoOp);
    }

    #[test]
    fn test_decode_conditional_branch_backward() {
        // bne -2 words
        let inst = decode(bicc_word(0b1001, false, -2), 0x1008);
        assert_eq!(inst.category, Category::ConditionalBranch);
        assert_eq!(inst.branch_taken_pc, 0x1000);
        assert_eq!(inst.branch_not_taken_pc, 0x1010);
    }

    #[test]
    fn test_decode_ret_and_retl() {
        // ret: jmpl %i7+8, %g0 -> op=2 rd=0 op3=0x38 rs1=31 i=1 simm=8
        let ret = (2u32 << 30) | (OP3_JMPL << 19) | (31 << 14) | (1 << 13) | 8;
        let inst = decode(ret, 0x2000);
        assert_eq!(inst.category, Category::FunctionReturn);

        let retl = (2u32 << 30) | (OP3_JMPL << 19) | (15 << 14) | (1 << 13) | 8;
        let inst = decode(retl, 0x2000);
        assert_eq!(inst.category, Category::FunctionReturn);
    }

    #[test]
    fn test_decode_jmpl_link_is_indirect_call() {
        // jmpl %g1, %o7
        let word = (2u32 << 30) | (REG_O7 << 25) | (OP3_JMPL << 19) | (1 << 14) | (1 << 13);
        let inst = decode(word, 0x2000);
        assert_eq!(inst.category, Category::IndirectFunctionCall);
        assert_eq!(inst.branch_not_taken_pc, 0x2008);
    }

    #[test]
    fn test_decode_unimp_is_error() {
        let inst = decode(32, 0x3000); // unimp 32
        assert_eq!(inst.category, Category::Error);
    }

    #[test]
    fn test_decode_rejects_short_buffers() {
        let arch = SparcArch::new();
        let mut inst = Instruction::default();
        assert!(!arch.decode(0x1000, &[0x01, 0x02], &mut inst));
    }

    #[test]
    fn test_annulment_rules() {
        let arch = SparcArch::new();
        let mut delayed = Instruction::default();
        // nop in the slot
        assert!(arch.decode_delayed(0x1004, &encode_word(0x0100_0000), &mut delayed));

        // Plain conditional branch: slot executes on both paths.
        let mut branch = Instruction::default();
        arch.decode(0x1000, &encode_word(bicc_word(0b1001, false, 4)), &mut branch);
        assert!(arch.next_instruction_is_delayed(&branch, &delayed, true));
        assert!(arch.next_instruction_is_delayed(&branch, &delayed, false));

        // Annulled conditional branch: taken path only.
        arch.decode(0x1000, &encode_word(bicc_word(0b1001, true, 4)), &mut branch);
        assert!(arch.next_instruction_is_delayed(&branch, &delayed, true));
        assert!(!arch.next_instruction_is_delayed(&branch, &delayed, false));

        // Annulled branch-always: the slot never executes.
        arch.decode(0x1000, &encode_word(bicc_word(COND_ALWAYS, true, 4)), &mut branch);
        assert!(!arch.next_instruction_is_delayed(&branch, &delayed, true));

        // Calls execute the slot on their (only) path.
        arch.decode(0x1000, &encode_word(call_word(0x1000, 0x2000)), &mut branch);
        assert!(arch.next_instruction_is_delayed(&branch, &delayed, true));
    }

    #[test]
    fn test_register_aliases() {
        let arch = SparcArch::new();
        assert_eq!(arch.register_by_name("SP").unwrap().name, "O6");
        assert_eq!(arch.register_by_name("FP").unwrap().name, "I6");
        assert_eq!(arch.register_by_name("g0").unwrap().name, "G0");
    }
}
