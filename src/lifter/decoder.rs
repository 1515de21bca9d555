//! Availability- and permission-gated instruction decoding.
//!
//! The decoder reads up to the architecture's maximum instruction length,
//! but a byte joins the buffer only while it is both available and
//! permitted for execution; the first byte that fails either test ends the
//! read. The architecture then decodes from whatever prefix was gathered,
//! so truncation at a mapping boundary surfaces as a decode failure rather
//! than a read past the mapping.

use crate::{
    arch::{Arch, Instruction},
    provider::{has_byte, is_executable, MemoryProvider},
};

/// Decodes instructions against a memory provider.
pub struct InstructionDecoder<'a> {
    arch: &'a dyn Arch,
    memory: &'a dyn MemoryProvider,
}

impl<'a> InstructionDecoder<'a> {
    /// Creates a decoder for `arch` over `memory`.
    pub fn new(arch: &'a dyn Arch, memory: &'a dyn MemoryProvider) -> Self {
        Self { arch, memory }
    }

    /// Decodes the instruction at `addr` into `out`.
    ///
    /// `is_delayed` selects the architecture's delay-slot decode path.
    /// Returns `false` when no instruction could be decoded.
    pub fn decode_into(&self, addr: u64, is_delayed: bool, out: &mut Instruction) -> bool {
        let max_size = self.arch.max_instruction_size();
        let mut bytes = Vec::with_capacity(max_size);

        for index in 0..max_size {
            let (byte, availability, permission) = self.memory.query(addr + index as u64);
            if !has_byte(availability) || !is_executable(permission) {
                break;
            }
            bytes.push(byte);
        }

        if is_delayed {
            self.arch.decode_delayed(addr, &bytes, out)
        } else {
            self.arch.decode(addr, &bytes, out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arch,
        provider::{ByteAvailability, BytePermission, ByteQuery},
    };

    /// A provider backed by one executable slice plus one data-only byte.
    struct SplitMemory {
        base: u64,
        code: Vec<u8>,
    }

    impl MemoryProvider for SplitMemory {
        fn query(&self, addr: u64) -> ByteQuery {
            let offset = addr.wrapping_sub(self.base);
            if let Some(&byte) = self.code.get(offset as usize) {
                (
                    byte,
                    ByteAvailability::Available,
                    BytePermission::ReadableExecutable,
                )
            } else if offset as usize == self.code.len() {
                // One trailing readable-but-not-executable byte.
                (
                    0x90,
                    ByteAvailability::Available,
                    BytePermission::Readable,
                )
            } else {
                (0, ByteAvailability::Unknown, BytePermission::Unknown)
            }
        }
    }

    #[test]
    fn test_decode_stops_at_non_executable_byte() {
        let arch = arch::build("amd64").unwrap();
        // call rel32 needs five bytes; only two are executable.
        let memory = SplitMemory {
            base: 0x1000,
            code: vec![0xe8, 0x00],
        };
        let decoder = InstructionDecoder::new(arch.as_ref(), &memory);
        let mut inst = Instruction::default();
        assert!(!decoder.decode_into(0x1000, false, &mut inst));
    }

    #[test]
    fn test_decode_within_executable_range() {
        let arch = arch::build("amd64").unwrap();
        let memory = SplitMemory {
            base: 0x1000,
            code: vec![0x90, 0xc3],
        };
        let decoder = InstructionDecoder::new(arch.as_ref(), &memory);
        let mut inst = Instruction::default();
        assert!(decoder.decode_into(0x1000, false, &mut inst));
        assert_eq!(inst.next_pc, 0x1001);
        assert!(decoder.decode_into(0x1001, false, &mut inst));
    }

    #[test]
    fn test_delayed_decode_rejected_off_delay_arches() {
        let arch = arch::build("amd64").unwrap();
        let memory = SplitMemory {
            base: 0x1000,
            code: vec![0x90],
        };
        let decoder = InstructionDecoder::new(arch.as_ref(), &memory);
        let mut inst = Instruction::default();
        assert!(!decoder.decode_into(0x1000, true, &mut inst));
    }
}
