//! Compact binary module writer.
//!
//! This is the `--bc_out` format: a write-only, tagged, little-endian
//! serialization intended for downstream consumers that do not want to
//! re-parse the textual form. A reader is deliberately out of scope.
//!
//! Layout: magic, format version, global table, function table. Types are
//! encoded as their name-safe mangled strings; strings are length-prefixed
//! UTF-8.

use std::io::Write;

use crate::{
    ir::{
        Const, Function, GlobalInit, InlineHint, Linkage, Module, Op, Terminator, Type, ValueDef,
    },
    Result,
};

/// Magic bytes at the start of a binary module.
pub const MAGIC: &[u8; 4] = b"LSIR";

/// Current format version.
pub const VERSION: u16 = 1;

struct Emitter<'a, W: Write> {
    out: &'a mut W,
}

impl<W: Write> Emitter<'_, W> {
    fn u8(&mut self, value: u8) -> Result<()> {
        self.out.write_all(&[value])?;
        Ok(())
    }

    fn u16(&mut self, value: u16) -> Result<()> {
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn u32(&mut self, value: u32) -> Result<()> {
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn u64(&mut self, value: u64) -> Result<()> {
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn str(&mut self, value: &str) -> Result<()> {
        self.u32(value.len() as u32)?;
        self.out.write_all(value.as_bytes())?;
        Ok(())
    }

    fn ty(&mut self, ty: &Type) -> Result<()> {
        self.str(&ty.mangled())
    }

    fn linkage(&mut self, linkage: Linkage) -> Result<()> {
        self.u8(match linkage {
            Linkage::External => 0,
            Linkage::Internal => 1,
        })
    }

    fn value_def(&mut self, def: &ValueDef) -> Result<()> {
        match def {
            ValueDef::Arg { index, ty } => {
                self.u8(0)?;
                self.u32(*index)?;
                self.ty(ty)
            }
            ValueDef::Const(Const::Int { ty, value }) => {
                self.u8(1)?;
                self.ty(ty)?;
                self.u64(*value)
            }
            ValueDef::Const(Const::NullPtr) => self.u8(2),
            ValueDef::Const(Const::Undef(ty)) => {
                self.u8(3)?;
                self.ty(ty)
            }
            ValueDef::Const(Const::Zero(ty)) => {
                self.u8(7)?;
                self.ty(ty)
            }
            ValueDef::Const(Const::GlobalAddr(name)) => {
                self.u8(4)?;
                self.str(name)
            }
            ValueDef::Const(Const::SymbolOffset { symbol, offset, ty }) => {
                self.u8(5)?;
                self.str(symbol)?;
                self.u64(*offset)?;
                self.ty(ty)
            }
            ValueDef::Inst { ty } => {
                self.u8(6)?;
                self.ty(ty)
            }
        }
    }

    fn op(&mut self, op: &Op) -> Result<()> {
        match op {
            Op::Alloca { ty } => {
                self.u8(0)?;
                self.ty(ty)
            }
            Op::Load { ptr, ty } => {
                self.u8(1)?;
                self.u32(ptr.0)?;
                self.ty(ty)
            }
            Op::Store { ptr, value } => {
                self.u8(2)?;
                self.u32(ptr.0)?;
                self.u32(value.0)
            }
            Op::FieldPtr {
                base,
                base_ty,
                index,
            } => {
                self.u8(3)?;
                self.u32(base.0)?;
                self.ty(base_ty)?;
                self.u32(*index)
            }
            Op::Binary { op, lhs, rhs } => {
                self.u8(4)?;
                self.u8(*op as u8)?;
                self.u32(lhs.0)?;
                self.u32(rhs.0)
            }
            Op::Icmp { pred, lhs, rhs } => {
                self.u8(5)?;
                self.u8(*pred as u8)?;
                self.u32(lhs.0)?;
                self.u32(rhs.0)
            }
            Op::Cast { op, value, ty } => {
                self.u8(6)?;
                self.u8(*op as u8)?;
                self.u32(value.0)?;
                self.ty(ty)
            }
            Op::Call {
                callee,
                args,
                ret_ty,
            } => {
                self.u8(7)?;
                self.str(callee)?;
                self.u32(args.len() as u32)?;
                for arg in args {
                    self.u32(arg.0)?;
                }
                self.ty(ret_ty)
            }
            Op::InsertValue { agg, elem, index } => {
                self.u8(8)?;
                self.u32(agg.0)?;
                self.u32(elem.0)?;
                self.u32(*index)
            }
            Op::ExtractValue { agg, index } => {
                self.u8(11)?;
                self.u32(agg.0)?;
                self.u32(*index)
            }
            Op::Select {
                cond,
                if_true,
                if_false,
            } => {
                self.u8(9)?;
                self.u32(cond.0)?;
                self.u32(if_true.0)?;
                self.u32(if_false.0)
            }
            Op::Phi { ty, incomings } => {
                self.u8(10)?;
                self.ty(ty)?;
                self.u32(incomings.len() as u32)?;
                for (block, value) in incomings {
                    self.u32(block.0)?;
                    self.u32(value.0)?;
                }
                Ok(())
            }
        }
    }

    fn terminator(&mut self, term: &Terminator) -> Result<()> {
        match term {
            Terminator::None => self.u8(0),
            Terminator::Br { target } => {
                self.u8(1)?;
                self.u32(target.0)
            }
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                self.u8(2)?;
                self.u32(cond.0)?;
                self.u32(then_dest.0)?;
                self.u32(else_dest.0)
            }
            Terminator::Ret { value } => {
                self.u8(3)?;
                match value {
                    Some(value) => {
                        self.u8(1)?;
                        self.u32(value.0)
                    }
                    None => self.u8(0),
                }
            }
            Terminator::TailCall { callee, args } => {
                self.u8(4)?;
                self.str(callee)?;
                self.u32(args.len() as u32)?;
                for arg in args {
                    self.u32(arg.0)?;
                }
                Ok(())
            }
        }
    }

    fn function(&mut self, func: &Function) -> Result<()> {
        self.str(&func.name)?;
        self.u32(func.sig.params.len() as u32)?;
        for param in &func.sig.params {
            self.ty(param)?;
        }
        self.ty(&func.sig.ret)?;
        self.u8(u8::from(func.sig.variadic))?;
        self.linkage(func.linkage)?;
        self.u8(match func.inline {
            InlineHint::Default => 0,
            InlineHint::AlwaysInline => 1,
            InlineHint::NoInline => 2,
        })?;
        self.u8(u8::from(func.read_none))?;
        self.u8(u8::from(func.no_return))?;
        self.u32(func.calling_convention)?;
        self.u8(u8::from(!func.is_declaration()))?;

        if func.is_declaration() {
            return Ok(());
        }

        self.u32(func.values.len() as u32)?;
        for def in &func.values {
            self.value_def(def)?;
        }

        self.u32(func.insts.len() as u32)?;
        for inst in &func.insts {
            match inst.dest {
                Some(dest) => {
                    self.u8(1)?;
                    self.u32(dest.0)?;
                }
                None => self.u8(0)?,
            }
            self.op(&inst.op)?;
        }

        self.u32(func.blocks.len() as u32)?;
        for block in &func.blocks {
            self.u32(block.insts.len() as u32)?;
            for inst_id in &block.insts {
                self.u32(inst_id.0)?;
            }
            self.terminator(&block.term)?;
        }
        Ok(())
    }
}

/// Writes `module` to `out` in the binary format.
///
/// # Errors
/// Returns [`crate::Error::FileError`] if the underlying writer fails.
pub fn write_module<W: Write>(module: &Module, out: &mut W) -> Result<()> {
    let mut emitter = Emitter { out };
    emitter.out.write_all(MAGIC)?;
    emitter.u16(VERSION)?;
    emitter.str(&module.name)?;

    emitter.u32(module.globals().len() as u32)?;
    for global in module.globals() {
        emitter.str(&global.name)?;
        emitter.ty(&global.ty)?;
        emitter.linkage(global.linkage)?;
        emitter.u8(match global.init {
            GlobalInit::External => 0,
            GlobalInit::Zero => 1,
        })?;
    }

    emitter.u32(module.functions().len() as u32)?;
    for func in module.functions() {
        emitter.function(func)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FnSig;

    #[test]
    fn test_write_empty_module() {
        let module = Module::new("m");
        let mut buffer = Vec::new();
        write_module(&module, &mut buffer).unwrap();
        assert_eq!(&buffer[..4], MAGIC);
        assert_eq!(u16::from_le_bytes([buffer[4], buffer[5]]), VERSION);
    }

    #[test]
    fn test_write_declaration_round_sizes() {
        let mut module = Module::new("m");
        module
            .add_function(Function::declare(
                "f",
                FnSig::new(vec![Type::Ptr], Type::Void),
                Linkage::External,
            ))
            .unwrap();
        let mut buffer = Vec::new();
        write_module(&module, &mut buffer).unwrap();
        // Declarations must not serialize arenas.
        let text = String::from_utf8_lossy(&buffer);
        assert!(text.contains('f'));
        assert!(!buffer.is_empty());
    }
}
