//! Textual IR writer.
//!
//! The format is line-oriented and stable across runs: one global or
//! function per top-level item, blocks labeled by their decoration name
//! when present and by index otherwise. This is the `--ir_out` format and
//! the representation the determinism tests compare.

use std::fmt::{self, Write as _};

use crate::ir::{
    Const, Function, Global, GlobalInit, InlineHint, Linkage, Module, Op, Terminator, ValueDef,
    ValueId,
};

fn fmt_value(func: &Function, value: ValueId, out: &mut String) {
    match &func.values[value.0 as usize] {
        ValueDef::Arg { .. } | ValueDef::Inst { .. } => {
            if let Some(name) = func.value_names.get(&value) {
                let _ = write!(out, "%{name}");
            } else {
                let _ = write!(out, "%{}", value.0);
            }
        }
        ValueDef::Const(c) => match c {
            Const::Int { value, .. } => {
                let _ = write!(out, "{value}");
            }
            Const::NullPtr => out.push_str("null"),
            Const::Zero(_) => out.push_str("zeroinitializer"),
            Const::Undef(_) => out.push_str("undef"),
            Const::GlobalAddr(name) => {
                let _ = write!(out, "@{name}");
            }
            Const::SymbolOffset { symbol, offset, .. } => {
                let _ = write!(out, "(@{symbol} + 0x{offset:x})");
            }
        },
    }
}

fn fmt_operand(func: &Function, value: ValueId, out: &mut String) {
    let ty = func.value_type(value);
    let _ = write!(out, "{ty} ");
    fmt_value(func, value, out);
}

fn block_label(func: &Function, block: u32) -> String {
    func.blocks[block as usize]
        .name
        .clone()
        .unwrap_or_else(|| format!("b{block}"))
}

fn fmt_inst(func: &Function, inst_index: u32, out: &mut String) {
    let inst = &func.insts[inst_index as usize];
    out.push_str("  ");
    if let Some(dest) = inst.dest {
        fmt_value(func, dest, out);
        out.push_str(" = ");
    }
    match &inst.op {
        Op::Alloca { ty } => {
            let _ = write!(out, "alloca {ty}");
        }
        Op::Load { ptr, ty } => {
            let _ = write!(out, "load {ty}, ");
            fmt_operand(func, *ptr, out);
        }
        Op::Store { ptr, value } => {
            out.push_str("store ");
            fmt_operand(func, *value, out);
            out.push_str(", ");
            fmt_operand(func, *ptr, out);
        }
        Op::FieldPtr {
            base,
            base_ty,
            index,
        } => {
            let _ = write!(out, "fieldptr {base_ty}, ");
            fmt_operand(func, *base, out);
            let _ = write!(out, ", {index}");
        }
        Op::Binary { op, lhs, rhs } => {
            let _ = write!(out, "{} {} ", op.mnemonic(), func.value_type(*lhs));
            fmt_value(func, *lhs, out);
            out.push_str(", ");
            fmt_value(func, *rhs, out);
        }
        Op::Icmp { pred, lhs, rhs } => {
            let _ = write!(out, "icmp {} {} ", pred.mnemonic(), func.value_type(*lhs));
            fmt_value(func, *lhs, out);
            out.push_str(", ");
            fmt_value(func, *rhs, out);
        }
        Op::Cast { op, value, ty } => {
            let _ = write!(out, "{} ", op.mnemonic());
            fmt_operand(func, *value, out);
            let _ = write!(out, " to {ty}");
        }
        Op::Call {
            callee,
            args,
            ret_ty,
        } => {
            let _ = write!(out, "call {ret_ty} @{callee}(");
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_operand(func, *arg, out);
            }
            out.push(')');
        }
        Op::InsertValue { agg, elem, index } => {
            out.push_str("insertvalue ");
            fmt_operand(func, *agg, out);
            out.push_str(", ");
            fmt_operand(func, *elem, out);
            let _ = write!(out, ", {index}");
        }
        Op::ExtractValue { agg, index } => {
            out.push_str("extractvalue ");
            fmt_operand(func, *agg, out);
            let _ = write!(out, ", {index}");
        }
        Op::Select {
            cond,
            if_true,
            if_false,
        } => {
            out.push_str("select ");
            fmt_operand(func, *cond, out);
            out.push_str(", ");
            fmt_operand(func, *if_true, out);
            out.push_str(", ");
            fmt_operand(func, *if_false, out);
        }
        Op::Phi { ty, incomings } => {
            let _ = write!(out, "phi {ty} ");
            for (i, (block, value)) in incomings.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str("[ ");
                fmt_value(func, *value, out);
                let _ = write!(out, ", %{} ]", block_label(func, block.0));
            }
        }
    }
    out.push('\n');
}

fn fmt_terminator(func: &Function, term: &Terminator, out: &mut String) {
    out.push_str("  ");
    match term {
        Terminator::None => out.push_str("<no terminator>"),
        Terminator::Br { target } => {
            let _ = write!(out, "br label %{}", block_label(func, target.0));
        }
        Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
        } => {
            out.push_str("condbr ");
            fmt_operand(func, *cond, out);
            let _ = write!(
                out,
                ", label %{}, label %{}",
                block_label(func, then_dest.0),
                block_label(func, else_dest.0)
            );
        }
        Terminator::Ret { value } => match value {
            Some(value) => {
                out.push_str("ret ");
                fmt_operand(func, *value, out);
            }
            None => out.push_str("ret void"),
        },
        Terminator::TailCall { callee, args } => {
            let _ = write!(out, "tailcall @{callee}(");
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_operand(func, *arg, out);
            }
            out.push(')');
        }
    }
    out.push('\n');
}

fn fmt_function_attrs(func: &Function, out: &mut String) {
    if func.linkage == Linkage::Internal {
        out.push_str(" internal");
    }
    match func.inline {
        InlineHint::Default => {}
        InlineHint::AlwaysInline => out.push_str(" alwaysinline"),
        InlineHint::NoInline => out.push_str(" noinline"),
    }
    if func.read_none {
        out.push_str(" readnone");
    }
    if func.no_return {
        out.push_str(" noreturn");
    }
    if func.calling_convention != 0 {
        let _ = write!(out, " cc{}", func.calling_convention);
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        if self.is_declaration() {
            let _ = write!(out, "declare {} @{}(", self.sig.ret, self.name);
            for (i, param) in self.sig.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{param}");
            }
            if self.sig.variadic {
                if !self.sig.params.is_empty() {
                    out.push_str(", ");
                }
                out.push_str("...");
            }
            out.push(')');
            fmt_function_attrs(self, &mut out);
            out.push('\n');
            return f.write_str(&out);
        }

        let _ = write!(out, "define {} @{}(", self.sig.ret, self.name);
        for (i, &arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{} ", self.sig.params[i]);
            fmt_value(self, arg, &mut out);
        }
        out.push(')');
        fmt_function_attrs(self, &mut out);
        out.push_str(" {\n");

        for (index, block) in self.blocks.iter().enumerate() {
            let _ = writeln!(out, "{}:", block_label(self, index as u32));
            for &inst_id in &block.insts {
                fmt_inst(self, inst_id.0, &mut out);
            }
            fmt_terminator(self, &block.term, &mut out);
        }
        out.push_str("}\n");
        f.write_str(&out)
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.linkage, self.init) {
            (_, GlobalInit::External) => write!(f, "@{} = external global {}", self.name, self.ty),
            (Linkage::Internal, GlobalInit::Zero) => {
                write!(f, "@{} = internal global {} zeroinitializer", self.name, self.ty)
            }
            (Linkage::External, GlobalInit::Zero) => {
                write!(f, "@{} = global {} zeroinitializer", self.name, self.ty)
            }
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if !self.globals().is_empty() {
            writeln!(f)?;
            for global in self.globals() {
                writeln!(f, "{global}")?;
            }
        }
        for func in self.functions() {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FnSig, Type};

    #[test]
    fn test_display_declaration() {
        let func = Function::declare(
            "__anvill_error",
            FnSig::new(vec![Type::Ptr, Type::Int(64), Type::Ptr], Type::Ptr),
            Linkage::External,
        );
        assert_eq!(
            func.to_string(),
            "declare ptr @__anvill_error(ptr, i64, ptr)\n"
        );
    }

    #[test]
    fn test_display_simple_body() {
        let mut func = Function::declare(
            "f",
            FnSig::new(vec![Type::Int(64)], Type::Int(64)),
            Linkage::External,
        );
        let entry = func.add_block(Some("entry".to_string()));
        let one = func.const_int(Type::Int(64), 1);
        let arg = func.arg(0);
        let sum = func
            .push(
                entry,
                Op::Binary {
                    op: BinOp::Add,
                    lhs: arg,
                    rhs: one,
                },
            )
            .unwrap();
        func.set_terminator(entry, Terminator::Ret { value: Some(sum) });

        let text = func.to_string();
        assert!(text.contains("define i64 @f(i64 %0)"));
        assert!(text.contains("entry:"));
        assert!(text.contains("add i64 %0, 1"));
        assert!(text.contains("ret i64"));
    }

    #[test]
    fn test_display_global() {
        let global = Global {
            name: "__anvill_pc".to_string(),
            ty: Type::Int(8),
            linkage: Linkage::External,
            init: GlobalInit::External,
        };
        assert_eq!(global.to_string(), "@__anvill_pc = external global i8");
    }
}
