//! Human-readable disassembly of in-progress units
//!
//! Used by the load/execute harness to dump an offending unit when a
//! define or invoke step fails.

use std::fmt::Write;

use super::code::{Const, Insn};
use super::opcodes::mnemonic;
use crate::program::Unit;

pub fn disassemble_unit(unit: &Unit) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "class {} extends {} (0x{:04x})", unit.name, unit.super_name, unit.access);
    for field in &unit.fields {
        let _ = writeln!(out, "  field {} {} (0x{:04x})", field.descriptor, field.name, field.access);
    }
    for method in &unit.methods {
        let _ = writeln!(
            out,
            "  method {}{} (0x{:04x}) max_locals={}",
            method.name, method.descriptor, method.access, method.max_locals
        );
        for insn in &method.code {
            let _ = writeln!(out, "    {}", render(insn));
        }
    }
    out
}

fn render(insn: &Insn) -> String {
    match insn {
        Insn::Label(label) => format!("L{}:", label),
        Insn::Simple(opcode) => mnemonic(*opcode).to_string(),
        Insn::Push(constant) => match constant {
            Const::Int(v) => format!("push {}", v),
            Const::Long(v) => format!("push {}l", v),
            Const::Float(v) => format!("push {}f", v),
            Const::Double(v) => format!("push {}d", v),
            Const::Str(v) => format!("push {:?}", v),
            Const::Null => "aconst_null".to_string(),
        },
        Insn::Var { op, index } => format!("{} {}", mnemonic(*op), index),
        Insn::Iinc { index, delta } => format!("iinc {} {}", index, delta),
        Insn::Jump { op, target } => format!("{} L{}", mnemonic(*op), target),
        Insn::Field { op, owner, name, desc } => {
            format!("{} {}.{}:{}", mnemonic(*op), owner, name, desc)
        }
        Insn::Method { op, owner, name, desc, .. } => {
            format!("{} {}.{}{}", mnemonic(*op), owner, name, desc)
        }
        Insn::Type { op, name } => format!("{} {}", mnemonic(*op), name),
        Insn::NewArray { atype } => format!("newarray {}", atype),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::opcodes as op;
    use crate::program::{access, MethodDef};

    #[test]
    fn dump_contains_class_and_instructions() {
        let mut unit = Unit::new("demo/Main", access::ACC_PUBLIC);
        let mut method = MethodDef::new(access::ACC_PUBLIC, "f", "()I");
        method.code = vec![Insn::Push(Const::Int(7)), Insn::Simple(op::IRETURN)];
        unit.methods.push(method);

        let dump = disassemble_unit(&unit);
        assert!(dump.contains("class demo/Main"));
        assert!(dump.contains("method f()I"));
        assert!(dump.contains("push 7"));
        assert!(dump.contains("ireturn"));
    }
}
