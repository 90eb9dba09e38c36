//! Symbolic instruction sequences and their assembly into Code bytes
//!
//! The compiler emits [`Insn`] values with symbolic labels and owner/name/
//! descriptor references; assembly interns constants, resolves labels to
//! byte offsets and computes the max-stack bound by linear simulation.

use std::collections::HashMap;

use super::constpool::ConstantPool;
use super::opcodes as op;
use crate::compiler::types::parse_method_descriptor;
use crate::error::{Error, Result};

/// Branch-target marker, resolved at assembly time
pub type Label = usize;

/// Loadable constant operand
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Null,
}

impl Const {
    fn width(&self) -> i32 {
        match self {
            Const::Long(_) | Const::Double(_) => 2,
            _ => 1,
        }
    }
}

/// One symbolic instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Label(Label),
    Simple(u8),
    Push(Const),
    Var { op: u8, index: u16 },
    Iinc { index: u16, delta: i16 },
    Jump { op: u8, target: Label },
    Field { op: u8, owner: String, name: String, desc: String },
    Method { op: u8, owner: String, name: String, desc: String, itf: bool },
    Type { op: u8, name: String },
    NewArray { atype: u8 },
}

/// Width in stack slots of a field descriptor
fn field_width(desc: &str) -> i32 {
    match desc.as_bytes().first() {
        Some(b'J') | Some(b'D') => 2,
        Some(b'V') => 0,
        _ => 1,
    }
}

/// Stack slots consumed by the arguments of a method descriptor
fn argument_width(desc: &str) -> i32 {
    match parse_method_descriptor(desc) {
        Some((params, _)) => params.iter().map(|p| p.size() as i32).sum(),
        None => 0,
    }
}

fn return_width(desc: &str) -> i32 {
    match desc.rfind(')') {
        Some(close) => field_width(&desc[close + 1..]),
        None => 0,
    }
}

fn simple_delta(opcode: u8) -> i32 {
    match opcode {
        op::NOP | op::SWAP | op::ARRAYLENGTH => 0,
        op::POP => -1,
        op::POP2 => -2,
        op::DUP | op::DUP_X1 | op::DUP_X2 => 1,
        op::DUP2 | op::DUP2_X1 | op::DUP2_X2 => 2,
        op::IADD | op::FADD | op::ISUB | op::FSUB | op::IMUL | op::FMUL | op::IDIV
        | op::FDIV | op::IXOR => -1,
        op::LADD | op::DADD | op::LSUB | op::DSUB | op::LMUL | op::DMUL | op::LDIV
        | op::DDIV => -2,
        op::INEG | op::LNEG | op::FNEG | op::DNEG => 0,
        op::I2L | op::I2D | op::F2L | op::F2D => 1,
        op::L2I | op::L2F | op::D2I | op::D2F => -1,
        op::I2F | op::L2D | op::F2I | op::D2L => 0,
        op::LCMP | op::DCMPL | op::DCMPG => -3,
        op::FCMPL | op::FCMPG => -1,
        op::IALOAD | op::FALOAD | op::AALOAD | op::BALOAD | op::CALOAD | op::SALOAD => -1,
        op::LALOAD | op::DALOAD => 0,
        op::IASTORE | op::FASTORE | op::AASTORE | op::BASTORE | op::CASTORE | op::SASTORE => -3,
        op::LASTORE | op::DASTORE => -4,
        op::IRETURN | op::FRETURN | op::ARETURN => -1,
        op::LRETURN | op::DRETURN => -2,
        op::RETURN => 0,
        op::ATHROW => -1,
        op::ACONST_NULL | op::ICONST_M1..=op::DCONST_1 => {
            // bare constant opcodes are normally emitted through Push
            match opcode {
                op::LCONST_0 | op::LCONST_1 | op::DCONST_0 | op::DCONST_1 => 2,
                _ => 1,
            }
        }
        _ => 0,
    }
}

fn insn_delta(insn: &Insn) -> i32 {
    match insn {
        Insn::Label(_) | Insn::Iinc { .. } => 0,
        Insn::Simple(opcode) => simple_delta(*opcode),
        Insn::Push(c) => c.width(),
        Insn::Var { op: opcode, .. } => match *opcode {
            op::ILOAD | op::FLOAD | op::ALOAD => 1,
            op::LLOAD | op::DLOAD => 2,
            op::ISTORE | op::FSTORE | op::ASTORE => -1,
            op::LSTORE | op::DSTORE => -2,
            _ => 0,
        },
        Insn::Jump { op: opcode, .. } => match *opcode {
            op::GOTO => 0,
            op::IF_ICMPEQ..=op::IF_ACMPNE => -2,
            _ => -1,
        },
        Insn::Field { op: opcode, desc, .. } => {
            let w = field_width(desc);
            match *opcode {
                op::GETSTATIC => w,
                op::PUTSTATIC => -w,
                op::GETFIELD => w - 1,
                op::PUTFIELD => -w - 1,
                _ => 0,
            }
        }
        Insn::Method { op: opcode, desc, .. } => {
            let receiver = if *opcode == op::INVOKESTATIC { 0 } else { 1 };
            return_width(desc) - argument_width(desc) - receiver
        }
        Insn::Type { op: opcode, .. } => {
            if *opcode == op::NEW {
                1
            } else {
                0
            }
        }
        Insn::NewArray { .. } => 0,
    }
}

fn ends_flow(insn: &Insn) -> bool {
    match insn {
        Insn::Simple(opcode) => matches!(
            *opcode,
            op::IRETURN | op::LRETURN | op::FRETURN | op::DRETURN | op::ARETURN | op::RETURN
                | op::ATHROW
        ),
        Insn::Jump { op: opcode, .. } => *opcode == op::GOTO,
        _ => false,
    }
}

/// Assembled method body
pub struct AssembledCode {
    pub bytes: Vec<u8>,
    pub max_stack: u16,
    /// Byte offset of every label that appeared in the sequence
    pub label_offsets: HashMap<Label, u16>,
}

/// Assemble a symbolic instruction sequence, interning referenced
/// constants into `pool`.
pub fn assemble(code: &[Insn], pool: &mut ConstantPool) -> Result<AssembledCode> {
    let mut bytes: Vec<u8> = Vec::new();
    let mut label_offsets: HashMap<Label, u16> = HashMap::new();
    // (patch position, branch opcode address, target)
    let mut patches: Vec<(usize, usize, Label)> = Vec::new();

    for insn in code {
        let addr = bytes.len();
        match insn {
            Insn::Label(label) => {
                label_offsets.insert(*label, addr as u16);
            }
            Insn::Simple(opcode) => bytes.push(*opcode),
            Insn::Push(constant) => emit_push(&mut bytes, pool, constant),
            Insn::Var { op: opcode, index } => {
                if *index <= u8::MAX as u16 {
                    bytes.push(*opcode);
                    bytes.push(*index as u8);
                } else {
                    bytes.push(0xc4); // wide
                    bytes.push(*opcode);
                    bytes.extend_from_slice(&index.to_be_bytes());
                }
            }
            Insn::Iinc { index, delta } => {
                if *index <= u8::MAX as u16 && *delta >= i8::MIN as i16 && *delta <= i8::MAX as i16
                {
                    bytes.push(op::IINC);
                    bytes.push(*index as u8);
                    bytes.push(*delta as u8);
                } else {
                    bytes.push(0xc4); // wide
                    bytes.push(op::IINC);
                    bytes.extend_from_slice(&index.to_be_bytes());
                    bytes.extend_from_slice(&delta.to_be_bytes());
                }
            }
            Insn::Jump { op: opcode, target } => {
                bytes.push(*opcode);
                patches.push((bytes.len(), addr, *target));
                bytes.extend_from_slice(&[0, 0]);
            }
            Insn::Field { op: opcode, owner, name, desc } => {
                let index = pool.add_field_ref(owner, name, desc);
                bytes.push(*opcode);
                bytes.extend_from_slice(&index.to_be_bytes());
            }
            Insn::Method { op: opcode, owner, name, desc, itf } => {
                let index = if *itf {
                    pool.add_interface_method_ref(owner, name, desc)
                } else {
                    pool.add_method_ref(owner, name, desc)
                };
                bytes.push(*opcode);
                bytes.extend_from_slice(&index.to_be_bytes());
                if *opcode == op::INVOKEINTERFACE {
                    bytes.push((1 + argument_width(desc)) as u8);
                    bytes.push(0);
                }
            }
            Insn::Type { op: opcode, name } => {
                let index = pool.add_class(name);
                bytes.push(*opcode);
                bytes.extend_from_slice(&index.to_be_bytes());
            }
            Insn::NewArray { atype } => {
                bytes.push(op::NEWARRAY);
                bytes.push(*atype);
            }
        }
    }

    for (pos, insn_addr, target) in patches {
        let target_offset = *label_offsets.get(&target).ok_or_else(|| {
            Error::codegen_error(format!("unresolved branch target label {}", target))
        })? as i64;
        let rel = target_offset - insn_addr as i64;
        if rel < i16::MIN as i64 || rel > i16::MAX as i64 {
            return Err(Error::codegen_error("branch offset exceeds 16 bits"));
        }
        bytes[pos..pos + 2].copy_from_slice(&(rel as i16).to_be_bytes());
    }

    let max_stack = compute_max_stack(code);

    Ok(AssembledCode {
        bytes,
        max_stack,
        label_offsets,
    })
}

fn emit_push(bytes: &mut Vec<u8>, pool: &mut ConstantPool, constant: &Const) {
    match constant {
        Const::Null => bytes.push(op::ACONST_NULL),
        Const::Int(value) => match *value {
            -1..=5 => bytes.push((op::ICONST_0 as i32 + value) as u8),
            v if v >= i8::MIN as i32 && v <= i8::MAX as i32 => {
                bytes.push(op::BIPUSH);
                bytes.push(v as u8);
            }
            v if v >= i16::MIN as i32 && v <= i16::MAX as i32 => {
                bytes.push(op::SIPUSH);
                bytes.extend_from_slice(&(v as i16).to_be_bytes());
            }
            v => emit_ldc(bytes, pool.add_integer(v)),
        },
        Const::Long(value) => match *value {
            0 => bytes.push(op::LCONST_0),
            1 => bytes.push(op::LCONST_1),
            v => emit_ldc2(bytes, pool.add_long(v)),
        },
        Const::Float(value) => {
            if *value == 0.0 && value.is_sign_positive() {
                bytes.push(op::FCONST_0);
            } else if *value == 1.0 {
                bytes.push(op::FCONST_1);
            } else if *value == 2.0 {
                bytes.push(op::FCONST_2);
            } else {
                emit_ldc(bytes, pool.add_float(*value));
            }
        }
        Const::Double(value) => {
            if *value == 0.0 && value.is_sign_positive() {
                bytes.push(op::DCONST_0);
            } else if *value == 1.0 {
                bytes.push(op::DCONST_1);
            } else {
                emit_ldc2(bytes, pool.add_double(*value));
            }
        }
        Const::Str(value) => emit_ldc(bytes, pool.add_string(value)),
    }
}

fn emit_ldc(bytes: &mut Vec<u8>, index: u16) {
    if index <= u8::MAX as u16 {
        bytes.push(op::LDC);
        bytes.push(index as u8);
    } else {
        bytes.push(op::LDC_W);
        bytes.extend_from_slice(&index.to_be_bytes());
    }
}

fn emit_ldc2(bytes: &mut Vec<u8>, index: u16) {
    bytes.push(op::LDC2_W);
    bytes.extend_from_slice(&index.to_be_bytes());
}

/// Upper bound on operand stack depth by linear simulation.
///
/// Depth at a branch target is the depth recorded when a jump to it was
/// seen; after an unconditional transfer the simulation resumes at the
/// target's recorded depth.
fn compute_max_stack(code: &[Insn]) -> u16 {
    let mut depth: i32 = 0;
    let mut max: i32 = 0;
    let mut reachable = true;
    let mut at_label: HashMap<Label, i32> = HashMap::new();

    for insn in code {
        match insn {
            Insn::Label(label) => {
                if let Some(recorded) = at_label.get(label) {
                    depth = if reachable { depth.max(*recorded) } else { *recorded };
                }
                reachable = true;
            }
            Insn::Jump { target, .. } => {
                if reachable {
                    let after = depth + insn_delta(insn);
                    let entry = at_label.entry(*target).or_insert(after);
                    *entry = (*entry).max(after);
                    depth = after;
                }
            }
            _ => {
                if reachable {
                    depth += insn_delta(insn);
                }
            }
        }
        if ends_flow(insn) {
            reachable = false;
        }
        max = max.max(depth);
    }
    max.max(0) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_selects_short_encodings() {
        let mut pool = ConstantPool::new();
        let code = vec![
            Insn::Push(Const::Int(1)),
            Insn::Push(Const::Int(100)),
            Insn::Push(Const::Int(1000)),
            Insn::Push(Const::Int(100000)),
        ];
        let assembled = assemble(&code, &mut pool).unwrap();
        assert_eq!(assembled.bytes[0], op::ICONST_1);
        assert_eq!(assembled.bytes[1], op::BIPUSH);
        assert_eq!(assembled.bytes[3], op::SIPUSH);
        assert_eq!(assembled.bytes[6], op::LDC);
    }

    #[test]
    fn forward_jump_offsets_are_patched() {
        let mut pool = ConstantPool::new();
        let code = vec![
            Insn::Push(Const::Int(0)),
            Insn::Jump { op: op::IFEQ, target: 7 },
            Insn::Push(Const::Int(1)),
            Insn::Label(7),
            Insn::Simple(op::RETURN),
        ];
        let assembled = assemble(&code, &mut pool).unwrap();
        // iconst_0 (1 byte), ifeq at offset 1, iconst_1 at 4, label at 5
        let rel = i16::from_be_bytes([assembled.bytes[2], assembled.bytes[3]]);
        assert_eq!(rel, 4);
        assert_eq!(assembled.label_offsets[&7], 5);
    }

    #[test]
    fn backward_jump_is_negative() {
        let mut pool = ConstantPool::new();
        let code = vec![
            Insn::Label(1),
            Insn::Push(Const::Int(0)),
            Insn::Jump { op: op::GOTO, target: 1 },
        ];
        let assembled = assemble(&code, &mut pool).unwrap();
        let rel = i16::from_be_bytes([assembled.bytes[2], assembled.bytes[3]]);
        assert_eq!(rel, -1);
    }

    #[test]
    fn max_stack_counts_wide_values() {
        let mut pool = ConstantPool::new();
        let code = vec![
            Insn::Push(Const::Long(5)),
            Insn::Push(Const::Long(6)),
            Insn::Simple(op::LADD),
            Insn::Simple(op::LRETURN),
        ];
        let assembled = assemble(&code, &mut pool).unwrap();
        assert_eq!(assembled.max_stack, 4);
    }

    #[test]
    fn max_stack_merges_branch_targets() {
        let mut pool = ConstantPool::new();
        // materialized boolean: cmp-branch / 0 / goto / 1
        let code = vec![
            Insn::Push(Const::Int(1)),
            Insn::Push(Const::Int(2)),
            Insn::Jump { op: op::IF_ICMPEQ, target: 1 },
            Insn::Push(Const::Int(0)),
            Insn::Jump { op: op::GOTO, target: 2 },
            Insn::Label(1),
            Insn::Push(Const::Int(1)),
            Insn::Label(2),
            Insn::Simple(op::IRETURN),
        ];
        let assembled = assemble(&code, &mut pool).unwrap();
        assert_eq!(assembled.max_stack, 2);
    }

    #[test]
    fn invokeinterface_carries_count() {
        let mut pool = ConstantPool::new();
        let code = vec![Insn::Method {
            op: op::INVOKEINTERFACE,
            owner: "java/util/Iterator".into(),
            name: "next".into(),
            desc: "()Ljava/lang/Object;".into(),
            itf: true,
        }];
        let assembled = assemble(&code, &mut pool).unwrap();
        assert_eq!(assembled.bytes[0], op::INVOKEINTERFACE);
        assert_eq!(assembled.bytes[3], 1);
        assert_eq!(assembled.bytes[4], 0);
    }
}
