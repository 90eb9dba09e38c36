//! JVM bytecode instruction opcodes
//!
//! Values follow the Java Virtual Machine Specification, ordered by opcode
//! value; only the instructions the emitter produces are listed.

// 0x00 - 0x0F: Constants
pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0a;
pub const FCONST_0: u8 = 0x0b;
pub const FCONST_1: u8 = 0x0c;
pub const FCONST_2: u8 = 0x0d;
pub const DCONST_0: u8 = 0x0e;
pub const DCONST_1: u8 = 0x0f;

// 0x10 - 0x14: Pushes and constant pool loads
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

// 0x15 - 0x19: Local loads
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;

// 0x2E - 0x35: Array loads
pub const IALOAD: u8 = 0x2e;
pub const LALOAD: u8 = 0x2f;
pub const FALOAD: u8 = 0x30;
pub const DALOAD: u8 = 0x31;
pub const AALOAD: u8 = 0x32;
pub const BALOAD: u8 = 0x33;
pub const CALOAD: u8 = 0x34;
pub const SALOAD: u8 = 0x35;

// 0x36 - 0x3A: Local stores
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;

// 0x4F - 0x56: Array stores
pub const IASTORE: u8 = 0x4f;
pub const LASTORE: u8 = 0x50;
pub const FASTORE: u8 = 0x51;
pub const DASTORE: u8 = 0x52;
pub const AASTORE: u8 = 0x53;
pub const BASTORE: u8 = 0x54;
pub const CASTORE: u8 = 0x55;
pub const SASTORE: u8 = 0x56;

// 0x57 - 0x5F: Stack operations
pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5a;
pub const DUP_X2: u8 = 0x5b;
pub const DUP2: u8 = 0x5c;
pub const DUP2_X1: u8 = 0x5d;
pub const DUP2_X2: u8 = 0x5e;
pub const SWAP: u8 = 0x5f;

// 0x60 - 0x77: Arithmetic
pub const IADD: u8 = 0x60;
pub const LADD: u8 = 0x61;
pub const FADD: u8 = 0x62;
pub const DADD: u8 = 0x63;
pub const ISUB: u8 = 0x64;
pub const LSUB: u8 = 0x65;
pub const FSUB: u8 = 0x66;
pub const DSUB: u8 = 0x67;
pub const IMUL: u8 = 0x68;
pub const LMUL: u8 = 0x69;
pub const FMUL: u8 = 0x6a;
pub const DMUL: u8 = 0x6b;
pub const IDIV: u8 = 0x6c;
pub const LDIV: u8 = 0x6d;
pub const FDIV: u8 = 0x6e;
pub const DDIV: u8 = 0x6f;
pub const INEG: u8 = 0x74;
pub const LNEG: u8 = 0x75;
pub const FNEG: u8 = 0x76;
pub const DNEG: u8 = 0x77;

// 0x78 - 0x83: Shifts and logic
pub const IXOR: u8 = 0x82;

// 0x84: Increment
pub const IINC: u8 = 0x84;

// 0x85 - 0x93: Conversions
pub const I2L: u8 = 0x85;
pub const I2F: u8 = 0x86;
pub const I2D: u8 = 0x87;
pub const L2I: u8 = 0x88;
pub const L2F: u8 = 0x89;
pub const L2D: u8 = 0x8a;
pub const F2I: u8 = 0x8b;
pub const F2L: u8 = 0x8c;
pub const F2D: u8 = 0x8d;
pub const D2I: u8 = 0x8e;
pub const D2L: u8 = 0x8f;
pub const D2F: u8 = 0x90;

// 0x94 - 0x98: Comparisons
pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;

// 0x99 - 0xA8: Branches
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPNE: u8 = 0xa0;
pub const IF_ICMPLT: u8 = 0xa1;
pub const IF_ICMPGE: u8 = 0xa2;
pub const IF_ICMPGT: u8 = 0xa3;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;

// 0xAC - 0xB1: Returns
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;

// 0xB2 - 0xB9: Field and method access
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;

// 0xBB - 0xC7: Objects and arrays
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;

/// Mnemonic for a known opcode, used by the disassembler
pub fn mnemonic(opcode: u8) -> &'static str {
    match opcode {
        NOP => "nop",
        ACONST_NULL => "aconst_null",
        ICONST_M1 => "iconst_m1",
        ICONST_0 => "iconst_0",
        ICONST_1 => "iconst_1",
        ICONST_2 => "iconst_2",
        ICONST_3 => "iconst_3",
        ICONST_4 => "iconst_4",
        ICONST_5 => "iconst_5",
        LCONST_0 => "lconst_0",
        LCONST_1 => "lconst_1",
        FCONST_0 => "fconst_0",
        FCONST_1 => "fconst_1",
        FCONST_2 => "fconst_2",
        DCONST_0 => "dconst_0",
        DCONST_1 => "dconst_1",
        BIPUSH => "bipush",
        SIPUSH => "sipush",
        LDC => "ldc",
        LDC_W => "ldc_w",
        LDC2_W => "ldc2_w",
        ILOAD => "iload",
        LLOAD => "lload",
        FLOAD => "fload",
        DLOAD => "dload",
        ALOAD => "aload",
        IALOAD => "iaload",
        LALOAD => "laload",
        FALOAD => "faload",
        DALOAD => "daload",
        AALOAD => "aaload",
        BALOAD => "baload",
        CALOAD => "caload",
        SALOAD => "saload",
        ISTORE => "istore",
        LSTORE => "lstore",
        FSTORE => "fstore",
        DSTORE => "dstore",
        ASTORE => "astore",
        IASTORE => "iastore",
        LASTORE => "lastore",
        FASTORE => "fastore",
        DASTORE => "dastore",
        AASTORE => "aastore",
        BASTORE => "bastore",
        CASTORE => "castore",
        SASTORE => "sastore",
        POP => "pop",
        POP2 => "pop2",
        DUP => "dup",
        DUP_X1 => "dup_x1",
        DUP_X2 => "dup_x2",
        DUP2 => "dup2",
        DUP2_X1 => "dup2_x1",
        DUP2_X2 => "dup2_x2",
        SWAP => "swap",
        IADD => "iadd",
        LADD => "ladd",
        FADD => "fadd",
        DADD => "dadd",
        ISUB => "isub",
        LSUB => "lsub",
        FSUB => "fsub",
        DSUB => "dsub",
        IMUL => "imul",
        LMUL => "lmul",
        FMUL => "fmul",
        DMUL => "dmul",
        IDIV => "idiv",
        LDIV => "ldiv",
        FDIV => "fdiv",
        DDIV => "ddiv",
        INEG => "ineg",
        LNEG => "lneg",
        FNEG => "fneg",
        DNEG => "dneg",
        IXOR => "ixor",
        IINC => "iinc",
        I2L => "i2l",
        I2F => "i2f",
        I2D => "i2d",
        L2I => "l2i",
        L2F => "l2f",
        L2D => "l2d",
        F2I => "f2i",
        F2L => "f2l",
        F2D => "f2d",
        D2I => "d2i",
        D2L => "d2l",
        D2F => "d2f",
        LCMP => "lcmp",
        FCMPL => "fcmpl",
        FCMPG => "fcmpg",
        DCMPL => "dcmpl",
        DCMPG => "dcmpg",
        IFEQ => "ifeq",
        IFNE => "ifne",
        IFLT => "iflt",
        IFGE => "ifge",
        IFGT => "ifgt",
        IFLE => "ifle",
        IF_ICMPEQ => "if_icmpeq",
        IF_ICMPNE => "if_icmpne",
        IF_ICMPLT => "if_icmplt",
        IF_ICMPGE => "if_icmpge",
        IF_ICMPGT => "if_icmpgt",
        IF_ICMPLE => "if_icmple",
        IF_ACMPEQ => "if_acmpeq",
        IF_ACMPNE => "if_acmpne",
        GOTO => "goto",
        IRETURN => "ireturn",
        LRETURN => "lreturn",
        FRETURN => "freturn",
        DRETURN => "dreturn",
        ARETURN => "areturn",
        RETURN => "return",
        GETSTATIC => "getstatic",
        PUTSTATIC => "putstatic",
        GETFIELD => "getfield",
        PUTFIELD => "putfield",
        INVOKEVIRTUAL => "invokevirtual",
        INVOKESPECIAL => "invokespecial",
        INVOKESTATIC => "invokestatic",
        INVOKEINTERFACE => "invokeinterface",
        NEW => "new",
        NEWARRAY => "newarray",
        ANEWARRAY => "anewarray",
        ARRAYLENGTH => "arraylength",
        ATHROW => "athrow",
        CHECKCAST => "checkcast",
        INSTANCEOF => "instanceof",
        IFNULL => "ifnull",
        IFNONNULL => "ifnonnull",
        _ => "unknown",
    }
}
