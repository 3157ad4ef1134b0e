//! The [`Value`] type, the [`Opcode`] table, and each opcode's parameter
//! schema. This is the single source of truth consumed by the decoder,
//! the assembler, and the disassembler.

use std::fmt;
use std::rc::Rc;

/// A MiniVM runtime value. Copied by value; strings are logically immutable
/// and shared via [`Rc`] rather than cloned byte-for-byte.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i16),
    String(Rc<str>),
}

impl Value {
    /// Build a string value, sharing the backing allocation.
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    /// Truthiness used by `OP_NOT` and `JUMP_IF`: `Null`, `false`, `0`, and
    /// the empty string are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
        }
    }

    /// The variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i16> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

/// Render a value the way the textual assembly form does: strings are
/// escaped and quoted, everything else prints as a bare literal.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(true) => write!(f, "true"),
            Value::Boolean(false) => write!(f, "false"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{}", crate::tokens::escape_string(s)),
        }
    }
}

/// Reduce an arithmetic result modulo 2^16 and reinterpret as signed i16,
/// per spec: `overflow(n) = ((n + 2^15) mod 2^16) - 2^15`.
pub fn overflow(n: i64) -> i16 {
    let wrapped = (n + 0x8000).rem_euclid(0x1_0000) - 0x8000;
    wrapped as i16
}

/// The kind of immediate parameter an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// 1-byte length prefix followed by that many ASCII bytes.
    String,
    /// 1 unsigned byte, [0, 255].
    Uint,
    /// 1 signed byte, [-128, 127].
    Int,
    /// 2 little-endian bytes, signed, [-32768, 32767].
    IntBig,
}

/// A decoded immediate argument, tagged with the parameter kind that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(Rc<str>),
    Uint(u8),
    Int(i8),
    IntBig(i16),
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The argument widened to `i64`, for opcodes whose argument is always
    /// numeric (everything but `Str`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Arg::Uint(n) => Some(*n as i64),
            Arg::Int(n) => Some(*n as i64),
            Arg::IntBig(n) => Some(*n as i64),
            Arg::Str(_) => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "{}", crate::tokens::escape_string(s)),
            Arg::Uint(n) => write!(f, "{n}"),
            Arg::Int(n) => write!(f, "{n}"),
            Arg::IntBig(n) => write!(f, "{n}"),
        }
    }
}

/// The byte-tagged opcode enumeration (spec §6, authoritative table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Func,
    ConstNull,
    ConstFalse,
    ConstTrue,
    ConstInt,
    ConstIntBig,
    ConstString,
    OpNeg,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpMod,
    OpNot,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLte,
    CmpGt,
    CmpGte,
    Dup,
    Drop,
    LoadGlobal,
    StoreGlobal,
    LoadLocal,
    StoreLocal,
    Jump,
    JumpIf,
    Ret,
    Call,
    CallVoid,
}

impl Opcode {
    /// All opcodes, used by the assembler to build its name -> opcode map.
    pub const ALL: &'static [Opcode] = &[
        Opcode::Func,
        Opcode::ConstNull,
        Opcode::ConstFalse,
        Opcode::ConstTrue,
        Opcode::ConstInt,
        Opcode::ConstIntBig,
        Opcode::ConstString,
        Opcode::OpNeg,
        Opcode::OpAdd,
        Opcode::OpSub,
        Opcode::OpMul,
        Opcode::OpDiv,
        Opcode::OpMod,
        Opcode::OpNot,
        Opcode::CmpEq,
        Opcode::CmpNe,
        Opcode::CmpLt,
        Opcode::CmpLte,
        Opcode::CmpGt,
        Opcode::CmpGte,
        Opcode::Dup,
        Opcode::Drop,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::LoadLocal,
        Opcode::StoreLocal,
        Opcode::Jump,
        Opcode::JumpIf,
        Opcode::Ret,
        Opcode::Call,
        Opcode::CallVoid,
    ];

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Some(match byte {
            0x01 => Opcode::Func,
            0x10 => Opcode::ConstNull,
            0x11 => Opcode::ConstFalse,
            0x12 => Opcode::ConstTrue,
            0x13 => Opcode::ConstInt,
            0x14 => Opcode::ConstIntBig,
            0x15 => Opcode::ConstString,
            0x20 => Opcode::OpNeg,
            0x21 => Opcode::OpAdd,
            0x22 => Opcode::OpSub,
            0x23 => Opcode::OpMul,
            0x24 => Opcode::OpDiv,
            0x25 => Opcode::OpMod,
            0x28 => Opcode::OpNot,
            0x30 => Opcode::CmpEq,
            0x31 => Opcode::CmpNe,
            0x32 => Opcode::CmpLt,
            0x33 => Opcode::CmpLte,
            0x34 => Opcode::CmpGt,
            0x35 => Opcode::CmpGte,
            0x40 => Opcode::Dup,
            0x41 => Opcode::Drop,
            0x48 => Opcode::LoadGlobal,
            0x49 => Opcode::StoreGlobal,
            0x4A => Opcode::LoadLocal,
            0x4B => Opcode::StoreLocal,
            0x50 => Opcode::Jump,
            0x51 => Opcode::JumpIf,
            0x58 => Opcode::Ret,
            0x59 => Opcode::Call,
            0x5A => Opcode::CallVoid,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Opcode::Func => 0x01,
            Opcode::ConstNull => 0x10,
            Opcode::ConstFalse => 0x11,
            Opcode::ConstTrue => 0x12,
            Opcode::ConstInt => 0x13,
            Opcode::ConstIntBig => 0x14,
            Opcode::ConstString => 0x15,
            Opcode::OpNeg => 0x20,
            Opcode::OpAdd => 0x21,
            Opcode::OpSub => 0x22,
            Opcode::OpMul => 0x23,
            Opcode::OpDiv => 0x24,
            Opcode::OpMod => 0x25,
            Opcode::OpNot => 0x28,
            Opcode::CmpEq => 0x30,
            Opcode::CmpNe => 0x31,
            Opcode::CmpLt => 0x32,
            Opcode::CmpLte => 0x33,
            Opcode::CmpGt => 0x34,
            Opcode::CmpGte => 0x35,
            Opcode::Dup => 0x40,
            Opcode::Drop => 0x41,
            Opcode::LoadGlobal => 0x48,
            Opcode::StoreGlobal => 0x49,
            Opcode::LoadLocal => 0x4A,
            Opcode::StoreLocal => 0x4B,
            Opcode::Jump => 0x50,
            Opcode::JumpIf => 0x51,
            Opcode::Ret => 0x58,
            Opcode::Call => 0x59,
            Opcode::CallVoid => 0x5A,
        }
    }

    /// The name as it appears in the textual assembly form (and as typed
    /// by the user, case-insensitively).
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Func => "FUNC",
            Opcode::ConstNull => "CONST_NULL",
            Opcode::ConstFalse => "CONST_FALSE",
            Opcode::ConstTrue => "CONST_TRUE",
            Opcode::ConstInt => "CONST_INT",
            Opcode::ConstIntBig => "CONST_INT_BIG",
            Opcode::ConstString => "CONST_STRING",
            Opcode::OpNeg => "OP_NEG",
            Opcode::OpAdd => "OP_ADD",
            Opcode::OpSub => "OP_SUB",
            Opcode::OpMul => "OP_MUL",
            Opcode::OpDiv => "OP_DIV",
            Opcode::OpMod => "OP_MOD",
            Opcode::OpNot => "OP_NOT",
            Opcode::CmpEq => "CMP_EQ",
            Opcode::CmpNe => "CMP_NE",
            Opcode::CmpLt => "CMP_LT",
            Opcode::CmpLte => "CMP_LTE",
            Opcode::CmpGt => "CMP_GT",
            Opcode::CmpGte => "CMP_GTE",
            Opcode::Dup => "DUP",
            Opcode::Drop => "DROP",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::StoreLocal => "STORE_LOCAL",
            Opcode::Jump => "JUMP",
            Opcode::JumpIf => "JUMP_IF",
            Opcode::Ret => "RET",
            Opcode::Call => "CALL",
            Opcode::CallVoid => "CALL_VOID",
        }
    }

    /// The fixed parameter schema for this opcode.
    pub fn params(self) -> &'static [ParamKind] {
        use ParamKind::*;
        match self {
            Opcode::Func => &[String, Uint, Uint],
            Opcode::ConstInt => &[Int],
            Opcode::ConstIntBig => &[IntBig],
            Opcode::ConstString => &[String],
            Opcode::LoadGlobal => &[String],
            Opcode::StoreGlobal => &[String],
            Opcode::LoadLocal => &[Uint],
            Opcode::StoreLocal => &[Uint],
            Opcode::Jump => &[IntBig],
            Opcode::JumpIf => &[IntBig],
            Opcode::Call => &[String, Uint],
            Opcode::CallVoid => &[String, Uint],
            _ => &[],
        }
    }

    pub fn by_name(name: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_wraps_at_boundaries() {
        assert_eq!(overflow(32767), 32767);
        assert_eq!(overflow(32768), -32768);
        assert_eq!(overflow(-32769), 32767);
        assert_eq!(overflow(65536), 0);
        assert_eq!(overflow(-1), -1);
    }

    #[test]
    fn opcode_roundtrips_through_byte() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.to_byte()), Some(op));
        }
    }

    #[test]
    fn opcode_roundtrips_through_name() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::by_name(op.name()), Some(op));
        }
    }

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Integer(1).is_truthy());
        assert!(Value::string("x").is_truthy());
    }

    #[test]
    fn equality_across_variants_is_false() {
        assert_ne!(Value::Null, Value::Integer(0));
        assert_ne!(Value::Boolean(false), Value::Integer(0));
    }
}
