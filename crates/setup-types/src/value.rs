//! Typed values pushed and popped by the expression interpreter.
//!
//! [`TypedValue`] is a closed sum type. Every operator checks the kind class
//! of its operands and produces [`TypedValue::Undefined`] when they do not
//! fit; no operator ever coerces silently across classes.

use crate::ids::StringId;
use serde::{Deserialize, Serialize};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Date / Time payloads
// ══════════════════════════════════════════════════════════════════════════════

/// A calendar date as stored in a date question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HiiDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl HiiDate {
    pub fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Packed 32-bit form: `year | month << 16 | day << 24`.
    pub fn to_u32(self) -> u32 {
        u32::from(self.year) | (u32::from(self.month) << 16) | (u32::from(self.day) << 24)
    }

    pub fn from_u32(raw: u32) -> Self {
        Self {
            year: (raw & 0xFFFF) as u16,
            month: ((raw >> 16) & 0xFF) as u8,
            day: (raw >> 24) as u8,
        }
    }
}

/// A wall-clock time as stored in a time question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HiiTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl HiiTime {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    /// Packed 32-bit form: `hour | minute << 8 | second << 16`.
    pub fn to_u32(self) -> u32 {
        u32::from(self.hour) | (u32::from(self.minute) << 8) | (u32::from(self.second) << 16)
    }

    pub fn from_u32(raw: u32) -> Self {
        Self {
            hour: (raw & 0xFF) as u8,
            minute: ((raw >> 8) & 0xFF) as u8,
            second: ((raw >> 16) & 0xFF) as u8,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ValueKind
// ══════════════════════════════════════════════════════════════════════════════

/// The kind tag of a [`TypedValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    Date,
    Time,
    String,
    Buffer,
    Undefined,
}

impl ValueKind {
    /// Storage width in bytes for fixed-size kinds. `Buffer` and `Undefined`
    /// have no intrinsic width.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::U8 => Some(1),
            Self::U16 | Self::String => Some(2),
            Self::Time => Some(3),
            Self::U32 | Self::Date => Some(4),
            Self::U64 => Some(8),
            Self::Buffer | Self::Undefined => None,
        }
    }

    /// The unsigned integer kind able to hold exactly `width` bytes.
    pub fn for_width(width: usize) -> Option<Self> {
        match width {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            _ => None,
        }
    }

    /// Kinds accepted by arithmetic, bitwise and shift operators.
    pub fn is_integer_like(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::U8 | Self::U16 | Self::U32 | Self::U64 | Self::Date | Self::Time
        )
    }

    /// Plain unsigned integers (no boolean, no date/time).
    pub fn is_unsigned(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Date => "date",
            Self::Time => "time",
            Self::String => "string",
            Self::Buffer => "buffer",
            Self::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// TypedValue
// ══════════════════════════════════════════════════════════════════════════════

/// A dynamically-typed interpreter value.
///
/// `Buffer` owns its bytes. Popping a buffer off the operand stack moves it
/// to the consuming operator, which drops it on every exit path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypedValue {
    #[default]
    Undefined,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Date(HiiDate),
    Time(HiiTime),
    /// Reference into the owning package's string table.
    String(StringId),
    Buffer(Vec<u8>),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Undefined => ValueKind::Undefined,
            Self::Bool(_) => ValueKind::Bool,
            Self::U8(_) => ValueKind::U8,
            Self::U16(_) => ValueKind::U16,
            Self::U32(_) => ValueKind::U32,
            Self::U64(_) => ValueKind::U64,
            Self::Date(_) => ValueKind::Date,
            Self::Time(_) => ValueKind::Time,
            Self::String(_) => ValueKind::String,
            Self::Buffer(_) => ValueKind::Buffer,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_integer_like(&self) -> bool {
        self.kind().is_integer_like()
    }

    /// Zero-extended 64-bit view of an integer-like value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Bool(b) => Some(u64::from(*b)),
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            Self::Date(d) => Some(u64::from(d.to_u32())),
            Self::Time(t) => Some(u64::from(t.to_u32())),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `true` only for `Bool(true)`; anything else (including Undefined)
    /// counts as false when an expression gates a statement.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    pub fn as_buffer(&self) -> Option<&[u8]> {
        match self {
            Self::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Build a value of `kind` from a raw integer, truncating to its width.
    pub fn from_u64(kind: ValueKind, raw: u64) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(raw != 0),
            ValueKind::U8 => Self::U8(raw as u8),
            ValueKind::U16 => Self::U16(raw as u16),
            ValueKind::U32 => Self::U32(raw as u32),
            ValueKind::U64 => Self::U64(raw),
            ValueKind::Date => Self::Date(HiiDate::from_u32(raw as u32)),
            ValueKind::Time => Self::Time(HiiTime::from_u32(raw as u32)),
            ValueKind::String => Self::String(StringId(raw as u16)),
            ValueKind::Buffer => Self::Buffer(raw.to_le_bytes().to_vec()),
            ValueKind::Undefined => Self::Undefined,
        }
    }

    /// Little-endian storage image of the value.
    ///
    /// Strings serialize as their 16-bit string id; callers that store the
    /// text itself encode it separately.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Undefined => Vec::new(),
            Self::Bool(b) => vec![u8::from(*b)],
            Self::U8(v) => vec![*v],
            Self::U16(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::U64(v) => v.to_le_bytes().to_vec(),
            Self::Date(d) => {
                let mut out = d.year.to_le_bytes().to_vec();
                out.push(d.month);
                out.push(d.day);
                out
            }
            Self::Time(t) => vec![t.hour, t.minute, t.second],
            Self::String(id) => id.0.to_le_bytes().to_vec(),
            Self::Buffer(bytes) => bytes.clone(),
        }
    }

    /// Decode a little-endian storage image into a value of `kind`.
    ///
    /// Short inputs are zero-extended; extra bytes are ignored.
    pub fn from_le_bytes(kind: ValueKind, bytes: &[u8]) -> Self {
        if kind == ValueKind::Buffer {
            return Self::Buffer(bytes.to_vec());
        }
        let mut raw = [0u8; 8];
        let n = bytes.len().min(8);
        raw[..n].copy_from_slice(&bytes[..n]);
        match kind {
            ValueKind::Date => Self::Date(HiiDate {
                year: u16::from_le_bytes([raw[0], raw[1]]),
                month: raw[2],
                day: raw[3],
            }),
            ValueKind::Time => Self::Time(HiiTime {
                hour: raw[0],
                minute: raw[1],
                second: raw[2],
            }),
            _ => Self::from_u64(kind, u64::from_le_bytes(raw)),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::Date(d) => write!(f, "{:04}/{:02}/{:02}", d.year, d.month, d.day),
            Self::Time(t) => write!(f, "{:02}:{:02}:{:02}", t.hour, t.minute, t.second),
            Self::String(id) => write!(f, "{id}"),
            Self::Buffer(bytes) => {
                f.write_str("[")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                f.write_str("]")
            }
        }
    }
}
