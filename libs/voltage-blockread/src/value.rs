//! Typed register values
//!
//! `ValueType` is the closed set of casts a device can be configured with. It
//! is resolved once from the configured type name, and carries its register
//! width and big-endian decode so the read path never dispatches on strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

use crate::error::{BlockReadError, Result};

/// Configured value type of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
}

impl ValueType {
    /// Resolve a configured type name.
    ///
    /// Case-insensitive; accepts the short (`u16`, `s32`, `f32`) and long
    /// (`uint16`, `int32`, `float32`) spellings plus the usual PLC aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        match normalized.as_str() {
            "bool" | "boolean" | "bit" | "coil" => Some(Self::Bool),
            "u8" | "uint8" | "byte" => Some(Self::U8),
            "u16" | "uint16" | "word" => Some(Self::U16),
            "u32" | "uint32" | "dword" => Some(Self::U32),
            "u64" | "uint64" | "qword" => Some(Self::U64),
            "s8" | "i8" | "int8" | "sint8" => Some(Self::S8),
            "s16" | "i16" | "int16" | "short" => Some(Self::S16),
            "s32" | "i32" | "int32" | "long" => Some(Self::S32),
            "s64" | "i64" | "int64" | "longlong" => Some(Self::S64),
            "f32" | "float32" | "float" | "real" => Some(Self::F32),
            "f64" | "float64" | "double" | "lreal" => Some(Self::F64),
            _ => None,
        }
    }

    /// Canonical short name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::S8 => "s8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Number of bytes the cast consumes
    pub fn byte_width(&self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 | Self::F32 => 4,
            Self::U64 | Self::S64 | Self::F64 => 8,
        }
    }

    /// Number of 16-bit registers a device of this type spans
    pub fn register_width(&self) -> u16 {
        self.byte_width().div_ceil(2) as u16
    }

    /// Cast a big-endian byte slice to a typed value.
    ///
    /// Slices wider than the type are read from their trailing (low-order)
    /// bytes, so a single register holding a `u8` yields its low byte.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let value = match self {
            Self::Bool => Value::Bool(bytes.iter().any(|b| *b != 0)),
            Self::U8 => Value::U8(u8::from_be_bytes(self.tail(bytes)?)),
            Self::S8 => Value::S8(i8::from_be_bytes(self.tail(bytes)?)),
            Self::U16 => Value::U16(u16::from_be_bytes(self.tail(bytes)?)),
            Self::S16 => Value::S16(i16::from_be_bytes(self.tail(bytes)?)),
            Self::U32 => Value::U32(u32::from_be_bytes(self.tail(bytes)?)),
            Self::S32 => Value::S32(i32::from_be_bytes(self.tail(bytes)?)),
            Self::U64 => Value::U64(u64::from_be_bytes(self.tail(bytes)?)),
            Self::S64 => Value::S64(i64::from_be_bytes(self.tail(bytes)?)),
            Self::F32 => Value::F32(f32::from_be_bytes(self.tail(bytes)?)),
            Self::F64 => Value::F64(f64::from_be_bytes(self.tail(bytes)?)),
        };

        trace!("Decoded {}: bytes={:02X?}, value={}", self, bytes, value);
        Ok(value)
    }

    fn tail<const N: usize>(&self, bytes: &[u8]) -> Result<[u8; N]> {
        if bytes.len() < N {
            return Err(BlockReadError::decode(format!(
                "Not enough bytes for {}: need {}, got {}",
                self,
                N,
                bytes.len()
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes[bytes.len() - N..]);
        Ok(out)
    }
}

impl FromStr for ValueType {
    type Err = BlockReadError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| BlockReadError::UnsupportedType(s.to_string()))
    }
}

impl TryFrom<String> for ValueType {
    type Error = BlockReadError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ValueType> for String {
    fn from(t: ValueType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoded device reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Value type this reading was decoded as
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::U8(_) => ValueType::U8,
            Self::U16(_) => ValueType::U16,
            Self::U32(_) => ValueType::U32,
            Self::U64(_) => ValueType::U64,
            Self::S8(_) => ValueType::S8,
            Self::S16(_) => ValueType::S16,
            Self::S32(_) => ValueType::S32,
            Self::S64(_) => ValueType::S64,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
        }
    }

    /// Numeric view of the reading (booleans map to 0.0 / 1.0)
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            },
            Self::U8(v) => f64::from(v),
            Self::U16(v) => f64::from(v),
            Self::U32(v) => f64::from(v),
            Self::U64(v) => v as f64,
            Self::S8(v) => f64::from(v),
            Self::S16(v) => f64::from(v),
            Self::S32(v) => f64::from(v),
            Self::S64(v) => v as f64,
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Big-endian register image of the value.
    ///
    /// Sub-register types (bool, u8, s8) occupy the low byte of one register.
    pub fn to_registers(&self) -> Vec<u16> {
        let bytes: Vec<u8> = match *self {
            Self::Bool(b) => vec![0, u8::from(b)],
            Self::U8(v) => vec![0, v],
            Self::S8(v) => vec![0, v as u8],
            Self::U16(v) => v.to_be_bytes().to_vec(),
            Self::S16(v) => v.to_be_bytes().to_vec(),
            Self::U32(v) => v.to_be_bytes().to_vec(),
            Self::S32(v) => v.to_be_bytes().to_vec(),
            Self::F32(v) => v.to_be_bytes().to_vec(),
            Self::U64(v) => v.to_be_bytes().to_vec(),
            Self::S64(v) => v.to_be_bytes().to_vec(),
            Self::F64(v) => v.to_be_bytes().to_vec(),
        };
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::S8(v) => write!(f, "{v}"),
            Self::S16(v) => write!(f, "{v}"),
            Self::S32(v) => write!(f, "{v}"),
            Self::S64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}
