//! Column types, runtime values and tuple descriptors.
//!
//! Values are stored as tuple fields in a sortable byte form: byte-wise
//! comparison of two encoded values of the same type matches the order of
//! the values themselves.

use std::fmt;

use arbor_store::Tuple;

use crate::error::{Error, Result};

/// Scalar column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit unsigned integer.
    Uint64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// UUID (128-bit identifier).
    Uuid,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
}

impl ColumnType {
    /// SQL-style name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "BOOL",
            ColumnType::Int32 => "INT",
            ColumnType::Int64 => "BIGINT",
            ColumnType::Uint64 => "BIGINT UNSIGNED",
            ColumnType::Float64 => "DOUBLE",
            ColumnType::String => "VARCHAR",
            ColumnType::Bytes => "VARBINARY",
            ColumnType::Uuid => "UUID",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Check if a value can be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::Int32, Value::Int32(_))
                | (ColumnType::Int64, Value::Int64(_))
                | (ColumnType::Uint64, Value::Uint64(_))
                | (ColumnType::Float64, Value::Float64(_))
                | (ColumnType::String, Value::String(_))
                | (ColumnType::Bytes, Value::Bytes(_))
                | (ColumnType::Uuid, Value::Uuid(_))
                | (ColumnType::Timestamp, Value::Timestamp(_))
        )
    }
}

/// A runtime column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    Uint64(u64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// UUID as 16 bytes.
    Uuid([u8; 16]),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => ColumnType::Bool.name(),
            Value::Int32(_) => ColumnType::Int32.name(),
            Value::Int64(_) => ColumnType::Int64.name(),
            Value::Uint64(_) => ColumnType::Uint64.name(),
            Value::Float64(_) => ColumnType::Float64.name(),
            Value::String(_) => ColumnType::String.name(),
            Value::Bytes(_) => ColumnType::Bytes.name(),
            Value::Uuid(_) => ColumnType::Uuid.name(),
            Value::Timestamp(_) => ColumnType::Timestamp.name(),
        }
    }

    /// Encode the value as a sortable tuple field. NULL has no field bytes.
    pub fn to_field(&self) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Value::Null => return None,
            Value::Bool(b) => buf.push(u8::from(*b)),
            Value::Int32(n) => {
                // Flip sign bit for correct sort order (negative before positive)
                let sortable = (*n as u32) ^ 0x8000_0000;
                buf.extend_from_slice(&sortable.to_be_bytes());
            }
            Value::Int64(n) | Value::Timestamp(n) => {
                let sortable = (*n as u64) ^ 0x8000_0000_0000_0000;
                buf.extend_from_slice(&sortable.to_be_bytes());
            }
            Value::Uint64(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::Float64(n) => {
                let bits = n.to_bits();
                let sortable = if (bits & 0x8000_0000_0000_0000) != 0 {
                    !bits // Negative: flip all bits
                } else {
                    bits ^ 0x8000_0000_0000_0000 // Positive: flip sign bit
                };
                buf.extend_from_slice(&sortable.to_be_bytes());
            }
            Value::String(s) => buf.extend_from_slice(s.as_bytes()),
            Value::Bytes(b) => buf.extend_from_slice(b),
            Value::Uuid(id) => buf.extend_from_slice(id),
        }
        Some(buf)
    }

    /// Decode a tuple field stored for a column of type `ty`.
    pub fn from_field(ty: ColumnType, field: Option<&[u8]>) -> Result<Value> {
        let Some(bytes) = field else {
            return Ok(Value::Null);
        };

        let value = match ty {
            ColumnType::Bool => match bytes {
                [b] => Value::Bool(*b != 0),
                _ => return Err(bad_width(ty, bytes)),
            },
            ColumnType::Int32 => {
                let raw = u32::from_be_bytes(fixed(ty, bytes)?);
                Value::Int32((raw ^ 0x8000_0000) as i32)
            }
            ColumnType::Int64 => {
                let raw = u64::from_be_bytes(fixed(ty, bytes)?);
                Value::Int64((raw ^ 0x8000_0000_0000_0000) as i64)
            }
            ColumnType::Timestamp => {
                let raw = u64::from_be_bytes(fixed(ty, bytes)?);
                Value::Timestamp((raw ^ 0x8000_0000_0000_0000) as i64)
            }
            ColumnType::Uint64 => Value::Uint64(u64::from_be_bytes(fixed(ty, bytes)?)),
            ColumnType::Float64 => {
                let sortable = u64::from_be_bytes(fixed(ty, bytes)?);
                let bits = if (sortable & 0x8000_0000_0000_0000) != 0 {
                    sortable ^ 0x8000_0000_0000_0000
                } else {
                    !sortable
                };
                Value::Float64(f64::from_bits(bits))
            }
            ColumnType::String => Value::String(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| Error::Deserialization(e.to_string()))?,
            ),
            ColumnType::Bytes => Value::Bytes(bytes.to_vec()),
            ColumnType::Uuid => Value::Uuid(fixed(ty, bytes)?),
        };
        Ok(value)
    }
}

fn fixed<const N: usize>(ty: ColumnType, bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| bad_width(ty, bytes))
}

fn bad_width(ty: ColumnType, bytes: &[u8]) -> Error {
    Error::Deserialization(format!("{} field of {} bytes", ty.name(), bytes.len()))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) | Value::Timestamp(n) => write!(f, "{}", n),
            Value::Uint64(n) => write!(f, "{}", n),
            Value::Float64(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", hex::encode(b)),
            Value::Uuid(id) => write!(f, "{}", hex::encode(id)),
        }
    }
}

/// Column types of a tuple, used to decode and format it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TupleDesc {
    pub types: Vec<ColumnType>,
}

impl TupleDesc {
    pub fn new(types: Vec<ColumnType>) -> Self {
        Self { types }
    }

    /// Number of fields described.
    pub fn count(&self) -> usize {
        self.types.len()
    }

    /// Descriptor of the first `n` fields.
    pub fn prefix_desc(&self, n: usize) -> TupleDesc {
        TupleDesc::new(self.types[..n.min(self.types.len())].to_vec())
    }

    /// Decode every described field of `tuple`.
    pub fn decode(&self, tuple: &Tuple) -> Result<Vec<Value>> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| Value::from_field(*ty, tuple.field(i)))
            .collect()
    }

    /// Render `tuple` as `(a, b, ...)`. Fields that fail to decode are shown
    /// as hex.
    pub fn format(&self, tuple: &Tuple) -> String {
        let fields: Vec<String> = self
            .types
            .iter()
            .enumerate()
            .map(|(i, ty)| match Value::from_field(*ty, tuple.field(i)) {
                Ok(value) => value.to_string(),
                Err(_) => tuple.field(i).map(hex::encode).unwrap_or_default(),
            })
            .collect();
        format!("({})", fields.join(", "))
    }
}
