//! Order-preserving tuple encoding.
//!
//! A tuple is a sequence of nullable byte fields. Encoded tuples compare
//! byte-wise in the same order as their fields compare lexicographically, and
//! the encoding of the first `n` fields is a byte prefix of the encoding of the
//! whole tuple. A prefix tuple can therefore drive a range scan over keys that
//! start with it.
//!
//! Field format:
//! - NULL: `[0x00]`
//! - value: `[0x01][escaped bytes][0x00 0x01]`, where every `0x00` inside the
//!   value is written as `0x00 0xFF`.
//!
//! NULL sorts before every value, and a value sorts before any longer value it
//! is a prefix of.

use std::fmt;

use crate::error::StoreError;

const NULL_MARKER: u8 = 0x00;
const VALUE_MARKER: u8 = 0x01;
const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// A sequence of nullable byte fields.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tuple {
    fields: Vec<Option<Vec<u8>>>,
}

impl Tuple {
    /// Create a tuple from its fields.
    pub fn new(fields: Vec<Option<Vec<u8>>>) -> Self {
        Self { fields }
    }

    /// Create a tuple in which no field is NULL.
    pub fn from_values<I, B>(values: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self {
            fields: values.into_iter().map(|v| Some(v.into())).collect(),
        }
    }

    /// The empty tuple.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of fields.
    pub fn count(&self) -> usize {
        self.fields.len()
    }

    /// Check if the tuple has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw bytes of field `i`.
    ///
    /// Returns `None` when the field is NULL. Fields past the end of the tuple
    /// read as NULL, so rows written before a column was appended still decode.
    pub fn field(&self, i: usize) -> Option<&[u8]> {
        self.fields.get(i).and_then(|f| f.as_deref())
    }

    /// Check if field `i` is NULL (or absent).
    pub fn is_null(&self, i: usize) -> bool {
        self.field(i).is_none()
    }

    /// Iterate over the fields.
    pub fn fields(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.fields.iter().map(|f| f.as_deref())
    }

    /// Append a field.
    pub fn push(&mut self, field: Option<Vec<u8>>) {
        self.fields.push(field);
    }

    /// The first `n` fields.
    pub fn prefix(&self, n: usize) -> Tuple {
        Tuple::new(self.fields[..n.min(self.fields.len())].to_vec())
    }

    /// The last `n` fields.
    pub fn suffix(&self, n: usize) -> Tuple {
        let start = self.fields.len().saturating_sub(n);
        Tuple::new(self.fields[start..].to_vec())
    }

    /// Concatenate two tuples.
    pub fn concat(&self, other: &Tuple) -> Tuple {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Tuple::new(fields)
    }

    /// Encode the tuple to its ordered byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the tuple, appending to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        for field in &self.fields {
            match field {
                None => buf.push(NULL_MARKER),
                Some(bytes) => {
                    buf.push(VALUE_MARKER);
                    for &b in bytes {
                        buf.push(b);
                        if b == ESCAPE {
                            buf.push(ESCAPED_ZERO);
                        }
                    }
                    buf.push(ESCAPE);
                    buf.push(TERMINATOR);
                }
            }
        }
    }

    /// Decode a tuple from its ordered byte form.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut fields = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                NULL_MARKER => {
                    fields.push(None);
                    i += 1;
                }
                VALUE_MARKER => {
                    i += 1;
                    let mut field = Vec::new();
                    loop {
                        match (bytes.get(i), bytes.get(i + 1)) {
                            (Some(&ESCAPE), Some(&ESCAPED_ZERO)) => {
                                field.push(0);
                                i += 2;
                            }
                            (Some(&ESCAPE), Some(&TERMINATOR)) => {
                                i += 2;
                                break;
                            }
                            (Some(&ESCAPE), _) => {
                                return Err(StoreError::InvalidTuple(format!(
                                    "bad escape at offset {}",
                                    i
                                )));
                            }
                            (Some(&b), _) => {
                                field.push(b);
                                i += 1;
                            }
                            (None, _) => {
                                return Err(StoreError::InvalidTuple(
                                    "unterminated field".to_string(),
                                ));
                            }
                        }
                    }
                    fields.push(Some(field));
                }
                other => {
                    return Err(StoreError::InvalidTuple(format!(
                        "unknown field marker {:#04x} at offset {}",
                        other, i
                    )));
                }
            }
        }

        Ok(Self { fields })
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for field in &self.fields {
            match field {
                Some(bytes) => list.entry(&format_args!("{}", hex::encode(bytes))),
                None => list.entry(&format_args!("NULL")),
            };
        }
        list.finish()
    }
}

/// Reusable builder for fixed-width tuples.
///
/// Every slot starts NULL; `build` hands back the tuple and resets the slots,
/// so one builder can serve a whole diff pass.
#[derive(Debug, Clone)]
pub struct TupleBuilder {
    fields: Vec<Option<Vec<u8>>>,
}

impl TupleBuilder {
    /// Create a builder for tuples of `width` fields.
    pub fn new(width: usize) -> Self {
        Self {
            fields: vec![None; width],
        }
    }

    /// Number of fields produced by this builder.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Set field `i` to raw bytes, or NULL.
    ///
    /// Panics if `i` is not below the builder's width.
    pub fn put_raw(&mut self, i: usize, field: Option<&[u8]>) {
        self.fields[i] = field.map(<[u8]>::to_vec);
    }

    /// Produce the tuple and reset every slot to NULL.
    pub fn build(&mut self) -> Tuple {
        let width = self.fields.len();
        Tuple::new(std::mem::replace(&mut self.fields, vec![None; width]))
    }
}
