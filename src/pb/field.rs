// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The decoded protocol-buffer field/message model.
//!
//! The original C reader represents a message as a sentinel-headed
//! doubly-linked list of fields, so that "last field with a given number"
//! (which the PB spec requires: later fields override earlier ones) is a
//! backward scan from the sentinel, and packed-field expansion can splice a
//! sublist in place without reallocating the rest of the message.
//!
//! Neither property needs a linked list in Rust: a plain `Vec<Field>` gives
//! a backward scan for free via `.iter().rev()`, and [`super::message::Message::expand_packed`]
//! never needs to re-splice its output back into the field list, since
//! nothing downstream re-traverses the expansion as fields.

/// Wire type of a decoded protocol-buffer field, per the
/// [encoding spec](https://protobuf.dev/programming-guides/encoding/#structure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    I64,
    Len,
    I32,
}

impl WireType {
    /// Parses the low 3 bits of a field tag into a [`WireType`].
    pub fn from_tag_bits(bits: u64) -> Option<Self> {
        match bits {
            0 => Some(Self::Varint),
            1 => Some(Self::I64),
            2 => Some(Self::Len),
            5 => Some(Self::I32),
            _ => None,
        }
    }
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Varint => write!(f, "varint"),
            Self::I64 => write!(f, "i64"),
            Self::Len => write!(f, "len"),
            Self::I32 => write!(f, "i32"),
        }
    }
}

/// The decoded value of a single field, tagged by its wire type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Varint(u64),
    I64(u64),
    I32(u32),
    Len(Vec<u8>),
}

impl FieldValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::I64(_) => WireType::I64,
            Self::I32(_) => WireType::I32,
            Self::Len(_) => WireType::Len,
        }
    }

    /// Interprets this value as a varint, if it is one.
    pub fn as_varint(&self) -> Option<u64> {
        match self {
            Self::Varint(v) => Some(*v),
            _ => None,
        }
    }

    /// Interprets this value as a `Len` payload, if it is one.
    pub fn as_len(&self) -> Option<&[u8]> {
        match self {
            Self::Len(buf) => Some(buf),
            _ => None,
        }
    }
}

/// A single decoded field: its field number and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub number: i32,
    pub value: FieldValue,
}

impl Field {
    pub fn wire_type(&self) -> WireType {
        self.value.wire_type()
    }
}
