// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The protocol-buffer decoder (C4): tag/value parsing, submessage reads,
//! inflate-then-read, and packed-repeated-field expansion.

use std::io::{Cursor, Read};

use super::field::{Field, FieldValue, WireType};
use super::primitive::{read_fixed32, read_fixed64, read_varint, zigzag_decode};
use super::PbError;
use crate::inflate;

/// A decoded protocol-buffer message: an ordered sequence of [`Field`]s.
///
/// Ordering matters twice over: repeated fields (regular nodes, ways,
/// string-table entries) must come back out in file order, and "last field
/// with a given number wins" requires knowing which one came last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: Vec<Field>,
}

impl Message {
    /// Reads fields from `r` until exactly `len` bytes have been consumed.
    pub fn read(r: &mut impl Read, len: u64) -> Result<Self, PbError> {
        let mut fields = Vec::new();
        let mut consumed = 0u64;

        while consumed < len {
            let (field, n) = match read_field(r)? {
                Some(pair) => pair,
                None => break,
            };
            fields.push(field);
            consumed += n;
        }

        if consumed != len {
            return Err(PbError::LengthMismatch {
                expected: len,
                got: consumed,
            });
        }

        Ok(Self { fields })
    }

    /// Reads a message from an in-memory buffer (the whole buffer is the message).
    pub fn read_embedded(buf: &[u8]) -> Result<Self, PbError> {
        let mut cursor = Cursor::new(buf);
        Self::read(&mut cursor, buf.len() as u64)
    }

    /// Inflates `buf` as zlib, then reads the result as an embedded message.
    pub fn read_inflated(buf: &[u8]) -> Result<Self, PbError> {
        let decompressed = inflate::inflate(buf)?;
        Self::read_embedded(&decompressed)
    }

    /// Returns the last field with the given `number`, per the PB spec's
    /// "later fields override earlier ones" rule.
    ///
    /// If `expected` is `Some` and the field's wire type doesn't match,
    /// this is a [`PbError::FieldTypeMismatch`], not a silent `None`.
    pub fn get_field(
        &self,
        number: i32,
        expected: Option<WireType>,
    ) -> Result<Option<&Field>, PbError> {
        match self.fields.iter().rev().find(|f| f.number == number) {
            None => Ok(None),
            Some(field) => match expected {
                Some(want) if field.wire_type() != want => Err(PbError::FieldTypeMismatch {
                    number,
                    expected: want,
                    got: field.wire_type(),
                }),
                _ => Ok(Some(field)),
            },
        }
    }

    /// Iterates, in file order, over every field with the given `number`.
    ///
    /// This is the safe-Rust replacement for the original's
    /// `next_field(..., FORWARD_DIR)` walk, used to visit repeated
    /// submessages (regular nodes, ways) in the order they appear on disk.
    pub fn fields(&self, number: i32) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.number == number)
    }

    /// Expands the last packed (`Len`-encoded) field with the given
    /// `number` into its constituent varints.
    ///
    /// OSM PBF packs long parallel arrays (DenseNode id/lat/lon, way refs,
    /// tag key/value indices) as a single `Len` field whose payload is the
    /// concatenation of raw varint encodings. The caller is responsible for
    /// any further zig-zag or delta decoding; this only un-packs the wire
    /// representation into plain values.
    pub fn expand_packed(&self, number: i32) -> Result<Vec<u64>, PbError> {
        let field = match self.get_field(number, Some(WireType::Len))? {
            Some(f) => f,
            None => return Ok(Vec::new()),
        };
        let buf = field
            .value
            .as_len()
            .expect("get_field guaranteed Len wire type");

        let mut cursor = Cursor::new(buf);
        let mut values = Vec::new();
        loop {
            match read_varint(&mut cursor)? {
                Some(v) => values.push(v),
                None => break,
            }
        }
        Ok(values)
    }

    /// Expands a packed field and zig-zag decodes each element.
    pub fn expand_packed_zigzag(&self, number: i32) -> Result<Vec<i64>, PbError> {
        Ok(self
            .expand_packed(number)?
            .into_iter()
            .map(zigzag_decode)
            .collect())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reads a single tag + value pair. Returns `None` only on an immediate,
/// clean end-of-file before the tag varint.
fn read_field(r: &mut impl Read) -> Result<Option<(Field, u64)>, PbError> {
    let tag = match read_varint(r)? {
        Some(t) => t,
        None => return Ok(None),
    };
    let tag_bytes = varint_len(tag);

    let wire_bits = tag & 0x07;
    let number = (tag >> 3) as i32;
    let wire_type = WireType::from_tag_bits(wire_bits).ok_or(PbError::BadWireType(wire_bits))?;
    if number < 1 {
        return Err(PbError::BadWireType(wire_bits));
    }

    let (value, value_bytes) = read_value(r, wire_type)?;
    Ok(Some((
        Field { number, value },
        tag_bytes + value_bytes,
    )))
}

fn read_value(r: &mut impl Read, wire_type: WireType) -> Result<(FieldValue, u64), PbError> {
    match wire_type {
        WireType::Varint => {
            let v = read_varint(r)?.ok_or(PbError::Truncated)?;
            Ok((FieldValue::Varint(v), varint_len(v)))
        }
        WireType::I64 => {
            let v = read_fixed64(r)?;
            Ok((FieldValue::I64(v), 8))
        }
        WireType::I32 => {
            let v = read_fixed32(r)?;
            Ok((FieldValue::I32(v), 4))
        }
        WireType::Len => {
            let len = read_varint(r)?.ok_or(PbError::Truncated)?;
            let len_bytes = varint_len(len);
            let mut buf = vec![0u8; len as usize];
            r.read_exact(&mut buf)?;
            Ok((FieldValue::Len(buf), len_bytes + len))
        }
    }
}

/// Number of bytes a varint occupies on the wire, needed to track how many
/// bytes [`Message::read`] has consumed so far.
fn varint_len(mut v: u64) -> u64 {
    let mut n = 1u64;
    v >>= 7;
    while v != 0 {
        n += 1;
        v >>= 7;
    }
    n
}
