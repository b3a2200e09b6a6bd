// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! A general-purpose protocol-buffer wire-format decoder.
//!
//! This module knows nothing about OSM: tag/wire-type parsing, varint and
//! zig-zag decoding, length-delimited submessages, packed-repeated field
//! expansion and zlib-inflated embedded submessages are all implemented
//! here exactly as the protobuf wire format defines them. The OSM-specific
//! layer lives in [`crate::osmpbf`], built entirely on top of this module.

mod field;
mod message;
mod primitive;

pub use field::{Field, FieldValue, WireType};
pub use message::Message;
pub use primitive::{
    read_fixed32, read_fixed64, read_length_prefix, read_varint, zigzag_decode, zigzag_encode,
};

use std::io;

/// Errors which can occur while decoding the protocol-buffer wire format.
#[derive(Debug, thiserror::Error)]
pub enum PbError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("truncated varint")]
    Truncated,

    #[error("varint exceeds maximum width")]
    OverlongVarint,

    #[error("unsupported wire type bits: {0}")]
    BadWireType(u64),

    #[error("field {number}: expected wire type {expected}, got {got}")]
    FieldTypeMismatch {
        number: i32,
        expected: WireType,
        got: WireType,
    },

    #[error("zlib inflate failed: {0}")]
    InflateFailed(String),

    #[error("message declared {expected} bytes, consumed {got}")]
    LengthMismatch { expected: u64, got: u64 },
}
