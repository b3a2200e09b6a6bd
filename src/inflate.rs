// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The inflater bridge (C2): inflate a zlib byte range into a freshly
//! allocated buffer. No streaming or partial inflate is exposed, every
//! call to [`inflate`] either returns the whole decompressed buffer or an
//! error.

use std::io::Read;

use crate::pb::PbError;

/// Inflates `data` as a zlib stream and returns the decompressed bytes.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, PbError> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PbError::InflateFailed(e.to_string()))?;
    Ok(out)
}
