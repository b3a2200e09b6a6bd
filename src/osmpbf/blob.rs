// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The OSM blob framer (C5): `size + BlobHeader + Blob` triples, header
//! validation, and dispatch into `OSMData` blocks.
//!
//! Mirrors the familiar `FileBlocks` state machine for reading a stream of
//! blobs (read-header, then read-data-until-eof), but every message read
//! goes through [`crate::pb::Message`] rather than generated protobuf
//! types, since hand-rolling that decode is this crate's reason to exist.

use std::io::Read;

use super::OsmError;
use crate::map::BoundingBox;
use crate::pb::{Message, WireType};

/// Max permitted size for a serialized `BlobHeader` (64 KiB, matching the
/// reference `libosmpbf` implementations).
const MAX_BLOB_HEADER_SIZE: u32 = 64 * 1024;

/// Max permitted size for a decompressed `Blob` (32 MiB).
const MAX_BLOB_SIZE: u32 = 32 * 1024 * 1024;

/// OSM PBF required-feature strings this reader understands. Anything else
/// in `HeaderBlock.required_features` makes the file unreadable by this
/// crate's subset of the format.
const KNOWN_FEATURES: [&str; 2] = ["OsmSchema-V0.6", "DenseNodes"];

/// Reads the `size + BlobHeader + Blob` stream of an OSM PBF file.
pub struct BlobReader<R: Read> {
    reader: R,
}

impl<R: Read> BlobReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the first blob pair, which must be an `OSMHeader` carrying the
    /// file's bounding box, and returns it.
    pub fn read_header(&mut self) -> Result<BoundingBox, OsmError> {
        let header_size = self
            .read_blob_header_size()?
            .ok_or(OsmError::MissingHeader)?;
        let blob_header = self.read_blob_header(header_size)?;
        self.check_blob_type(&blob_header, "OSMHeader")?;

        let datasize = blob_header_datasize(&blob_header)?;
        let header_block = self.read_blob(datasize)?;
        check_required_features(&header_block)?;

        let bbox_buf = header_block
            .get_field(1, Some(WireType::Len))?
            .ok_or(OsmError::FieldNotFound {
                message: "HeaderBlock",
                number: 1,
            })?
            .value
            .as_len()
            .expect("wire type checked by get_field");
        let bbox_msg = Message::read_embedded(bbox_buf)?;
        read_bbox(&bbox_msg)
    }

    /// Reads the next `OSMData` block, inflated into a `PrimitiveBlock`
    /// message. Returns `Ok(None)` on a clean end-of-file between blobs.
    pub fn next_block(&mut self) -> Result<Option<Message>, OsmError> {
        let header_size = match self.read_blob_header_size()? {
            Some(size) => size,
            None => return Ok(None),
        };
        let blob_header = self.read_blob_header(header_size)?;
        self.check_blob_type(&blob_header, "OSMData")?;

        let datasize = blob_header_datasize(&blob_header)?;
        let block = self.read_blob(datasize)?;
        Ok(Some(block))
    }

    fn read_blob_header_size(&mut self) -> Result<Option<u32>, OsmError> {
        Ok(crate::pb::read_length_prefix(&mut self.reader)?)
    }

    fn read_blob_header(&mut self, size: u32) -> Result<Message, OsmError> {
        if size > MAX_BLOB_HEADER_SIZE {
            return Err(OsmError::BlobHeaderTooLarge(size));
        }
        let mut buf = vec![0u8; size as usize];
        self.reader.read_exact(&mut buf)?;
        Ok(Message::read_embedded(&buf)?)
    }

    /// Reads the `Blob` that follows a `BlobHeader` and returns its
    /// decompressed contents, already parsed as a [`Message`].
    fn read_blob(&mut self, datasize: u32) -> Result<Message, OsmError> {
        let mut buf = vec![0u8; datasize as usize];
        self.reader.read_exact(&mut buf)?;
        let blob = Message::read_embedded(&buf)?;

        if let Some(raw_size) = blob.get_field(2, Some(WireType::Varint))? {
            let raw_size = raw_size.value.as_varint().expect("checked varint");
            if raw_size > MAX_BLOB_SIZE as u64 {
                return Err(OsmError::BlobTooLarge(raw_size as u32));
            }
        }

        // Only zlib-compressed data (field 3) is supported, per spec.
        // Field 1 (raw) and any other compression variant are rejected.
        if blob.get_field(1, None)?.is_some() {
            return Err(OsmError::UnsupportedCompression("raw"));
        }
        for (field_number, name) in [(4, "lzma"), (5, "OBSOLETE_bzip2"), (6, "lz4"), (7, "zstd")] {
            if blob.get_field(field_number, None)?.is_some() {
                return Err(OsmError::UnsupportedCompression(name));
            }
        }

        let zlib_field = blob
            .get_field(3, Some(WireType::Len))?
            .ok_or(OsmError::FieldNotFound {
                message: "Blob",
                number: 3,
            })?
            .value
            .as_len()
            .expect("wire type checked by get_field");

        Ok(Message::read_inflated(zlib_field)?)
    }

    fn check_blob_type(&self, blob_header: &Message, expected: &'static str) -> Result<(), OsmError> {
        let type_field = blob_header
            .get_field(1, Some(WireType::Len))?
            .ok_or(OsmError::FieldNotFound {
                message: "BlobHeader",
                number: 1,
            })?
            .value
            .as_len()
            .expect("wire type checked by get_field");
        let got = String::from_utf8_lossy(type_field).into_owned();
        if got != expected {
            return Err(OsmError::UnexpectedBlobType { got, expected });
        }
        Ok(())
    }
}

fn blob_header_datasize(blob_header: &Message) -> Result<u32, OsmError> {
    let field = blob_header
        .get_field(3, Some(WireType::Varint))?
        .ok_or(OsmError::FieldNotFound {
            message: "BlobHeader",
            number: 3,
        })?;
    Ok(field.value.as_varint().expect("checked varint") as u32)
}

fn check_required_features(header_block: &Message) -> Result<(), OsmError> {
    let mut unknown = Vec::new();
    for field in header_block.fields(4) {
        let bytes = field.value.as_len().ok_or(OsmError::FieldNotFound {
            message: "HeaderBlock.required_features",
            number: 4,
        })?;
        let feature = String::from_utf8_lossy(bytes).into_owned();
        if !KNOWN_FEATURES.contains(&feature.as_str()) {
            unknown.push(feature);
        }
    }
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(OsmError::UnsupportedFeatures(unknown))
    }
}

/// Reads the four zig-zag varint children of `HeaderBBox` (field 1 of
/// `HeaderBlock`): min_lon, max_lon, min_lat, max_lat at fields 1..4.
fn read_bbox(bbox_msg: &Message) -> Result<BoundingBox, OsmError> {
    let mut coords = [0i64; 4];
    for (i, slot) in coords.iter_mut().enumerate() {
        let field = bbox_msg
            .get_field((i + 1) as i32, Some(WireType::Varint))?
            .ok_or(OsmError::FieldNotFound {
                message: "HeaderBBox",
                number: (i + 1) as i32,
            })?;
        let raw = field.value.as_varint().expect("checked varint");
        *slot = crate::pb::zigzag_decode(raw);
    }
    Ok(BoundingBox {
        min_lon: coords[0],
        max_lon: coords[1],
        min_lat: coords[2],
        max_lat: coords[3],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn encode_varint(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let mut b = (v & 0x7F) as u8;
            v >>= 7;
            if v != 0 {
                b |= 0x80;
            }
            out.push(b);
            if v == 0 {
                break;
            }
        }
    }

    fn field_tag(number: i32, wire_type: u64, out: &mut Vec<u8>) {
        encode_varint(((number as u64) << 3) | wire_type, out);
    }

    fn len_field(number: i32, payload: &[u8], out: &mut Vec<u8>) {
        field_tag(number, 2, out);
        encode_varint(payload.len() as u64, out);
        out.extend_from_slice(payload);
    }

    fn varint_field(number: i32, value: u64, out: &mut Vec<u8>) {
        field_tag(number, 0, out);
        encode_varint(value, out);
    }

    fn zigzag_encode(n: i64) -> u64 {
        ((n << 1) ^ (n >> 63)) as u64
    }

    fn build_file_with_empty_block() -> Vec<u8> {
        // HeaderBBox: min_lon=-10, max_lon=10, min_lat=-5, max_lat=5
        let mut bbox = Vec::new();
        varint_field(1, zigzag_encode(-10), &mut bbox);
        varint_field(2, zigzag_encode(10), &mut bbox);
        varint_field(3, zigzag_encode(-5), &mut bbox);
        varint_field(4, zigzag_encode(5), &mut bbox);

        let mut header_block = Vec::new();
        len_field(1, &bbox, &mut header_block);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&header_block).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut blob = Vec::new();
        varint_field(2, header_block.len() as u64, &mut blob);
        len_field(3, &compressed, &mut blob);

        let mut blob_header = Vec::new();
        len_field(1, b"OSMHeader", &mut blob_header);
        varint_field(3, blob.len() as u64, &mut blob_header);

        let mut file = Vec::new();
        file.extend_from_slice(&(blob_header.len() as u32).to_be_bytes());
        file.extend_from_slice(&blob_header);
        file.extend_from_slice(&blob);
        file
    }

    #[test]
    fn reads_header_bbox() {
        let file = build_file_with_empty_block();
        let mut reader = BlobReader::new(Cursor::new(file));
        let bbox = reader.read_header().unwrap();
        assert_eq!(bbox, BoundingBox { min_lon: -10, max_lon: 10, min_lat: -5, max_lat: 5 });
    }

    #[test]
    fn clean_eof_after_header_yields_no_blocks() {
        let file = build_file_with_empty_block();
        let mut reader = BlobReader::new(Cursor::new(file));
        reader.read_header().unwrap();
        assert!(reader.next_block().unwrap().is_none());
    }

    #[test]
    fn missing_header_on_empty_file() {
        let mut reader = BlobReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(reader.read_header(), Err(OsmError::MissingHeader)));
    }

    #[test]
    fn wrong_blob_type_errors() {
        let mut blob_header = Vec::new();
        len_field(1, b"OSMData", &mut blob_header);
        varint_field(3, 0, &mut blob_header);

        let mut file = Vec::new();
        file.extend_from_slice(&(blob_header.len() as u32).to_be_bytes());
        file.extend_from_slice(&blob_header);

        let mut reader = BlobReader::new(Cursor::new(file));
        assert!(matches!(
            reader.read_header(),
            Err(OsmError::UnexpectedBlobType { .. })
        ));
    }
}
