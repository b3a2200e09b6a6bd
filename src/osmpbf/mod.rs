// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The OSM-specific layer built on top of [`crate::pb`]: blob framing,
//! string-table interning, regular/dense nodes, ways, and coordinate
//! reconstruction, everything needed to turn a byte stream into a
//! [`crate::map::Map`].

mod blob;
mod primitive;

use std::io::Read;

use log::debug;

use crate::map::Map;
use crate::pb::PbError;

use blob::BlobReader;

/// Errors which can occur while decoding an OSM PBF file, layered on top of
/// [`PbError`] with the OSM-specific failure modes: blob framing, required
/// features, and parallel-array consistency.
#[derive(Debug, thiserror::Error)]
pub enum OsmError {
    #[error(transparent)]
    Pb(#[from] PbError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("file has no OSMHeader blob")]
    MissingHeader,

    #[error("BlobHeader too large: {0} > 64 KiB")]
    BlobHeaderTooLarge(u32),

    #[error("Blob too large: {0} > 32 MiB")]
    BlobTooLarge(u32),

    #[error("BlobHeader.type: got {got:?}, expected {expected:?}")]
    UnexpectedBlobType { got: String, expected: &'static str },

    #[error("unsupported compression: {0} (only zlib is supported)")]
    UnsupportedCompression(&'static str),

    #[error("{message} missing required field {number}")]
    FieldNotFound {
        message: &'static str,
        number: i32,
    },

    #[error("field {number}: expected wire type {expected}, got {got}")]
    FieldTypeMismatch {
        number: i32,
        expected: crate::pb::WireType,
        got: crate::pb::WireType,
    },

    #[error("parallel arrays of different lengths: {keys} != {vals}")]
    MismatchedParallelArrays { keys: usize, vals: usize },

    #[error("file requires unsupported features: {0:?}")]
    UnsupportedFeatures(Vec<String>),
}

/// Decodes an entire OSM PBF file from `reader` into a [`Map`].
///
/// Fails fast: the first structural error anywhere aborts the decode and no
/// partial `Map` is returned. A clean end-of-file at a blob boundary is the
/// only way the block loop ends successfully.
pub fn load_map(reader: impl Read) -> Result<Map, OsmError> {
    let mut blobs = BlobReader::new(reader);
    let bbox = blobs.read_header()?;
    debug!("read OSMHeader, bbox = {:?}", bbox);

    let mut builder = Map::builder(bbox);
    let mut block_count = 0usize;

    while let Some(block) = blobs.next_block()? {
        let groups = primitive::decode_block(&mut builder, &block)?;
        block_count += 1;
        debug!("decoded block {block_count} with {groups} primitive group(s)");
    }

    let map = builder.finish();
    debug!(
        "decode complete: {} nodes, {} ways",
        map.num_nodes(),
        map.num_ways()
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::BoundingBox;
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

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn header_blob_pair() -> Vec<u8> {
        let mut bbox = Vec::new();
        varint_field(1, zigzag_encode(-10), &mut bbox);
        varint_field(2, zigzag_encode(10), &mut bbox);
        varint_field(3, zigzag_encode(-5), &mut bbox);
        varint_field(4, zigzag_encode(5), &mut bbox);

        let mut header_block = Vec::new();
        len_field(1, &bbox, &mut header_block);
        let compressed = zlib(&header_block);

        let mut blob = Vec::new();
        varint_field(2, header_block.len() as u64, &mut blob);
        len_field(3, &compressed, &mut blob);

        let mut blob_header = Vec::new();
        len_field(1, b"OSMHeader", &mut blob_header);
        varint_field(3, blob.len() as u64, &mut blob_header);

        let mut out = Vec::new();
        out.extend_from_slice(&(blob_header.len() as u32).to_be_bytes());
        out.extend_from_slice(&blob_header);
        out.extend_from_slice(&blob);
        out
    }

    fn data_blob_pair(primitive_block: &[u8]) -> Vec<u8> {
        let compressed = zlib(primitive_block);

        let mut blob = Vec::new();
        varint_field(2, primitive_block.len() as u64, &mut blob);
        len_field(3, &compressed, &mut blob);

        let mut blob_header = Vec::new();
        len_field(1, b"OSMData", &mut blob_header);
        varint_field(3, blob.len() as u64, &mut blob_header);

        let mut out = Vec::new();
        out.extend_from_slice(&(blob_header.len() as u32).to_be_bytes());
        out.extend_from_slice(&blob_header);
        out.extend_from_slice(&blob);
        out
    }

    fn string_table(entries: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for e in entries {
            len_field(1, e, &mut buf);
        }
        buf
    }

    /// Scenario 1: header followed by clean EOF yields an empty map with
    /// the header's bbox.
    #[test]
    fn empty_blob_stream_after_header() {
        let file = header_blob_pair();
        let map = load_map(Cursor::new(file)).unwrap();
        assert_eq!(map.num_nodes(), 0);
        assert_eq!(map.num_ways(), 0);
        assert_eq!(
            map.bbox(),
            BoundingBox { min_lon: -10, max_lon: 10, min_lat: -5, max_lat: 5 }
        );
    }

    /// Scenario 2: a single regular node reconstructs to id=42, lat=100, lon=200.
    #[test]
    fn single_regular_node() {
        let mut node = Vec::new();
        varint_field(1, 42, &mut node);
        varint_field(8, zigzag_encode(1), &mut node); // lat raw -> 1 after zigzag
        varint_field(9, zigzag_encode(2), &mut node); // lon raw -> 2 after zigzag

        let mut group = Vec::new();
        len_field(1, &node, &mut group);

        let mut block = Vec::new();
        len_field(1, &string_table(&[b""]), &mut block);
        len_field(2, &group, &mut block);

        let mut file = header_blob_pair();
        file.extend(data_blob_pair(&block));

        let map = load_map(Cursor::new(file)).unwrap();
        assert_eq!(map.num_nodes(), 1);
        let n = map.node(0).unwrap();
        assert_eq!(n.id, 42);
        assert_eq!(n.lat, 100);
        assert_eq!(n.lon, 200);
    }

    /// Scenario 3: three DenseNodes entries with identical per-step deltas
    /// accumulate the running sum correctly.
    #[test]
    fn dense_nodes_delta_accumulation() {
        let mut packed_ids = Vec::new();
        for _ in 0..3 {
            encode_varint(zigzag_encode(1), &mut packed_ids);
        }
        let mut packed_lats = Vec::new();
        encode_varint(zigzag_encode(20), &mut packed_lats);
        encode_varint(zigzag_encode(0), &mut packed_lats);
        encode_varint(zigzag_encode(0), &mut packed_lats);
        let mut packed_lons = packed_lats.clone();

        let mut dense = Vec::new();
        len_field(1, &packed_ids, &mut dense);
        len_field(8, &packed_lats, &mut dense);
        len_field(9, &packed_lons, &mut dense);

        let mut group = Vec::new();
        len_field(2, &dense, &mut group);

        let mut block = Vec::new();
        len_field(1, &string_table(&[b""]), &mut block);
        len_field(2, &group, &mut block);

        let mut file = header_blob_pair();
        file.extend(data_blob_pair(&block));

        let map = load_map(Cursor::new(file)).unwrap();
        assert_eq!(map.num_nodes(), 3);
        for (i, expected_id) in [1i64, 2, 3].into_iter().enumerate() {
            let n = map.node(i).unwrap();
            assert_eq!(n.id, expected_id);
            assert_eq!(n.lat, 10 * 100);
            assert_eq!(n.lon, 10 * 100);
        }
    }

    /// Scenario 4: a way with two tags resolves through the string table.
    #[test]
    fn way_with_tags() {
        let mut refs = Vec::new();
        encode_varint(zigzag_encode(1), &mut refs);
        encode_varint(zigzag_encode(1), &mut refs); // delta +1 -> ref 2

        let mut keys = Vec::new();
        encode_varint(1, &mut keys);
        encode_varint(3, &mut keys);
        let mut vals = Vec::new();
        encode_varint(2, &mut vals);
        encode_varint(4, &mut vals);

        let mut way = Vec::new();
        varint_field(1, 7, &mut way);
        len_field(2, &keys, &mut way);
        len_field(3, &vals, &mut way);
        len_field(8, &refs, &mut way);

        let mut group = Vec::new();
        len_field(3, &way, &mut group);

        let mut block = Vec::new();
        len_field(
            1,
            &string_table(&[b"", b"highway", b"steps", b"name", b"Main"]),
            &mut block,
        );
        len_field(2, &group, &mut block);

        let mut file = header_blob_pair();
        file.extend(data_blob_pair(&block));

        let map = load_map(Cursor::new(file)).unwrap();
        assert_eq!(map.num_ways(), 1);
        let w = map.way(0).unwrap();
        assert_eq!(w.id, 7);
        assert_eq!(w.num_keys(), 2);
        assert_eq!(w.key(&map, 0), Some(&b"highway"[..]));
        assert_eq!(w.value(&map, 0), Some(&b"steps"[..]));
        assert_eq!(w.key(&map, 1), Some(&b"name"[..]));
        assert_eq!(w.value(&map, 1), Some(&b"Main"[..]));
        assert_eq!(w.refs, vec![1, 2]);
    }

    /// Scenario 6: a LEN field whose declared length exceeds the
    /// remaining blob yields a load failure rather than a partial map.
    #[test]
    fn truncated_len_field_is_a_load_failure() {
        let mut node = Vec::new();
        field_tag(1, 2, &mut node); // LEN wire type
        encode_varint(1000, &mut node); // declared length, no payload follows

        let mut group = Vec::new();
        len_field(1, &node, &mut group);

        let mut block = Vec::new();
        len_field(1, &string_table(&[b""]), &mut block);
        len_field(2, &group, &mut block);

        let mut file = header_blob_pair();
        file.extend(data_blob_pair(&block));

        assert!(load_map(Cursor::new(file)).is_err());
    }
}
