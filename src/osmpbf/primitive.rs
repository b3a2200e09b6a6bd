// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The OSM primitive decoder (C6): regular nodes, DenseNodes and Ways
//! within one `PrimitiveBlock`, plus the per-block string table.

use log::warn;

use super::OsmError;
use crate::map::{MapBuilder, Node, StringTable, Way};
use crate::pb::{Message, WireType};

/// Per-block coordinate reconstruction: `offset + granularity * delta_sum`.
#[derive(Debug, Clone, Copy)]
struct CoordinateConverter {
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
}

impl CoordinateConverter {
    fn from_block(block: &Message) -> Result<Self, OsmError> {
        let granularity = varint_or_default(block, 17, 100)?;
        let lat_offset = varint_or_default(block, 19, 0)?;
        let lon_offset = varint_or_default(block, 20, 0)?;
        Ok(Self {
            granularity,
            lat_offset,
            lon_offset,
        })
    }

    fn lat(&self, accumulated: i64) -> i64 {
        self.lat_offset + self.granularity * accumulated
    }

    fn lon(&self, accumulated: i64) -> i64 {
        self.lon_offset + self.granularity * accumulated
    }
}

fn varint_or_default(block: &Message, number: i32, default: i64) -> Result<i64, OsmError> {
    Ok(block
        .get_field(number, Some(WireType::Varint))?
        .map(|f| f.value.as_varint().expect("checked varint") as i64)
        .unwrap_or(default))
}

/// Decodes one `PrimitiveBlock` message and appends its nodes/ways to the
/// builder. Returns the number of primitive groups this block carried
/// (used only for diagnostics).
pub fn decode_block(builder: &mut MapBuilder, block: &Message) -> Result<usize, OsmError> {
    let converter = CoordinateConverter::from_block(block)?;
    let string_table = decode_string_table(block)?;

    let groups: Vec<&[u8]> = block
        .fields(2)
        .map(|f| f.value.as_len().expect("PrimitiveGroup is LEN"))
        .collect();

    for group_buf in &groups {
        let group = Message::read_embedded(group_buf)?;
        decode_group(builder, &group, converter, &string_table)?;
    }

    Ok(groups.len())
}

fn decode_string_table(block: &Message) -> Result<StringTable, OsmError> {
    let table_buf = block
        .get_field(1, Some(WireType::Len))?
        .ok_or(OsmError::FieldNotFound {
            message: "PrimitiveBlock",
            number: 1,
        })?
        .value
        .as_len()
        .expect("wire type checked by get_field");

    let table_msg = Message::read_embedded(table_buf)?;
    let mut entries = Vec::new();
    for field in table_msg.fields(1) {
        let bytes = field.value.as_len().ok_or(OsmError::FieldTypeMismatch {
            number: 1,
            expected: WireType::Len,
            got: field.wire_type(),
        })?;
        entries.push(bytes.to_vec());
    }

    // The first entry is the index-0 empty-string sentinel required by the
    // format; this is accepted rather than used to reject the block
    // (the original C reader inverted this check).
    Ok(StringTable::from_entries(entries))
}

fn decode_group(
    builder: &mut MapBuilder,
    group: &Message,
    converter: CoordinateConverter,
    string_table: &StringTable,
) -> Result<(), OsmError> {
    let has_nodes = group.get_field(1, None)?.is_some();
    let has_dense = group.get_field(2, None)?.is_some();
    let has_ways = group.get_field(3, None)?.is_some();

    if [has_nodes, has_dense, has_ways]
        .iter()
        .filter(|&&present| present)
        .count()
        > 1
    {
        warn!("PrimitiveGroup carries more than one populated kind; taking the first in priority order");
    }

    if has_nodes {
        decode_plain_nodes(builder, group, converter)?;
    } else if has_dense {
        decode_dense_nodes(builder, group, converter)?;
    } else if has_ways {
        let table_ref = append_table_for_ways(builder, string_table);
        decode_ways(builder, group, table_ref)?;
    }
    // Relations (group field 4) are intentionally never materialized.

    Ok(())
}

/// Appends the block's string table once per group of ways, returning the
/// 0-based index just assigned.
fn append_table_for_ways(builder: &mut MapBuilder, string_table: &StringTable) -> usize {
    builder.push_string_table(string_table.clone())
}

fn decode_plain_nodes(
    builder: &mut MapBuilder,
    group: &Message,
    converter: CoordinateConverter,
) -> Result<(), OsmError> {
    for field in group.fields(1) {
        let buf = field.value.as_len().ok_or(OsmError::FieldTypeMismatch {
            number: 1,
            expected: WireType::Len,
            got: field.wire_type(),
        })?;
        let node_msg = Message::read_embedded(buf)?;

        let id = node_msg
            .get_field(1, Some(WireType::Varint))?
            .ok_or(OsmError::FieldNotFound {
                message: "Node",
                number: 1,
            })?
            .value
            .as_varint()
            .expect("checked varint") as i64;

        // Regular node ids are plain int64, not zig-zagged (unlike
        // DenseNodes' delta-coded ids). lat is field 8, lon is field 9;
        // the original C reader mistakenly read field 8 twice.
        let lat_raw = node_msg
            .get_field(8, Some(WireType::Varint))?
            .ok_or(OsmError::FieldNotFound {
                message: "Node",
                number: 8,
            })?
            .value
            .as_varint()
            .expect("checked varint");
        let lon_raw = node_msg
            .get_field(9, Some(WireType::Varint))?
            .ok_or(OsmError::FieldNotFound {
                message: "Node",
                number: 9,
            })?
            .value
            .as_varint()
            .expect("checked varint");

        let lat = converter.lat(crate::pb::zigzag_decode(lat_raw));
        let lon = converter.lon(crate::pb::zigzag_decode(lon_raw));

        builder.push_node(Node { id, lat, lon });
    }
    Ok(())
}

fn decode_dense_nodes(
    builder: &mut MapBuilder,
    group: &Message,
    converter: CoordinateConverter,
) -> Result<(), OsmError> {
    let dense_buf = group
        .get_field(2, Some(WireType::Len))?
        .ok_or(OsmError::FieldNotFound {
            message: "PrimitiveGroup",
            number: 2,
        })?
        .value
        .as_len()
        .expect("wire type checked by get_field");
    let dense = Message::read_embedded(dense_buf)?;

    let ids = dense.expand_packed(1)?;
    let lats = dense.expand_packed(8)?;
    let lons = dense.expand_packed(9)?;

    if ids.len() != lats.len() || ids.len() != lons.len() {
        return Err(OsmError::MismatchedParallelArrays {
            keys: ids.len(),
            vals: lats.len().min(lons.len()),
        });
    }

    let mut prev_id = 0i64;
    let mut prev_lat = 0i64;
    let mut prev_lon = 0i64;

    for ((id_delta, lat_delta), lon_delta) in ids.into_iter().zip(lats).zip(lons) {
        prev_id += crate::pb::zigzag_decode(id_delta);
        prev_lat += crate::pb::zigzag_decode(lat_delta);
        prev_lon += crate::pb::zigzag_decode(lon_delta);

        builder.push_node(Node {
            id: prev_id,
            lat: converter.lat(prev_lat),
            lon: converter.lon(prev_lon),
        });
    }

    Ok(())
}

fn decode_ways(builder: &mut MapBuilder, group: &Message, table_ref: usize) -> Result<(), OsmError> {
    for field in group.fields(3) {
        let buf = field.value.as_len().ok_or(OsmError::FieldTypeMismatch {
            number: 3,
            expected: WireType::Len,
            got: field.wire_type(),
        })?;
        let way_msg = Message::read_embedded(buf)?;

        let id = way_msg
            .get_field(1, Some(WireType::Varint))?
            .ok_or(OsmError::FieldNotFound {
                message: "Way",
                number: 1,
            })?
            .value
            .as_varint()
            .expect("checked varint") as i64;

        let (keys, vals) = decode_tag_arrays(&way_msg)?;

        let ref_deltas = way_msg.expand_packed_zigzag(8)?;
        let mut refs = Vec::with_capacity(ref_deltas.len());
        let mut prev = 0i64;
        for delta in ref_deltas {
            prev += delta;
            refs.push(prev);
        }

        builder.push_way(Way {
            id,
            refs,
            keys,
            vals,
            string_table_ref: table_ref,
        });
    }
    Ok(())
}

/// Reads `Way.keys` (field 2) and `Way.vals` (field 3) as parallel raw
/// varint streams from their packed `Len` payloads, stopping only when
/// both are simultaneously exhausted.
fn decode_tag_arrays(way_msg: &Message) -> Result<(Vec<u32>, Vec<u32>), OsmError> {
    let keys_buf = way_msg
        .get_field(2, Some(WireType::Len))?
        .map(|f| f.value.as_len().expect("wire type checked").to_vec())
        .unwrap_or_default();
    let vals_buf = way_msg
        .get_field(3, Some(WireType::Len))?
        .map(|f| f.value.as_len().expect("wire type checked").to_vec())
        .unwrap_or_default();

    let mut keys_cursor = std::io::Cursor::new(&keys_buf);
    let mut vals_cursor = std::io::Cursor::new(&vals_buf);

    let mut keys = Vec::new();
    let mut vals = Vec::new();
    loop {
        let key = crate::pb::read_varint(&mut keys_cursor)?;
        let val = crate::pb::read_varint(&mut vals_cursor)?;
        match (key, val) {
            (None, None) => break,
            (Some(k), Some(v)) => {
                keys.push(k as u32);
                vals.push(v as u32);
            }
            _ => {
                return Err(OsmError::MismatchedParallelArrays {
                    keys: keys.len() + key.is_some() as usize,
                    vals: vals.len() + val.is_some() as usize,
                })
            }
        }
    }

    Ok((keys, vals))
}
