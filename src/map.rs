// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The map store and query API (C7): the fully materialized result of a
//! decode, and bounds-checked accessors over it.

/// A bounding box in nanodegrees, as carried by the OSM PBF header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub min_lon: i64,
    pub max_lon: i64,
    pub min_lat: i64,
    pub max_lat: i64,
}

/// A single OSM node: an id and a position in nanodegrees. Node tags are
/// out of scope; only Way tags are resolved through a string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub id: i64,
    pub lat: i64,
    pub lon: i64,
}

/// An ordered list of node references with key/value tags, resolved
/// against one of the [`Map`]'s string tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Way {
    pub id: i64,
    pub refs: Vec<i64>,
    pub keys: Vec<u32>,
    pub vals: Vec<u32>,
    pub string_table_ref: usize,
}

/// A per-block table of byte strings referenced by index from [`Way`] tags.
///
/// OSM tag strings aren't guaranteed to be valid UTF-8 on the wire, so
/// rather than lossily converting to `String`, this store keeps the raw
/// bytes so malformed input is never silently mangled.
/// Index 0 is always the empty-string sentinel required by the OSM PBF
/// format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable(Vec<Vec<u8>>);

impl StringTable {
    pub fn from_entries(entries: Vec<Vec<u8>>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the string at `index`, or `None` if out of range.
    pub fn get(&self, index: u32) -> Option<&[u8]> {
        self.0.get(index as usize).map(Vec::as_slice)
    }
}

/// The fully materialized result of decoding an OSM PBF file.
///
/// Built once by [`crate::osmpbf::load_map`] and immutable thereafter: there
/// are no `&mut` methods, so a `Map` can only ever reflect one consistent
/// decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Map {
    pub bbox: BoundingBox,
    nodes: Vec<Node>,
    ways: Vec<Way>,
    string_tables: Vec<StringTable>,
}

impl Map {
    pub(crate) fn builder(bbox: BoundingBox) -> MapBuilder {
        MapBuilder {
            map: Map {
                bbox,
                nodes: Vec::new(),
                ways: Vec::new(),
                string_tables: Vec::new(),
            },
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_ways(&self) -> usize {
        self.ways.len()
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn way(&self, index: usize) -> Option<&Way> {
        self.ways.get(index)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn ways(&self) -> impl Iterator<Item = &Way> {
        self.ways.iter()
    }

    pub fn string_table(&self, index: usize) -> Option<&StringTable> {
        self.string_tables.get(index)
    }

    /// Finds the first node with the given id, by linear scan.
    pub fn find_node_by_id(&self, id: i64) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Finds the first way with the given id, by linear scan.
    pub fn find_way_by_id(&self, id: i64) -> Option<&Way> {
        self.ways.iter().find(|w| w.id == id)
    }
}

impl Way {
    pub fn num_refs(&self) -> usize {
        self.refs.len()
    }

    pub fn ref_at(&self, index: usize) -> Option<i64> {
        self.refs.get(index).copied()
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Resolves the key at `index` through `map`'s string tables. Returns
    /// `None` if `index` is out of range or the string-table reference is
    /// invalid, rather than panicking; the query API must stay
    /// memory-safe regardless of how many string tables or indices a
    /// malformed decode produced.
    pub fn key<'m>(&self, map: &'m Map, index: usize) -> Option<&'m [u8]> {
        let &key_idx = self.keys.get(index)?;
        map.string_table(self.string_table_ref)?.get(key_idx)
    }

    pub fn value<'m>(&self, map: &'m Map, index: usize) -> Option<&'m [u8]> {
        let &val_idx = self.vals.get(index)?;
        map.string_table(self.string_table_ref)?.get(val_idx)
    }

    /// Returns the value associated with `key`, if this way carries it.
    pub fn tag<'m>(&self, map: &'m Map, key: &[u8]) -> Option<&'m [u8]> {
        (0..self.num_keys()).find_map(|i| {
            if self.key(map, i) == Some(key) {
                self.value(map, i)
            } else {
                None
            }
        })
    }
}

/// Incremental builder used by [`crate::osmpbf`] while decoding; keeps
/// `Map`'s fields private to the rest of the crate so nothing outside the
/// decoder can construct a `Map` with a violated invariant (e.g.
/// mismatched `keys`/`vals` lengths).
pub(crate) struct MapBuilder {
    map: Map,
}

impl MapBuilder {
    pub(crate) fn push_node(&mut self, node: Node) {
        self.map.nodes.push(node);
    }

    pub(crate) fn push_way(&mut self, way: Way) {
        self.map.ways.push(way);
    }

    /// Appends a new string table and returns its 0-based index, which
    /// becomes the `string_table_ref` for every [`Way`] decoded from the
    /// same block.
    pub(crate) fn push_string_table(&mut self, table: StringTable) -> usize {
        self.map.string_tables.push(table);
        self.map.string_tables.len() - 1
    }

    pub(crate) fn finish(self) -> Map {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> Map {
        let mut b = Map::builder(BoundingBox {
            min_lon: -10,
            max_lon: 10,
            min_lat: -5,
            max_lat: 5,
        });
        b.push_node(Node { id: 1, lat: 100, lon: 200 });
        b.push_node(Node { id: 2, lat: 300, lon: 400 });
        let table_ref = b.push_string_table(StringTable::from_entries(vec![
            b"".to_vec(),
            b"highway".to_vec(),
            b"steps".to_vec(),
        ]));
        b.push_way(Way {
            id: 7,
            refs: vec![1, 2],
            keys: vec![1],
            vals: vec![2],
            string_table_ref: table_ref,
        });
        b.finish()
    }

    #[test]
    fn counts_and_indexing() {
        let m = sample_map();
        assert_eq!(m.num_nodes(), 2);
        assert_eq!(m.num_ways(), 1);
        assert_eq!(m.node(0).unwrap().id, 1);
        assert_eq!(m.node(5), None);
        assert_eq!(m.way(5), None);
    }

    #[test]
    fn resolves_tags_through_string_table() {
        let m = sample_map();
        let w = m.way(0).unwrap();
        assert_eq!(w.num_keys(), 1);
        assert_eq!(w.key(&m, 0), Some(&b"highway"[..]));
        assert_eq!(w.value(&m, 0), Some(&b"steps"[..]));
        assert_eq!(w.tag(&m, b"highway"), Some(&b"steps"[..]));
        assert_eq!(w.tag(&m, b"missing"), None);
    }

    #[test]
    fn out_of_range_key_index_is_none_not_panic() {
        let m = sample_map();
        let w = m.way(0).unwrap();
        assert_eq!(w.key(&m, 99), None);
    }

    #[test]
    fn find_by_id() {
        let m = sample_map();
        assert_eq!(m.find_node_by_id(2).unwrap().lon, 400);
        assert_eq!(m.find_node_by_id(999), None);
        assert_eq!(m.find_way_by_id(7).unwrap().id, 7);
    }

    #[test]
    fn bbox_ordering_invariant_holds_for_sample() {
        let m = sample_map();
        let b = m.bbox();
        assert!(b.min_lon <= b.max_lon);
        assert!(b.min_lat <= b.max_lat);
    }
}
