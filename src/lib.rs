// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! Reads a binary [OSM PBF](https://wiki.openstreetmap.org/wiki/PBF_Format)
//! extract into an in-memory [`Map`] (a bounding box, a set of nodes, and a
//! set of tagged ways), then exposes a query interface over the result.
//!
//! The hard engineering is the two-layer decoder stack:
//!
//! - [`pb`] is a general-purpose protocol-buffer wire-format decoder: tag/
//!   wire-type parsing, varint and zig-zag decoding, length-delimited
//!   submessages, packed-repeated field expansion, and zlib-inflated
//!   embedded submessages. It has no knowledge of OSM.
//! - [`osmpbf`] is the OSM-specific layer built on top: blob framing,
//!   string-table interning, regular nodes, `DenseNodes`, ways, and
//!   coordinate reconstruction from granularity and offsets.
//!
//! Writing PBF, mutating a loaded [`Map`], and OSM relations, `DenseInfo`,
//! changesets or historical versions are all out of scope. Parsing is never
//! partial: [`osmpbf::load_map`] either returns a fully materialized `Map`
//! or a load failure.
//!
//! # Example
//!
//! ```no_run
//! let file = std::fs::File::open("path/to/extract.osm.pbf").unwrap();
//! let map = pbfmap::osmpbf::load_map(std::io::BufReader::new(file)).unwrap();
//! println!("{} nodes, {} ways", map.num_nodes(), map.num_ways());
//! println!("{}", pbfmap::stairway::stairways_json(&map));
//! ```

mod inflate;
pub mod map;
pub mod osmpbf;
pub mod pb;
pub mod stairway;

pub use map::{BoundingBox, Map, Node, StringTable, Way};
pub use osmpbf::{load_map, OsmError};
pub use stairway::stairways_json;
