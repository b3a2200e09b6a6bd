// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

//! The stairway JSON emitter (C8): every way tagged `highway=steps`,
//! dereferenced into its node coordinates.

use serde::Serialize;

use crate::map::Map;

#[derive(Serialize)]
struct RefOut {
    id: i64,
    lat: i64,
    lon: i64,
}

#[derive(Serialize)]
struct WayOut {
    way_id: i64,
    refs: Vec<RefOut>,
}

/// Builds the JSON array of pedestrian-stairway ways in `map`.
///
/// A ref whose node can't be found in `map` is emitted with `lat: 0, lon: 0`
/// rather than aborting the whole output; one missing node must not hide
/// every other stairway in the file.
pub fn stairways_json(map: &Map) -> String {
    let ways: Vec<WayOut> = map
        .ways()
        .filter(|w| w.tag(map, b"highway") == Some(b"steps"))
        .map(|w| WayOut {
            way_id: w.id,
            refs: (0..w.num_refs())
                .map(|i| {
                    let ref_id = w.ref_at(i).expect("index bounded by num_refs");
                    match map.find_node_by_id(ref_id) {
                        Some(node) => RefOut {
                            id: ref_id,
                            lat: node.lat,
                            lon: node.lon,
                        },
                        None => RefOut {
                            id: ref_id,
                            lat: 0,
                            lon: 0,
                        },
                    }
                })
                .collect(),
        })
        .collect();

    serde_json::to_string_pretty(&ways).expect("WayOut/RefOut serialization cannot fail")
}
