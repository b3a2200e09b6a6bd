// (c) Copyright 2025 pbfmap contributors
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

/// Reads an OSM PBF extract and reports its node/way counts, or emits the
/// `highway=steps` ways as JSON.
#[derive(Parser)]
struct Cli {
    /// Path to the .osm.pbf file to read
    pbf_file: PathBuf,

    /// Write the highway=steps ways (as JSON) to this path instead of
    /// printing the node/way counts
    #[arg(long)]
    json: Option<PathBuf>,
}

pub fn main() -> ExitCode {
    colog::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(&cli.pbf_file)?;
    let map = pbfmap::load_map(BufReader::new(file))?;

    match &cli.json {
        Some(path) => {
            let json = pbfmap::stairways_json(&map);
            std::fs::write(path, json)?;
        }
        None => {
            println!("Nodes: {}", map.num_nodes());
            println!("Ways: {}", map.num_ways());
        }
    }

    Ok(())
}
