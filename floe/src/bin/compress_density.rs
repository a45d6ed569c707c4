// SPDX-License-Identifier: AGPL-3.0-only

//! Density-adaptive compression driver.
//!
//! Runs the full pipeline over one JSON configuration file, SPMD across
//! however many ranks the MPI launcher provides:
//!
//! ```text
//! mpirun -n 4 compress_density run.json
//! ```
//!
//! Exit code 0 on success; on any failure the offending rank prints one
//! structured line on stderr and aborts the communicator.

use std::path::PathBuf;
use std::process;

use mpi::traits::Communicator;
use packice_floe::comm::Collective;
use packice_floe::{DensityPipeline, MpiComm, RunConfig};

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: compress_density <config.json>");
        process::exit(2);
    };

    let Some(universe) = mpi::initialize() else {
        eprintln!("failed to initialize the MPI runtime");
        process::exit(1);
    };
    let comm = MpiComm::new(universe.world());
    let rank = comm.rank();
    let master = comm.is_root();

    if master {
        println!("═══════════════════════════════════════════════════════");
        println!("  floe — density-adaptive snapshot compression");
        println!("  config: '{}'", config_path.display());
        println!("═══════════════════════════════════════════════════════");
    }

    let result = RunConfig::from_path(&config_path)
        .and_then(|config| DensityPipeline::new(config, comm))
        .and_then(DensityPipeline::run);

    match result {
        Ok(summary) => {
            if master {
                println!("  ── Summary ──");
                println!("    {} particles, {} bins", summary.total_particles, summary.nb_bins);
                println!("    raw: {} B, lossy: {} B", summary.raw_bytes, summary.lossy_bytes);
                if summary.lossy_bytes > 0 {
                    println!(
                        "    compression: x{:.3}",
                        summary.raw_bytes as f64 / summary.lossy_bytes as f64
                    );
                }
                if let Some(lossless) = summary.lossless_bytes {
                    println!("    lossless: {lossless} B");
                }
            }
        }
        Err(err) => {
            eprintln!("rank[{rank}] {}: {err}", err.kind());
            // A single-rank abort brings down the peers; there is no
            // application-level rendezvous on failure.
            universe.world().abort(1);
        }
    }
}
