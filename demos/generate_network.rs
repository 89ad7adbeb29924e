//! # `generate_network` Example
//!
//! Generates a periodic fiber network in a 10×10×10 box from 100 Voronoi seeds, adapts its
//! node degrees, anneals its length and angle distributions, and writes the result as plain
//! text files.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --example generate_network -- [OUTPUT_DIR]
//! ```
//!
//! - `OUTPUT_DIR` defaults to the current directory.
//! - `FIBERNET_SEED` overrides the random seed (default 42).
//! - `FIBERNET_SEEDS` overrides the number of Voronoi seeds (default 100).
//! - `RUST_LOG` controls log output (default `warn`; try `RUST_LOG=fibernet=info`).

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fibernet::prelude::*;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn run(output: &Path) -> Result<(), Box<dyn Error>> {
    let seed = env_or("FIBERNET_SEED", 42_u64);
    let seed_count = env_or("FIBERNET_SEEDS", 100_usize);

    let config = GeneratorConfigBuilder::default()
        .box_size([10.0, 10.0, 10.0])
        .seed_count(seed_count)
        .seed(seed)
        .annealing(AnnealingConfig {
            move_policy: MovePolicy::Mixed {
                recombination_probability: 0.2,
            },
            ..AnnealingConfig::default()
        })
        .build()?;

    println!("Generating fiber network: {seed_count} seeds, rng seed {seed}");
    let generated = NetworkGenerator::new(config).generate()?;

    let network = &generated.network;
    println!("  nodes:              {}", network.node_count());
    println!("  fibers:             {}", network.live_edge_count());
    println!("  tracked nodes:      {}", network.tracked_nodes().len());
    println!(
        "  periodic doubles:   {} removed, {} stubs stitched",
        generated.consolidation.duplicate_edges_removed, generated.consolidation.stubs_stitched
    );
    if let Some(valency) = &generated.valency {
        println!(
            "  valency:            +{} / -{} edges (z6 {}, z5 {}, z3 {})",
            valency.edges_added,
            valency.edges_removed,
            valency.degree6_centers,
            valency.degree5_tally,
            valency.degree3_tally
        );
    }
    if let Some(annealing) = &generated.annealing {
        println!(
            "  annealing:          {} iterations, converged: {}, energy {:.4} -> {:.4}",
            annealing.iterations,
            annealing.converged,
            annealing.initial.length_energy + annealing.initial.cosine_energy,
            annealing.last.length_energy + annealing.last.cosine_energy
        );
    }

    std::fs::create_dir_all(output)?;
    for path in write_network_files(output, "network", &generated)? {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let output = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("."), PathBuf::from);

    match run(&output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
