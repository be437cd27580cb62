use anyhow::{Context, Result};
use tracing::info;

use formica_engine::{GenomeError, install_genome, load_genome};
use formica_uci::Shell;

/// Default path of the evaluator's weight file.
const GENOME_PATH: &str = "genome.txt";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let genome_path = std::env::args().nth(1).unwrap_or_else(|| GENOME_PATH.to_string());
    match load_genome(&genome_path) {
        Ok(weights) => {
            install_genome(weights).context("installing evaluation weights")?;
            info!(path = %genome_path, "evaluation weights loaded");
        }
        Err(GenomeError::Io { .. }) => {
            info!(path = %genome_path, "no weights file, using built-in evaluation");
        }
        Err(err) => return Err(err).context("reading evaluation weights"),
    }

    info!("formica starting");
    Shell::new().run()?;
    Ok(())
}
