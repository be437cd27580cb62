//! Genome loading: the evaluator's weight vector.
//!
//! Weights are read once at startup from a newline-separated text file and
//! installed into a process-wide immutable singleton before any worker
//! thread exists. Layout: 6 piece values followed by 6×64 piece-square
//! entries (White perspective, rank 1 first).

use std::path::Path;
use std::sync::OnceLock;

use tracing::info;

use crate::eval::{material, pst};

/// Number of weights a complete genome carries.
pub const GENOME_LEN: usize = 6 + 6 * 64;

/// Resolved evaluation parameters.
pub(crate) struct EvalParams {
    pub values: [i32; 6],
    pub tables: [[i32; 64]; 6],
}

static PARAMS: OnceLock<EvalParams> = OnceLock::new();

/// Errors from reading or installing a genome file.
#[derive(Debug, thiserror::Error)]
pub enum GenomeError {
    /// The file could not be read.
    #[error("failed to read weights file {path}: {source}")]
    Io {
        /// Path of the weights file.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line did not parse as a float.
    #[error("invalid weight on line {line}: \"{value}\"")]
    Parse {
        /// One-based line number.
        line: usize,
        /// The offending line content.
        value: String,
    },

    /// The file holds fewer weights than the layout requires.
    #[error("expected {GENOME_LEN} weights, found {found}")]
    TooShort {
        /// Number of weights found.
        found: usize,
    },
}

/// Read a newline-separated weight file. Blank lines are skipped.
pub fn load_genome(path: impl AsRef<Path>) -> Result<Vec<f32>, GenomeError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| GenomeError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut weights = Vec::with_capacity(GENOME_LEN);
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: f32 = line.parse().map_err(|_| GenomeError::Parse {
            line: i + 1,
            value: line.to_string(),
        })?;
        weights.push(value);
    }
    Ok(weights)
}

/// Install a genome as the process-wide evaluation parameters.
///
/// Must be called before any search starts; a second call (or a call after
/// the defaults were already resolved) is ignored.
pub fn install_genome(weights: Vec<f32>) -> Result<(), GenomeError> {
    if weights.len() < GENOME_LEN {
        return Err(GenomeError::TooShort {
            found: weights.len(),
        });
    }

    let mut values = [0i32; 6];
    for (i, v) in values.iter_mut().enumerate() {
        *v = weights[i] as i32;
    }
    let mut tables = [[0i32; 64]; 6];
    for (kind, table) in tables.iter_mut().enumerate() {
        for (sq, cell) in table.iter_mut().enumerate() {
            *cell = weights[6 + kind * 64 + sq] as i32;
        }
    }

    let installed = PARAMS.set(EvalParams { values, tables }).is_ok();
    if installed {
        info!(weights = weights.len(), "genome installed");
    }
    Ok(())
}

/// The active evaluation parameters, defaulting to the built-in tables.
pub(crate) fn params() -> &'static EvalParams {
    PARAMS.get_or_init(|| EvalParams {
        values: material::PIECE_VALUES,
        tables: pst::TABLES,
    })
}
