use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures the engine can hit. All of them are fatal for the partition
/// being processed; intermediate files are left behind for inspection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The bit stream ended in the middle of a record.
    #[error("{path}: super-mer stream truncated mid-record")]
    Truncated { path: PathBuf },

    /// Decoded data disagrees with the header bookkeeping
    /// (e.g. bucket counts vs. the first-byte histogram).
    #[error("structural mismatch: {0}")]
    Structural(String),

    /// Rejected configuration, reported before any phase runs.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
