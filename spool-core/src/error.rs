use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("transcript pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Bad budget, empty root, unsupported path. Nothing has been executed.
    #[error("planning error for {}: {reason}", path.display())]
    Planning { path: PathBuf, reason: String },

    /// Spawn failure, non-zero exit or signal while running the archiver.
    #[error("archive {archive} failed: {detail}")]
    Execution { archive: String, detail: String },

    /// More than one success record for the same archive. Needs a human.
    #[error(
        "ledger corruption in {}: archive {archive} has {creates} create and {listings} listing records",
        transcript.display()
    )]
    LedgerCorruption {
        transcript: PathBuf,
        archive: String,
        creates: usize,
        listings: usize,
    },

    #[error("ledger writer is gone")]
    LedgerClosed,
}

impl SpoolError {
    pub fn planning(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SpoolError::Planning {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, SpoolError::LedgerCorruption { .. })
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, SpoolError>;
