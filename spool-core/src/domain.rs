use std::fmt;
use std::path::{Path, PathBuf};

/// One enumerated member candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// One archive unit: a manifest of members and where they go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupPlan {
    pub group_index: usize,
    /// `<folder>.<n>.tar`
    pub archive_name: String,
    /// Remote location, e.g. `/cryoEM/exp/2024-C1/sample/raw.0.tar`.
    pub archive_path: String,
    /// Member paths relative to `working_dir`, one per line.
    pub manifest_path: PathBuf,
    /// Transient execution log, removed once appended.
    pub log_path: PathBuf,
    /// Restore script plus appended execution logs for the whole folder.
    pub transcript_path: PathBuf,
    /// Directory the archiver runs in.
    pub working_dir: PathBuf,
    /// Local folder the members come from.
    pub folder: PathBuf,
    pub members: usize,
    pub bytes: u64,
}

impl GroupPlan {
    pub fn transcript(&self) -> &Path {
        &self.transcript_path
    }

    /// Remove the staged manifest. Missing files are fine.
    pub fn discard_manifest(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.manifest_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// What a transcript says about one archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveStatus {
    Absent,
    /// Created but never listed back; retried with the full pair. The retry
    /// adds a second create record, so the archive then reads as `Corrupt`
    /// until a rebuild starts the transcript over.
    CreatedOnly,
    Verified,
    Corrupt { creates: usize, listings: usize },
}

impl ArchiveStatus {
    pub fn is_verified(self) -> bool {
        matches!(self, ArchiveStatus::Verified)
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveStatus::Absent => f.write_str("absent"),
            ArchiveStatus::CreatedOnly => f.write_str("created-only"),
            ArchiveStatus::Verified => f.write_str("verified"),
            ArchiveStatus::Corrupt { creates, listings } => {
                write!(f, "corrupt ({creates} creates, {listings} listings)")
            }
        }
    }
}
