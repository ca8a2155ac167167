//! The transcript is the restore script for a folder with every archiver
//! run appended to it, each line commented out with `#`. It is the only
//! durable state: an archive counts as done when its create and listing
//! success blocks each appear exactly once.

use fs2::FileExt;
use regex::Regex;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use crate::domain::ArchiveStatus;
use crate::error::Result;
use crate::util::line_prefix::LinePrefixer;

/// Bump when the matched text below changes; older transcripts stop parsing.
pub const TRANSCRIPT_FORMAT_VERSION: u32 = 1;

/// The archiver prints this right after each successful step. Appended
/// lines carry the `#` prefix, so that is part of the match.
pub const SUCCESS_SENTINEL: &str = "#HTAR: HTAR SUCCESSFUL";

/// Every appended line starts with this.
pub const LOG_PREFIX: &[u8] = b"#";

pub const SEPARATOR_WIDTH: usize = 80;

pub fn separator() -> String {
    "#".repeat(SEPARATOR_WIDTH)
}

fn create_pattern(archive_path: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r"(?m)Create complete for {}\. (\d+) bytes written for.*\n{}",
        regex::escape(archive_path),
        regex::escape(SUCCESS_SENTINEL)
    ))?)
}

fn listing_pattern(archive_path: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r"(?m)Listing complete for {}, (\d+) files .*\n{}",
        regex::escape(archive_path),
        regex::escape(SUCCESS_SENTINEL)
    ))?)
}

/// Read side: a snapshot of one transcript file.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    path: PathBuf,
    text: String,
}

impl Transcript {
    /// A missing file is an empty transcript: every archive is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::from_text(path, text))
    }

    pub fn from_text(path: &Path, text: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            text: text.into(),
        }
    }

    pub fn exists(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn status(&self, archive_path: &str) -> Result<ArchiveStatus> {
        let creates = create_pattern(archive_path)?.find_iter(&self.text).count();
        if creates == 0 {
            return Ok(ArchiveStatus::Absent);
        }
        let listings = listing_pattern(archive_path)?
            .find_iter(&self.text)
            .count();
        let status = match (creates, listings) {
            (1, 0) => ArchiveStatus::CreatedOnly,
            (1, 1) => ArchiveStatus::Verified,
            (creates, listings) => {
                tracing::warn!(
                    transcript = %self.path.display(),
                    archive = archive_path,
                    creates,
                    listings,
                    "duplicate success records"
                );
                ArchiveStatus::Corrupt { creates, listings }
            }
        };
        Ok(status)
    }

    /// Bytes the archiver reported writing, when exactly one create matched.
    pub fn created_bytes(&self, archive_path: &str) -> Result<Option<u64>> {
        let re = create_pattern(archive_path)?;
        let mut caps = re.captures_iter(&self.text);
        let first = caps.next();
        if caps.next().is_some() {
            return Ok(None);
        }
        Ok(first.and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok()))
    }

    /// Members the listing reported, when exactly one listing matched.
    pub fn listed_files(&self, archive_path: &str) -> Result<Option<u64>> {
        let re = listing_pattern(archive_path)?;
        let mut caps = re.captures_iter(&self.text);
        let first = caps.next();
        if caps.next().is_some() {
            return Ok(None);
        }
        Ok(first.and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok()))
    }
}

/// Held for exactly one append; the lock goes away on drop, error or not.
struct AppendLock<'a> {
    file: &'a File,
}

impl<'a> AppendLock<'a> {
    fn acquire(file: &'a File) -> std::io::Result<Self> {
        FileExt::lock_exclusive(file)?;
        Ok(Self { file })
    }
}

impl Drop for AppendLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            tracing::warn!(error = %e, "failed to release transcript lock");
        }
    }
}

/// Append the log at `log` to `transcript`, commenting out every line and
/// closing with a separator. Returns bytes appended. The lock is held
/// from before the log is opened until return, on every path.
pub fn append_log(transcript: &Path, log: &Path) -> Result<u64> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(transcript)?;
    let _lock = AppendLock::acquire(&file)?;
    let mut src = BufReader::new(File::open(log)?);

    let mut w = LinePrefixer::new(&file, LOG_PREFIX);
    std::io::copy(&mut src, &mut w)?;
    let counted = w.counted;
    let mut out = w.finish()?;
    writeln!(out, "{}", separator())?;
    out.flush()?;
    file.sync_data()?;
    Ok(counted + SEPARATOR_WIDTH as u64 + 1)
}

/// Write side of the ledger as seen by executors.
pub trait TranscriptSink: Send + Sync {
    fn append(&self, transcript: &Path, log: &Path) -> Result<()>;
}

/// Appends in the calling thread, relying on the file lock alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectSink;

impl TranscriptSink for DirectSink {
    fn append(&self, transcript: &Path, log: &Path) -> Result<()> {
        append_log(transcript, log).map(|_| ())
    }
}
