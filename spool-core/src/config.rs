use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SpoolError};

const GIB: u64 = 1024 * 1024 * 1024;

/// What an invocation is allowed to do to the archive and to the sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Plan and report only. Never runs the archiver, appends or deletes.
    #[default]
    DryRun,
    /// Archive what is missing, append transcripts, delete verified sources.
    Commit,
    /// Like `Commit`, but ignores existing verified records and starts each
    /// transcript over.
    Rebuild,
    /// Collect usage numbers and write stub restore scripts. Never archives.
    Survey,
}

impl RunMode {
    /// Whether the archiver may be run and transcripts appended.
    pub fn commits(self) -> bool {
        matches!(self, RunMode::Commit | RunMode::Rebuild)
    }

    pub fn reverifies(self) -> bool {
        matches!(self, RunMode::Rebuild)
    }
}

/// Everything the engine needs to know, passed explicitly to each stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on cumulative bytes per archive.
    pub archive_size: u64,
    /// Number of archives in flight at once.
    pub threads: usize,
    /// Remote namespace prefix archives are written under.
    pub hsi_prefix: String,
    /// Class of service for the archive file.
    pub archive_cos: u32,
    /// Class of service for the index file.
    pub index_cos: u32,
    /// Where manifests and execution logs are staged.
    pub work_dir: PathBuf,
    /// Directory arguments are resolved relative to this.
    pub base_dir: PathBuf,
    pub mode: RunMode,
    /// Keep local files even when every archive verified.
    pub keep_sources: bool,
    /// Treat a directory with nothing to pack as already archived.
    pub empty_is_archived: bool,
    /// Ask the remote side whether a verified archive exists before deleting.
    pub probe_remote: bool,
    /// Pause between create and listing, in seconds.
    pub settle_delay_secs: u64,
    pub htar_path: String,
    pub hsi_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            archive_size: 100 * GIB,
            threads: 4,
            hsi_prefix: "/cryoEM/exp/".to_string(),
            archive_cos: 110,
            index_cos: 110,
            work_dir: std::env::temp_dir(),
            base_dir: PathBuf::from("."),
            mode: RunMode::DryRun,
            keep_sources: false,
            empty_is_archived: false,
            probe_remote: false,
            settle_delay_secs: 3,
            htar_path: "htar".to_string(),
            hsi_path: "hsi".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive_size == 0 {
            return Err(SpoolError::planning(
                &self.base_dir,
                "archive size budget must be greater than zero",
            ));
        }
        if self.threads == 0 {
            return Err(SpoolError::planning(
                &self.base_dir,
                "thread count must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Deletion is only ever carried out by a committing run.
    pub fn may_delete(&self) -> bool {
        self.mode.commits() && !self.keep_sources
    }
}

/// Parse a human size such as `100g`, `512MB`, `10k` or `4096` into bytes.
/// Units are powers of 1024.
pub fn parse_size(s: &str) -> Result<u64> {
    let t = s.trim();
    let split = t
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(t.len());
    let (digits, unit) = t.split_at(split);
    if digits.is_empty() {
        return Err(SpoolError::planning(
            PathBuf::new(),
            format!("malformed size '{s}'"),
        ));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|e| SpoolError::planning(PathBuf::new(), format!("malformed size '{s}': {e}")))?;
    let mult: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => GIB,
        "t" | "tb" => 1024 * GIB,
        other => {
            return Err(SpoolError::planning(
                PathBuf::new(),
                format!("unknown size unit '{other}' in '{s}'"),
            ));
        }
    };
    let bytes = amount
        .checked_mul(mult)
        .ok_or_else(|| SpoolError::planning(PathBuf::new(), format!("size '{s}' overflows")))?;
    if bytes == 0 {
        return Err(SpoolError::planning(
            PathBuf::new(),
            "archive size budget must be greater than zero",
        ));
    }
    Ok(bytes)
}
