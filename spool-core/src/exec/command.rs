//! How the external archiver is invoked. The engine only ever looks at the
//! exit status and the captured text of these commands.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;

/// A program with arguments, optionally run in a given directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Shell-readable single line, for logs and the restore script.
    pub fn render(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-:=+,@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Builds the archiver command lines for one backend.
pub trait ArchiverTemplate: Send + Sync {
    /// Write the members listed in `manifest` (relative to `working_dir`)
    /// into a new archive at `archive_path`.
    fn create(&self, working_dir: &Path, manifest: &Path, archive_path: &str) -> Invocation;
    /// Read back the table of contents of a freshly written archive.
    fn list(&self, archive_path: &str) -> Invocation;
    /// Restore command, only ever written into restore scripts.
    fn extract(&self, archive_path: &str) -> Invocation;
    /// Make sure a remote directory exists.
    fn mkdir(&self, remote_dir: &str) -> Invocation;
    /// Succeeds iff the remote archive exists.
    fn probe(&self, archive_path: &str) -> Invocation;
}

/// `htar` for archives, `hsi` for namespace operations.
#[derive(Clone, Debug)]
pub struct HtarTemplate {
    pub htar: String,
    pub hsi: String,
    pub archive_cos: u32,
    pub index_cos: u32,
}

impl Default for HtarTemplate {
    fn default() -> Self {
        Self {
            htar: "htar".into(),
            hsi: "hsi".into(),
            archive_cos: 110,
            index_cos: 110,
        }
    }
}

impl HtarTemplate {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            htar: cfg.htar_path.clone(),
            hsi: cfg.hsi_path.clone(),
            archive_cos: cfg.archive_cos,
            index_cos: cfg.index_cos,
        }
    }
}

impl ArchiverTemplate for HtarTemplate {
    fn create(&self, working_dir: &Path, manifest: &Path, archive_path: &str) -> Invocation {
        Invocation::new(
            &self.htar,
            [
                "-Hcrc".to_string(),
                "-Hnoglob".to_string(),
                "-p".to_string(),
                "-cvf".to_string(),
                archive_path.to_string(),
                "-L".to_string(),
                manifest.to_string_lossy().into_owned(),
                "-Y".to_string(),
                format!("{}:{}", self.archive_cos, self.index_cos),
            ],
        )
        .in_dir(working_dir)
    }

    fn list(&self, archive_path: &str) -> Invocation {
        Invocation::new(&self.htar, ["-tv", "-f", archive_path])
    }

    fn extract(&self, archive_path: &str) -> Invocation {
        Invocation::new(&self.htar, ["-xv", "-f", archive_path])
    }

    fn mkdir(&self, remote_dir: &str) -> Invocation {
        Invocation::new(&self.hsi, ["mkdir", "-p", remote_dir])
    }

    fn probe(&self, archive_path: &str) -> Invocation {
        Invocation::new(&self.hsi, ["ls", "-l", archive_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_line_matches_htar_usage() {
        let t = HtarTemplate::default();
        let inv = t.create(
            Path::new("proj"),
            Path::new("/tmp/htar_proj:raw.0"),
            "/cryoEM/exp/proj/raw.0.tar",
        );
        assert_eq!(
            inv.render(),
            "htar -Hcrc -Hnoglob -p -cvf /cryoEM/exp/proj/raw.0.tar -L /tmp/htar_proj:raw.0 -Y 110:110"
        );
        assert_eq!(inv.cwd.as_deref(), Some(Path::new("proj")));
    }

    #[test]
    fn odd_arguments_are_quoted() {
        let inv = Invocation::new("htar", ["-f", "my dir/it's.tar"]);
        assert_eq!(inv.render(), r"htar -f 'my dir/it'\''s.tar'");
    }

    #[test]
    fn config_overrides_binaries_and_cos() {
        let cfg = EngineConfig {
            htar_path: "/opt/hpss/bin/htar".into(),
            archive_cos: 7,
            index_cos: 8,
            ..Default::default()
        };
        let t = HtarTemplate::from_config(&cfg);
        let inv = t.create(Path::new("."), Path::new("m"), "/a.tar");
        assert_eq!(inv.program, "/opt/hpss/bin/htar");
        assert_eq!(inv.args.last().map(String::as_str), Some("7:8"));
        assert_eq!(t.probe("/a.tar").render(), "hsi ls -l /a.tar");
    }
}
