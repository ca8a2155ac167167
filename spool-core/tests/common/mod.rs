#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use spool_core::{CommandRunner, EngineConfig, Exit, Invocation, RunMode, RunOutput};

/// Stands in for htar/hsi: "writes" archives into a set and prints the
/// same completion lines the real tool does.
#[derive(Default)]
pub struct FakeHtar {
    pub calls: Mutex<Vec<Invocation>>,
    pub remote: Mutex<HashSet<String>>,
    /// Archive paths whose create exits non-zero.
    pub fail_create: HashSet<String>,
    /// Archive paths whose listing exits non-zero.
    pub fail_list: HashSet<String>,
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeHtar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(archives: &[&str]) -> Self {
        Self {
            fail_create: archives.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Archive paths passed to create, in call order.
    pub fn creates(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.args.iter().any(|a| a == "-cvf"))
            .map(|i| arg_after(&i.args, "-cvf"))
            .collect()
    }

    pub fn count(&self, program: &str, first_arg: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.program == program && i.args.first().map(String::as_str) == Some(first_arg))
            .count()
    }

    fn create(&self, inv: &Invocation) -> RunOutput {
        let archive = arg_after(&inv.args, "-cvf");
        if self.fail_create.contains(&archive) {
            return out(1, format!("HTAR: Create failed for {archive}\nHTAR: HTAR FAILED\n"));
        }
        let cwd = inv.cwd.clone().unwrap_or_default();
        // Like htar, a relative manifest path is taken from the working dir
        let manifest = match fs::read_to_string(cwd.join(arg_after(&inv.args, "-L"))) {
            Ok(m) => m,
            Err(e) => return out(1, format!("HTAR: cannot read file list: {e}\nHTAR: HTAR FAILED\n")),
        };
        let mut bytes = 0u64;
        let mut n = 0;
        for line in manifest.lines() {
            let member = line.replace("\\[", "[").replace("\\]", "]");
            bytes += fs::symlink_metadata(cwd.join(member)).unwrap().len();
            n += 1;
        }
        self.remote.lock().unwrap().insert(archive.clone());
        out(
            0,
            format!(
                "HTAR: a   {n} members\nHTAR: Create complete for {archive}. {bytes} bytes written for {n} member files, max threads: 4 Transfer time: 0.1 seconds (1.0 MB/s)\nHTAR: HTAR SUCCESSFUL\n"
            ),
        )
    }

    fn list(&self, inv: &Invocation) -> RunOutput {
        let archive = arg_after(&inv.args, "-f");
        if self.fail_list.contains(&archive) || !self.remote.lock().unwrap().contains(&archive) {
            return out(72, format!("HTAR: Listing failed for {archive}\nHTAR: HTAR FAILED\n"));
        }
        out(
            0,
            format!("HTAR: Listing complete for {archive}, 3 files 4 total objects\nHTAR: HTAR SUCCESSFUL\n"),
        )
    }
}

impl CommandRunner for FakeHtar {
    fn run(&self, inv: &Invocation) -> std::io::Result<RunOutput> {
        self.calls.lock().unwrap().push(inv.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let res = match (inv.program.as_str(), inv.args.first().map(String::as_str)) {
            ("htar", Some("-Hcrc")) => self.create(inv),
            ("htar", Some("-tv")) => self.list(inv),
            ("hsi", Some("mkdir")) => out(0, String::new()),
            ("hsi", Some("ls")) => {
                let archive = inv.args.last().cloned().unwrap_or_default();
                if self.remote.lock().unwrap().contains(&archive) {
                    out(0, format!("-rw-r----- 1 u g 10 Jan 1 00:00 {archive}\n"))
                } else {
                    out(64, format!("*** hpss_Lstat: No such file or directory [-2]: {archive}\n"))
                }
            }
            _ => out(127, format!("unexpected command {inv}\n")),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(res)
    }
}

fn out(code: i32, text: String) -> RunOutput {
    RunOutput {
        exit: Exit::Code(code),
        output: text.into_bytes(),
    }
}

fn arg_after(args: &[String], flag: &str) -> String {
    let i = args.iter().position(|a| a == flag).unwrap();
    args[i + 1].clone()
}

/// A scratch tree under a temp dir: `base/<rel>` with the given files.
pub struct Tree {
    pub tmp: tempfile::TempDir,
}

impl Tree {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("base")).unwrap();
        fs::create_dir_all(tmp.path().join("work")).unwrap();
        Self { tmp }
    }

    pub fn base(&self) -> PathBuf {
        self.tmp.path().join("base")
    }

    pub fn work(&self) -> PathBuf {
        self.tmp.path().join("work")
    }

    pub fn file(&self, rel: &str, size: usize) -> &Self {
        let p = self.base().join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, vec![b'x'; size]).unwrap();
        self
    }

    pub fn dir(&self, rel: &str) -> &Self {
        fs::create_dir_all(self.base().join(rel)).unwrap();
        self
    }

    pub fn config(&self, mode: RunMode, archive_size: u64) -> EngineConfig {
        EngineConfig {
            archive_size,
            threads: 2,
            hsi_prefix: "/cryoEM/exp/".into(),
            work_dir: self.work(),
            base_dir: self.base(),
            mode,
            settle_delay_secs: 0,
            ..EngineConfig::default()
        }
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.base().join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.base().join(rel).exists()
    }

    pub fn work_files(&self) -> Vec<PathBuf> {
        let mut v: Vec<_> = fs::read_dir(self.work())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        v.sort();
        v
    }
}

pub fn path(s: &str) -> PathBuf {
    Path::new(s).to_path_buf()
}
