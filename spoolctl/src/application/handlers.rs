use std::path::PathBuf;

use spool_core::error::Result;
use spool_core::{
    Disposition, Engine, EngineConfig, FolderOutcome, FolderReport, HtarTemplate, ProcessRunner,
    RunMode, RunReport, parse_size,
};

use crate::presentation::cli::EngineArgs;

/// Config file first (or defaults), then whatever flags were given.
pub fn engine_config(args: EngineArgs) -> Result<EngineConfig> {
    let mut cfg = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = args.base_dir {
        cfg.base_dir = dir;
    }
    if let Some(dir) = args.work_dir {
        cfg.work_dir = dir;
    }
    if let Some(size) = args.size {
        cfg.archive_size = parse_size(&size)?;
    }
    if let Some(n) = args.threads {
        cfg.threads = n;
    }
    if let Some(prefix) = args.hsi_prefix {
        cfg.hsi_prefix = prefix;
    }
    if let Some(cos) = args.archive_cos {
        cfg.archive_cos = cos;
    }
    if let Some(cos) = args.index_cos {
        cfg.index_cos = cos;
    }
    if let Some(secs) = args.settle_delay {
        cfg.settle_delay_secs = secs;
    }
    if let Some(htar) = args.htar {
        cfg.htar_path = htar;
    }
    if let Some(hsi) = args.hsi {
        cfg.hsi_path = hsi;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run_engine(cfg: &EngineConfig, directories: &[PathBuf]) -> Result<RunReport> {
    let template = HtarTemplate::from_config(cfg);
    Engine::new(cfg, &template, &ProcessRunner).run(directories)
}

pub fn handle_archive(
    directories: Vec<PathBuf>,
    engine: EngineArgs,
    mode: RunMode,
    keep_sources: bool,
    empty_is_archived: bool,
    probe_remote: bool,
) -> Result<bool> {
    let mut cfg = engine_config(engine)?;
    cfg.mode = mode;
    cfg.keep_sources |= keep_sources;
    cfg.empty_is_archived |= empty_is_archived;
    cfg.probe_remote |= probe_remote;

    if mode == RunMode::DryRun {
        eprintln!("archive: dry run, pass --commit to archive and delete");
    }
    let report = run_engine(&cfg, &directories)?;
    print_summary(&report, false);
    Ok(report.success())
}

/// A dry run that prints every group's transcript status.
pub fn handle_status(directories: Vec<PathBuf>, engine: EngineArgs) -> Result<bool> {
    let mut cfg = engine_config(engine)?;
    cfg.mode = RunMode::DryRun;
    cfg.probe_remote = false;
    let report = run_engine(&cfg, &directories)?;
    print_summary(&report, true);
    Ok(report.success())
}

fn print_summary(report: &RunReport, per_group: bool) {
    let s = &report.schedule;
    println!(
        "archived={} already-verified={} not-run={} failed={}",
        s.succeeded(),
        s.skipped(),
        s.not_run(),
        s.failed()
    );
    for (plan, err) in s.failures() {
        println!("FAILED {} ({}): {err}", plan.archive_path, plan.folder.display());
    }
    for folder in &report.folders {
        print_folder(folder, per_group);
    }
}

fn print_folder(f: &FolderReport, per_group: bool) {
    let head = format!(
        "{}: {} groups, {} bytes",
        f.folder.display(),
        f.groups,
        f.bytes
    );
    match &f.outcome {
        FolderOutcome::PlanningFailed(e) => println!("{head}: not planned: {e}"),
        FolderOutcome::Surveyed => println!("{head}: surveyed"),
        FolderOutcome::Corrupt(e) => println!("{head}: CORRUPT LEDGER, inspect manually: {e}"),
        FolderOutcome::Failed(e) => println!("{head}: failed: {e}"),
        FolderOutcome::Decided {
            decision,
            disposition,
        } => {
            let verdict = match disposition {
                Disposition::Deleted => "deleted",
                Disposition::WouldDelete => "verified, kept",
                Disposition::Retained => "retained",
            };
            println!(
                "{head}: {}/{} verified, {verdict}",
                decision.verified_count(),
                decision.per_group.len()
            );
            if per_group {
                for g in &decision.per_group {
                    let mut line = format!("  {:<60} {}", g.archive_path, g.status);
                    if let (Some(bytes), Some(files)) = (g.recorded_bytes, g.recorded_files) {
                        line.push_str(&format!(", {bytes} bytes, {files} files"));
                    }
                    if let Some(present) = g.remote_present {
                        line.push_str(&format!(" (remote: {present})"));
                    }
                    println!("{line}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("spool.toml");
        std::fs::write(&path, "archive_size = 1024\nthreads = 8\nhsi_prefix = \"/file/\"\n")
            .unwrap();

        let cfg = engine_config(EngineArgs {
            config: Some(path),
            threads: Some(2),
            size: Some("2k".into()),
            ..EngineArgs::default()
        })
        .unwrap();
        assert_eq!(cfg.threads, 2);
        assert_eq!(cfg.archive_size, 2048);
        assert_eq!(cfg.hsi_prefix, "/file/");
    }

    #[test]
    fn zero_threads_is_rejected() {
        let err = engine_config(EngineArgs {
            threads: Some(0),
            ..EngineArgs::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn bad_size_is_rejected() {
        assert!(
            engine_config(EngineArgs {
                size: Some("ten gigs".into()),
                ..EngineArgs::default()
            })
            .is_err()
        );
    }
}
