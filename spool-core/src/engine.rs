//! One invocation end to end: enumerate, plan, write restore scripts,
//! archive what is missing, then decide per folder whether the sources
//! may go.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::{EngineConfig, RunMode};
use crate::domain::GroupPlan;
use crate::error::{Result, SpoolError};
use crate::exec::command::ArchiverTemplate;
use crate::exec::executor::ArchiveExecutor;
use crate::exec::runner::CommandRunner;
use crate::ledger::restore::{self, ScriptKind, WriteOutcome};
use crate::ledger::writer::LedgerWriter;
use crate::pack::packer::{PlanLayout, plan_folder};
use crate::pack::walker::{archival_units, scan_directory};
use crate::retention::{Disposition, RetentionDecision, RetentionGate};
use crate::schedule::{ScheduleReport, Scheduler};
use crate::util::paths::normalize_path;

#[derive(Debug)]
pub enum FolderOutcome {
    /// Nothing was run for this folder.
    PlanningFailed(SpoolError),
    Surveyed,
    Decided {
        decision: RetentionDecision,
        disposition: Disposition,
    },
    /// Duplicate records in the transcript; needs manual inspection.
    Corrupt(SpoolError),
    /// Decided, but carrying out the decision failed.
    Failed(SpoolError),
}

#[derive(Debug)]
pub struct FolderReport {
    pub folder: PathBuf,
    pub groups: usize,
    pub bytes: u64,
    pub outcome: FolderOutcome,
}

impl FolderReport {
    pub fn ok(&self) -> bool {
        matches!(
            self.outcome,
            FolderOutcome::Surveyed | FolderOutcome::Decided { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub folders: Vec<FolderReport>,
    pub schedule: ScheduleReport,
}

impl RunReport {
    /// False if any plan failed, any ledger was corrupt or any folder could
    /// not be planned.
    pub fn success(&self) -> bool {
        self.schedule.failed() == 0 && self.folders.iter().all(FolderReport::ok)
    }
}

struct PlannedFolder {
    folder: PathBuf,
    remote_dir: String,
    plans: Vec<GroupPlan>,
}

pub struct Engine<'a> {
    cfg: &'a EngineConfig,
    template: &'a dyn ArchiverTemplate,
    runner: &'a dyn CommandRunner,
}

impl<'a> Engine<'a> {
    pub fn new(
        cfg: &'a EngineConfig,
        template: &'a dyn ArchiverTemplate,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            cfg,
            template,
            runner,
        }
    }

    pub fn run(&self, directories: &[PathBuf]) -> Result<RunReport> {
        self.cfg.validate()?;
        if directories.is_empty() {
            return Err(SpoolError::planning(&self.cfg.base_dir, "no directories given"));
        }
        std::fs::create_dir_all(&self.cfg.work_dir)?;

        let mut report = RunReport::default();
        let mut planned = Vec::new();
        let mut seen = BTreeSet::new();
        for arg in directories {
            let units = match archival_units(&self.cfg.base_dir, arg) {
                Ok(u) => u,
                Err(e) => {
                    tracing::error!(directory = %arg.display(), error = %e, "cannot plan");
                    report.folders.push(FolderReport {
                        folder: arg.clone(),
                        groups: 0,
                        bytes: 0,
                        outcome: FolderOutcome::PlanningFailed(e),
                    });
                    continue;
                }
            };
            for folder in units {
                // Overlapping arguments must not give one folder two owners
                if !seen.insert(normalize_path(&folder)) {
                    tracing::warn!(folder = %folder.display(), "already planned, skipping duplicate");
                    continue;
                }
                match self.plan(&folder) {
                    Ok(p) => planned.push(p),
                    Err(e) => {
                        tracing::error!(folder = %folder.display(), error = %e, "cannot plan");
                        report.folders.push(FolderReport {
                            folder,
                            groups: 0,
                            bytes: 0,
                            outcome: FolderOutcome::PlanningFailed(e),
                        });
                    }
                }
            }
        }

        if self.cfg.mode == RunMode::Survey {
            self.survey(&planned, &mut report);
            return Ok(report);
        }

        let mut keep = Vec::with_capacity(planned.len());
        for pf in planned {
            match self.write_restore_script(&pf) {
                Ok(()) => keep.push(pf),
                Err(e) => report.folders.push(FolderReport {
                    folder: pf.folder.clone(),
                    groups: pf.plans.len(),
                    bytes: pf.plans.iter().map(|p| p.bytes).sum(),
                    outcome: FolderOutcome::PlanningFailed(e),
                }),
            }
        }
        let planned = keep;

        if self.cfg.mode.commits() {
            self.create_remote_dirs(&planned);
        }

        report.schedule = self.schedule(&planned)?;
        for p in report.schedule.unexecuted() {
            if let Err(e) = p.discard_manifest() {
                tracing::warn!(manifest = %p.manifest_path.display(), error = %e, "could not remove manifest");
            }
        }

        let gate = RetentionGate::new(self.cfg.empty_is_archived);
        let gate = if self.cfg.probe_remote {
            gate.with_probe(self.template, self.runner)
        } else {
            gate
        };
        for pf in &planned {
            report.folders.push(self.retain(&gate, pf));
        }
        Ok(report)
    }

    fn plan(&self, folder: &Path) -> Result<PlannedFolder> {
        tracing::info!(folder = %folder.display(), budget = self.cfg.archive_size, "generating file lists");
        let layout = self.layout(folder);
        let plans = plan_folder(
            &layout,
            scan_directory(&layout.local_folder()),
            self.cfg.archive_size,
        )?;
        Ok(PlannedFolder {
            folder: folder.to_path_buf(),
            remote_dir: layout.remote_dir(),
            plans,
        })
    }

    fn layout<'b>(&'b self, folder: &'b Path) -> PlanLayout<'b> {
        PlanLayout {
            base_dir: &self.cfg.base_dir,
            folder,
            work_dir: &self.cfg.work_dir,
            hsi_prefix: &self.cfg.hsi_prefix,
        }
    }

    /// The restore script is also the transcript, so it must exist before
    /// any log is appended and must survive reruns.
    fn write_restore_script(&self, pf: &PlannedFolder) -> Result<()> {
        if pf.plans.is_empty() {
            return Ok(());
        }
        let path = self.layout(&pf.folder).transcript_path()?;
        if !self.cfg.mode.commits() {
            tracing::debug!(script = %path.display(), "dry run, not writing restore script");
            return Ok(());
        }
        let text = restore::render(ScriptKind::Restore, &pf.folder, &pf.plans, self.template);
        match restore::write_script(&path, &text, self.cfg.mode.reverifies())? {
            WriteOutcome::Written => {
                tracing::info!(folder = %pf.folder.display(), script = %path.display(), "wrote restore script")
            }
            WriteOutcome::Kept => tracing::info!(
                folder = %pf.folder.display(),
                script = %path.display(),
                "restore script exists, appending to it"
            ),
        }
        Ok(())
    }

    fn create_remote_dirs(&self, planned: &[PlannedFolder]) {
        let dirs: BTreeSet<&str> = planned
            .iter()
            .filter(|pf| !pf.plans.is_empty())
            .map(|pf| pf.remote_dir.as_str())
            .collect();
        for dir in dirs {
            let inv = self.template.mkdir(dir);
            tracing::info!(remote = dir, "creating parent directories");
            match self.runner.run(&inv) {
                Ok(out) if out.success() => {}
                Ok(out) => tracing::warn!(remote = dir, exit = %out.exit, "mkdir failed"),
                Err(e) => tracing::warn!(remote = dir, error = %e, "could not run mkdir"),
            }
        }
    }

    fn schedule(&self, planned: &[PlannedFolder]) -> Result<ScheduleReport> {
        let plans: Vec<GroupPlan> = planned
            .iter()
            .flat_map(|pf| pf.plans.iter().cloned())
            .collect();
        let ledger = LedgerWriter::spawn()?;
        let executor = ArchiveExecutor {
            template: self.template,
            runner: self.runner,
            sink: &ledger,
            settle_delay: self.cfg.settle_delay(),
        };
        let report = Scheduler::new(self.cfg, executor).run(plans)?;
        tracing::info!(
            archived = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            not_run = report.not_run(),
            "scheduling finished"
        );
        ledger.shutdown();
        Ok(report)
    }

    fn retain(&self, gate: &RetentionGate<'_>, pf: &PlannedFolder) -> FolderReport {
        let local = self.cfg.base_dir.join(&pf.folder);
        let groups = pf.plans.len();
        let bytes = pf.plans.iter().map(|p| p.bytes).sum();
        let outcome = match gate.evaluate(&local, &pf.plans) {
            Err(e) if e.is_corruption() => FolderOutcome::Corrupt(e),
            Err(e) => FolderOutcome::Failed(e),
            Ok(decision) => match gate.apply(&decision, self.cfg.may_delete()) {
                Ok(disposition) => FolderOutcome::Decided {
                    decision,
                    disposition,
                },
                Err(e) => {
                    tracing::error!(folder = %local.display(), error = %e, "could not delete");
                    FolderOutcome::Failed(e)
                }
            },
        };
        FolderReport {
            folder: pf.folder.clone(),
            groups,
            bytes,
            outcome,
        }
    }

    /// Usage numbers and stub scripts only; the archive is never touched.
    fn survey(&self, planned: &[PlannedFolder], report: &mut RunReport) {
        for pf in planned {
            let groups = pf.plans.len();
            let bytes: u64 = pf.plans.iter().map(|p| p.bytes).sum();
            let files: usize = pf.plans.iter().map(|p| p.members).sum();
            tracing::info!(folder = %pf.folder.display(), groups, files, bytes, "usage");

            let outcome = match self.write_stub(pf) {
                Ok(()) => FolderOutcome::Surveyed,
                Err(e) => FolderOutcome::Failed(e),
            };
            for p in &pf.plans {
                if let Err(e) = p.discard_manifest() {
                    tracing::warn!(manifest = %p.manifest_path.display(), error = %e, "could not remove manifest");
                }
            }
            report.folders.push(FolderReport {
                folder: pf.folder.clone(),
                groups,
                bytes,
                outcome,
            });
        }
    }

    fn write_stub(&self, pf: &PlannedFolder) -> Result<()> {
        let path = self.layout(&pf.folder).stub_path()?;
        let text = restore::render(ScriptKind::Stub, &pf.folder, &pf.plans, self.template);
        restore::write_script(&path, &text, true)?;
        tracing::info!(folder = %pf.folder.display(), stub = %path.display(), "wrote stub script");
        Ok(())
    }
}
