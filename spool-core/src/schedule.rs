//! Bounded-concurrency dispatch of archive plans.
//!
//! - **Idempotence**: plans the transcript already shows as verified are
//!   skipped
//! - **Isolation**: a failed plan is recorded, never fatal to its siblings
//! - **Bounded**: at most `threads` archiver runs in flight

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::{EngineConfig, RunMode};
use crate::domain::{ArchiveStatus, GroupPlan};
use crate::error::{Result, SpoolError};
use crate::exec::executor::{ArchiveExecutor, ExecReport};
use crate::ledger::transcript::Transcript;

#[derive(Debug)]
pub enum PlanOutcome {
    Archived(ExecReport),
    /// Already verified by an earlier run; nothing dispatched.
    AlreadyVerified,
    /// Would have been archived, but the run does not commit.
    NotRun,
    Failed(SpoolError),
}

/// Per-plan outcomes, in plan order.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub outcomes: Vec<(GroupPlan, PlanOutcome)>,
}

impl ScheduleReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, PlanOutcome::Archived(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PlanOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PlanOutcome::AlreadyVerified))
    }

    pub fn not_run(&self) -> usize {
        self.count(|o| matches!(o, PlanOutcome::NotRun))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&GroupPlan, &SpoolError)> {
        self.outcomes.iter().filter_map(|(p, o)| match o {
            PlanOutcome::Failed(e) => Some((p, e)),
            _ => None,
        })
    }

    /// Plans whose manifests were never consumed by the archiver.
    pub fn unexecuted(&self) -> impl Iterator<Item = &GroupPlan> {
        self.outcomes.iter().filter_map(|(p, o)| match o {
            PlanOutcome::AlreadyVerified | PlanOutcome::NotRun => Some(p),
            _ => None,
        })
    }

    fn count(&self, f: impl Fn(&PlanOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| f(o)).count()
    }
}

pub struct Scheduler<'a> {
    threads: usize,
    mode: RunMode,
    executor: ArchiveExecutor<'a>,
}

enum Triage {
    Dispatch,
    Done(PlanOutcome),
}

impl<'a> Scheduler<'a> {
    pub fn new(cfg: &EngineConfig, executor: ArchiveExecutor<'a>) -> Self {
        Self {
            threads: cfg.threads.max(1),
            mode: cfg.mode,
            executor,
        }
    }

    /// Decide per plan whether it needs the archiver, reading each
    /// transcript once.
    fn triage(&self, plans: &[GroupPlan]) -> Vec<Triage> {
        let mut cache: HashMap<PathBuf, Result<Transcript>> = HashMap::new();
        plans
            .iter()
            .map(|plan| {
                let transcript = cache
                    .entry(plan.transcript_path.clone())
                    .or_insert_with(|| Transcript::load(&plan.transcript_path));
                let transcript = match transcript {
                    Ok(t) => t,
                    Err(e) => {
                        return Triage::Done(PlanOutcome::Failed(SpoolError::Execution {
                            archive: plan.archive_path.clone(),
                            detail: format!("could not read transcript: {e}"),
                        }));
                    }
                };
                let status = match transcript.status(&plan.archive_path) {
                    Ok(s) => s,
                    Err(e) => return Triage::Done(PlanOutcome::Failed(e)),
                };
                tracing::info!(
                    archive = %plan.archive_path,
                    previous = %status,
                    reverify = self.mode.reverifies(),
                    "previous status"
                );
                match status {
                    ArchiveStatus::Verified if !self.mode.reverifies() => {
                        Triage::Done(PlanOutcome::AlreadyVerified)
                    }
                    ArchiveStatus::Corrupt { creates, listings } => {
                        Triage::Done(PlanOutcome::Failed(SpoolError::LedgerCorruption {
                            transcript: plan.transcript_path.clone(),
                            archive: plan.archive_path.clone(),
                            creates,
                            listings,
                        }))
                    }
                    _ if !self.mode.commits() => Triage::Done(PlanOutcome::NotRun),
                    _ => Triage::Dispatch,
                }
            })
            .collect()
    }

    pub fn run(&self, plans: Vec<GroupPlan>) -> Result<ScheduleReport> {
        let triage = self.triage(&plans);
        let pending: Vec<usize> = triage
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t, Triage::Dispatch))
            .map(|(i, _)| i)
            .collect();

        if pending.is_empty() {
            tracing::warn!("no archive actions required");
        } else {
            tracing::info!(
                pending = pending.len(),
                threads = self.threads,
                "dispatching archives"
            );
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("spool-worker-{i}"))
            .build()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let executed: Vec<(usize, PlanOutcome)> = pool.install(|| {
            pending
                .par_iter()
                .map(|&i| {
                    let plan = &plans[i];
                    let outcome = match self.executor.execute(plan) {
                        Ok(r) => PlanOutcome::Archived(r),
                        Err(e) => {
                            tracing::error!(
                                archive = %plan.archive_path,
                                folder = %plan.folder.display(),
                                error = %e,
                                "archive failed"
                            );
                            PlanOutcome::Failed(e)
                        }
                    };
                    (i, outcome)
                })
                .collect()
        });

        let mut by_index: HashMap<usize, PlanOutcome> = executed.into_iter().collect();
        let outcomes = plans
            .into_iter()
            .zip(triage)
            .enumerate()
            .map(|(i, (plan, t))| {
                let outcome = match t {
                    Triage::Done(o) => o,
                    Triage::Dispatch => by_index.remove(&i).unwrap_or_else(|| {
                        PlanOutcome::Failed(SpoolError::Execution {
                            archive: plan.archive_path.clone(),
                            detail: "worker produced no outcome".into(),
                        })
                    }),
                };
                (plan, outcome)
            })
            .collect();

        Ok(ScheduleReport { outcomes })
    }
}
