use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::{ArchiveStatus, GroupPlan};
use crate::error::{Result, SpoolError};
use crate::exec::command::ArchiverTemplate;
use crate::exec::runner::CommandRunner;
use crate::ledger::transcript::Transcript;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupVerdict {
    pub archive_path: String,
    pub status: ArchiveStatus,
    /// What the create and listing records report, once verified.
    pub recorded_bytes: Option<u64>,
    pub recorded_files: Option<u64>,
    /// `None` when the remote side was not asked.
    pub remote_present: Option<bool>,
}

impl GroupVerdict {
    fn ok(&self) -> bool {
        self.status.is_verified() && self.remote_present != Some(false)
    }
}

/// Recomputed every run from the transcript; never stored.
#[derive(Clone, Debug)]
pub struct RetentionDecision {
    pub directory: PathBuf,
    pub per_group: Vec<GroupVerdict>,
    pub authorized: bool,
}

impl RetentionDecision {
    pub fn all_groups_verified(&self) -> bool {
        self.per_group.iter().all(|g| g.status.is_verified())
    }

    pub fn verified_count(&self) -> usize {
        self.per_group.iter().filter(|g| g.status.is_verified()).count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Deleted,
    /// Authorized, but this run is not allowed to delete.
    WouldDelete,
    Retained,
}

/// Decides whether a folder's sources may go, from its full set of plans.
pub struct RetentionGate<'a> {
    empty_is_archived: bool,
    probe: Option<(&'a dyn ArchiverTemplate, &'a dyn CommandRunner)>,
}

impl<'a> RetentionGate<'a> {
    /// `empty_is_archived` is the caller's word that a folder with nothing to
    /// pack was archived by other means; the gate never assumes it.
    pub fn new(empty_is_archived: bool) -> Self {
        Self {
            empty_is_archived,
            probe: None,
        }
    }

    /// Additionally require the remote side to confirm each archive exists.
    pub fn with_probe(
        mut self,
        template: &'a dyn ArchiverTemplate,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        self.probe = Some((template, runner));
        self
    }

    /// Fails with `LedgerCorruption` instead of deciding when any archive
    /// has ambiguous records.
    pub fn evaluate(&self, directory: &Path, plans: &[GroupPlan]) -> Result<RetentionDecision> {
        let mut transcripts: HashMap<&Path, Transcript> = HashMap::new();
        let mut per_group = Vec::with_capacity(plans.len());

        for plan in plans {
            if !transcripts.contains_key(plan.transcript()) {
                let t = Transcript::load(plan.transcript())?;
                transcripts.insert(plan.transcript(), t);
            }
            let transcript = &transcripts[plan.transcript()];
            let status = transcript.status(&plan.archive_path)?;
            if let ArchiveStatus::Corrupt { creates, listings } = status {
                tracing::error!(
                    directory = %directory.display(),
                    archive = %plan.archive_path,
                    creates,
                    listings,
                    "ledger corrupt, refusing to decide"
                );
                return Err(SpoolError::LedgerCorruption {
                    transcript: plan.transcript_path.clone(),
                    archive: plan.archive_path.clone(),
                    creates,
                    listings,
                });
            }
            let (recorded_bytes, recorded_files) = if status.is_verified() {
                (
                    transcript.created_bytes(&plan.archive_path)?,
                    transcript.listed_files(&plan.archive_path)?,
                )
            } else {
                (None, None)
            };
            per_group.push(GroupVerdict {
                archive_path: plan.archive_path.clone(),
                status,
                recorded_bytes,
                recorded_files,
                remote_present: None,
            });
        }

        let all_verified = per_group.iter().all(|g| g.status.is_verified());
        if all_verified {
            if let Some((template, runner)) = self.probe {
                for g in &mut per_group {
                    g.remote_present = Some(remote_exists(template, runner, &g.archive_path));
                }
            }
        }

        let authorized = if plans.is_empty() {
            self.empty_is_archived
        } else {
            per_group.iter().all(GroupVerdict::ok)
        };

        let decision = RetentionDecision {
            directory: directory.to_path_buf(),
            per_group,
            authorized,
        };
        tracing::info!(
            directory = %directory.display(),
            verified = decision.verified_count(),
            total = plans.len(),
            authorized,
            "retention decision"
        );
        Ok(decision)
    }

    /// Carry out a decision. Only removes anything when `may_delete`.
    pub fn apply(&self, decision: &RetentionDecision, may_delete: bool) -> Result<Disposition> {
        let dir = &decision.directory;
        if !decision.authorized {
            tracing::error!(directory = %dir.display(), "archive validation failed, keeping sources");
            return Ok(Disposition::Retained);
        }
        if !may_delete {
            tracing::warn!(directory = %dir.display(), "should be deleting");
            return Ok(Disposition::WouldDelete);
        }
        tracing::warn!(directory = %dir.display(), "deleting");
        std::fs::remove_dir_all(dir)?;
        Ok(Disposition::Deleted)
    }
}

fn remote_exists(template: &dyn ArchiverTemplate, runner: &dyn CommandRunner, archive: &str) -> bool {
    let inv = template.probe(archive);
    match runner.run(&inv) {
        Ok(out) if out.success() => true,
        Ok(out) => {
            tracing::warn!(archive, exit = %out.exit, "remote does not report archive");
            false
        }
        Err(e) => {
            tracing::warn!(archive, error = %e, "could not probe remote");
            false
        }
    }
}
