use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::domain::GroupPlan;
use crate::error::{Result, SpoolError};
use crate::exec::command::{ArchiverTemplate, Invocation};
use crate::exec::runner::CommandRunner;
use crate::ledger::transcript::TranscriptSink;

/// What a successful archive run produced.
#[derive(Clone, Debug)]
pub struct ExecReport {
    pub archive_path: String,
    pub elapsed: Duration,
}

/// Runs create then list for one plan and hands the log to the ledger.
/// Success means both commands ran and exited 0; whether the transcript
/// text proves anything is decided later, on read.
pub struct ArchiveExecutor<'a> {
    pub template: &'a dyn ArchiverTemplate,
    pub runner: &'a dyn CommandRunner,
    pub sink: &'a dyn TranscriptSink,
    /// Pause between create and list.
    pub settle_delay: Duration,
}

impl ArchiveExecutor<'_> {
    pub fn execute(&self, plan: &GroupPlan) -> Result<ExecReport> {
        let started = Instant::now();
        tracing::info!(
            archive = %plan.archive_path,
            manifest = %plan.manifest_path.display(),
            log = %plan.log_path.display(),
            "archiving"
        );

        let mut log = BufWriter::new(File::create(&plan.log_path)?);
        writeln!(
            log,
            "spool: {} ({} files, {} bytes) started {}",
            plan.archive_name,
            plan.members,
            plan.bytes,
            now_stamp()
        )?;
        writeln!(log, "$ cd {}", plan.working_dir.display())?;

        let create = self
            .template
            .create(&plan.working_dir, &plan.manifest_path, &plan.archive_path);
        self.step(&mut log, plan, &create)?;

        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }

        let list = self.template.list(&plan.archive_path);
        self.step(&mut log, plan, &list)?;

        log.flush()?;
        drop(log);

        self.sink.append(&plan.transcript_path, &plan.log_path)?;
        cleanup(plan);

        let elapsed = started.elapsed();
        tracing::info!(
            archive = %plan.archive_path,
            minutes = elapsed.as_secs() / 60,
            "archived"
        );
        Ok(ExecReport {
            archive_path: plan.archive_path.clone(),
            elapsed,
        })
    }

    /// Run one command, echoing it and its output into the log. The log is
    /// flushed before any failure returns so it can be inspected.
    fn step(&self, log: &mut BufWriter<File>, plan: &GroupPlan, inv: &Invocation) -> Result<()> {
        writeln!(log, "$ {inv}")?;
        let out = match self.runner.run(inv) {
            Ok(out) => out,
            Err(e) => {
                writeln!(log, "spool: could not run {}: {e}", inv.program)?;
                log.flush()?;
                return Err(SpoolError::Execution {
                    archive: plan.archive_path.clone(),
                    detail: format!("could not run {}: {e}", inv.program),
                });
            }
        };
        log.write_all(&out.output)?;
        if !out.output.is_empty() && !out.output.ends_with(b"\n") {
            log.write_all(b"\n")?;
        }
        if !out.success() {
            writeln!(log, "spool: {} ended with {}", inv.program, out.exit)?;
            log.flush()?;
            return Err(SpoolError::Execution {
                archive: plan.archive_path.clone(),
                detail: format!("`{inv}` ended with {}", out.exit),
            });
        }
        Ok(())
    }
}

fn now_stamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// The transcript has the log now; the staged files are no longer needed.
fn cleanup(plan: &GroupPlan) {
    for p in [&plan.log_path, &plan.manifest_path] {
        if let Err(e) = std::fs::remove_file(p) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %p.display(), error = %e, "could not remove transient file");
            }
        }
    }
}
