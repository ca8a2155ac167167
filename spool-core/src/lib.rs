#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;

pub mod util {
    pub mod line_prefix;
    pub mod paths;
}

pub mod pack {
    pub mod packer;
    pub mod walker;
}

pub mod ledger {
    pub mod restore;
    pub mod transcript;
    pub mod writer;
}

pub mod exec {
    pub mod command;
    pub mod executor;
    pub mod runner;
}

pub mod engine;
pub mod retention;
pub mod schedule;

// Re-exports: stable API surface
pub use config::{EngineConfig, RunMode, parse_size};
pub use domain::{ArchiveStatus, FileEntry, GroupPlan};
pub use engine::{Engine, FolderOutcome, FolderReport, RunReport};
pub use error::{Result, SpoolError};
pub use exec::command::{ArchiverTemplate, HtarTemplate, Invocation};
pub use exec::runner::{CommandRunner, Exit, ProcessRunner, RunOutput};
pub use retention::{Disposition, RetentionDecision, RetentionGate};
pub use schedule::{PlanOutcome, ScheduleReport, Scheduler};
