pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use spool_core::error::Result;
use spool_core::RunMode;

/// Returns whether every directory came through cleanly.
pub fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Archive {
            directories,
            engine,
            commit,
            rebuild,
            survey,
            keep_sources,
            empty_is_archived,
            probe_remote,
        } => {
            let mode = if survey {
                RunMode::Survey
            } else if rebuild {
                RunMode::Rebuild
            } else if commit {
                RunMode::Commit
            } else {
                RunMode::DryRun
            };
            handlers::handle_archive(
                directories,
                engine,
                mode,
                keep_sources,
                empty_is_archived,
                probe_remote,
            )
        }
        Commands::Status {
            directories,
            engine,
        } => handlers::handle_status(directories, engine),
    }
}
