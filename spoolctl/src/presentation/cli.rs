use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "spoolctl: batch tape archival with htar", long_about = None)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every command. Flags override the config file.
#[derive(Args, Clone, Debug, Default)]
pub struct EngineArgs {
    /// TOML file with engine settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory arguments are resolved against this
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Where manifests and transient logs are staged
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Archive size budget, e.g. 100g, 512m, 4096
    #[arg(short, long)]
    pub size: Option<String>,

    /// Archives in flight at once
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Remote prefix archives are stored under
    #[arg(long)]
    pub hsi_prefix: Option<String>,

    /// Class of service for archive files
    #[arg(long)]
    pub archive_cos: Option<u32>,

    /// Class of service for index files
    #[arg(long)]
    pub index_cos: Option<u32>,

    /// Seconds to wait between create and list
    #[arg(long)]
    pub settle_delay: Option<u64>,

    /// htar binary
    #[arg(long)]
    pub htar: Option<String>,

    /// hsi binary
    #[arg(long)]
    pub hsi: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan, archive and (optionally) delete directories
    Archive {
        /// Directories relative to the base directory
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,

        /// Run htar, append transcripts and delete verified sources
        #[arg(long, conflicts_with_all = ["rebuild", "survey"])]
        commit: bool,

        /// Like --commit, but re-archive even verified groups and start
        /// fresh transcripts
        #[arg(long, conflicts_with = "survey")]
        rebuild: bool,

        /// Only collect usage and write stub restore scripts
        #[arg(long)]
        survey: bool,

        /// Commit without deleting anything
        #[arg(long)]
        keep_sources: bool,

        /// Treat a directory with nothing to pack as already archived
        #[arg(long)]
        empty_is_archived: bool,

        /// Ask hsi to confirm each archive before deleting
        #[arg(long)]
        probe_remote: bool,
    },

    /// Report what each directory's transcript says, without running htar
    Status {
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },
}
