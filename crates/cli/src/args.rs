//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// archive-poster: post digitized archive photographs to Bluesky on a schedule
#[derive(Parser, Debug)]
#[command(name = "archive-poster")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Post the next queued record, once or on an interval
    Run(RunArgs),

    /// Inspect and edit the scheduled queue
    Queue(QueueArgs),

    /// Fetch a record and show the caption that would be posted
    Preview(PreviewArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run in dry-run mode (no publishing, nothing committed)
    #[arg(long)]
    pub dry_run: bool,

    /// Process a single record and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List queued records in posting order
    List {
        /// Maximum number of entries to show
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Append a record to the queue
    Add {
        /// Archive record id
        id: String,

        /// Operator note describing the record
        description: String,
    },

    /// Show whether a record is queued or already posted
    Status {
        /// Archive record id
        id: String,
    },

    /// Remove every planned post date label
    ClearDates,

    /// Label unlabelled queue entries two per day
    BackfillDates {
        /// First day to assign (YYYY-MM-DD)
        #[arg(long)]
        start: String,
    },

    /// Swap the records at two queue positions
    Swap {
        /// First queue position
        first: i64,

        /// Second queue position
        second: i64,
    },
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Archive record id
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
