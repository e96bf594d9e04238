//! csvport CLI library: argument definitions and command handlers.

pub mod commands;

use clap::{Parser, Subcommand};
use uuid::Uuid;

pub type Result<T> = anyhow::Result<T>;

/// Bulk CSV to SQL Server migration.
#[derive(Parser, Debug)]
#[command(name = "csvport", version, about)]
pub struct Cli {
    /// Destination connection string; falls back to CSVPORT_CONNECTION.
    #[arg(short, long, global = true, env = "CSVPORT_CONNECTION")]
    pub connection: Option<String>,

    /// Verbose logging to the console.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the control tables if they do not exist.
    Init,

    /// Test the destination connection and explain any failure.
    Check,

    /// Migrate every CSV file under a root folder.
    Run {
        /// Folder scanned recursively for .csv files.
        root_folder: String,
    },

    /// Re-run an earlier job, or a single file of it.
    Reprocess {
        /// The job to re-run.
        job_id: Uuid,
        /// Re-run only this file of the job.
        #[arg(long)]
        file: Option<Uuid>,
    },

    /// List jobs, newest first.
    Jobs,

    /// Show one job with its files, errors and metrics.
    Job {
        job_id: Uuid,
    },
}
