//! CLI definitions for jobq.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jobq CLI.
#[derive(Parser)]
#[command(name = "jobq")]
#[command(about = "Single-node, file-backed job queue")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path [default: <work-dir>/config/default.toml, optional]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Job database path (overrides `database.path`)
    #[arg(long, global = true, env = "JOBQ_DB")]
    pub db: Option<PathBuf>,

    /// Working directory
    #[arg(short, long, global = true)]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Submit a new job
    Submit {
        /// Text input
        #[arg(short, long)]
        text: Option<String>,

        /// Path to an image
        #[arg(short, long)]
        image: Option<String>,

        /// Directory with additional context files
        #[arg(short = 'c', long)]
        context_dir: Option<String>,
    },

    /// Show the status of a job
    Status {
        /// Job ID
        job_id: String,
    },

    /// Run a worker until SIGINT or SIGTERM
    Worker,
}
