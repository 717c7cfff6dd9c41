//! CLI argument definitions and command handlers.

pub mod run;
pub mod workflow;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Profile synchronization workflow engine.
#[derive(Parser)]
#[command(name = "psync", version, about = "Profile synchronization workflow engine")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 3600)]
        port: u16,
    },

    /// Execute a workflow once and print the outcome
    Run {
        /// Name of a registered workflow
        workflow: String,

        /// Inline JSON input, or @path to read it from a file
        #[arg(short, long)]
        input: Option<String>,
    },

    /// List registered workflows
    Workflows,

    /// Validate a workflow YAML file
    Validate {
        /// Path to the YAML definition
        path: std::path::PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}
