//! CLI command definitions and dispatch for the `skrun` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod principal;
pub mod reconcile;
pub mod status;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run authored skills asynchronously behind an access-controlled queue.
#[derive(Parser)]
#[command(name = "skrun", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "SKILLRUN_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server, worker pool and reconciler.
    Serve {
        /// Port to listen on [default: server.port from config.toml].
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to [default: server.host from config.toml].
        #[arg(long)]
        host: Option<String>,

        /// Number of workers [default: runner.workers from config.toml].
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Manage principals and their API keys.
    Principal {
        #[command(subcommand)]
        action: PrincipalCommand,
    },

    /// Run counts by state and runner configuration.
    Status,

    /// Sweep stale runs once and exit.
    Reconcile,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum PrincipalCommand {
    /// Create a principal and print its API key (shown once).
    Create {
        /// Unique display name.
        name: String,
    },

    /// List principals.
    #[command(alias = "ls")]
    List,
}
