//! CLI command definitions and dispatch for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod config;
pub mod history;

use clap::{Parser, Subcommand};

/// Conversational backend with durable, per-thread chat history.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
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

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8000", env = "PARLEY_PORT")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1", env = "PARLEY_HOST")]
        host: String,

        /// Export spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },

    /// Run one turn on a thread and print its recent history.
    Chat {
        /// User that owns the thread.
        #[arg(long, short)]
        user: String,

        /// Thread to append to (created on first use).
        #[arg(long, short)]
        thread: String,

        /// Reply language recorded on the thread.
        #[arg(long)]
        language: Option<String>,

        /// Message text.
        text: String,
    },

    /// Show recent messages of a thread, oldest first.
    History {
        #[arg(long, short)]
        thread: String,

        /// Number of messages to show.
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print the effective configuration.
    Config,
}

/// Tracing filter directive for the requested verbosity.
pub fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,parley_core=debug,parley_infra=debug,parley_api=debug",
        _ => "trace",
    }
}
