//! Command-line interface, built on clap.
//!
//! Defines [`Cli`] with subcommands [`Command`] (run, status, demo) and
//! global flags (--max-retries, --verbose).

use clap::{Parser, Subcommand};

/// monograph — multi-stage research pipeline orchestrator.
#[derive(Debug, Parser)]
#[command(name = "monograph", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Maximum retries before a job is marked failed.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Enable verbose output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full pipeline for a topic.
    Run {
        /// Research topic to collect, synthesize and publish.
        topic: String,

        /// Comma-separated provider keys to query.
        #[arg(long, default_value = "arxiv,crossref,ssrn")]
        providers: String,

        /// Target result count per provider.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Write a job snapshot to this file when the run ends.
        #[arg(long)]
        jobs: Option<String>,
    },

    /// Show job status from a saved snapshot.
    Status {
        /// Path to a job snapshot written by `run --jobs`.
        #[arg(long, default_value = "monograph-jobs.json")]
        jobs: String,
    },

    /// Run the built-in offline demonstration of the stage chain.
    Demo,
}
