// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "caravel")]
#[command(about = "Zero-downtime application deployment over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Minimal output for CI
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// JSON lines output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter caravel.yml configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy a new release and make it live
    Deploy {
        /// Branch to deploy (overrides the configured branch)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Roll back to a previous release
    Rollback {
        /// Specific release name to roll back to
        #[arg(short, long)]
        release: Option<String>,
    },

    /// List releases on the server
    Releases,

    /// Remove old and incomplete releases
    Cleanup {
        /// Number of releases to keep (overrides the configured count)
        #[arg(short, long)]
        keep: Option<usize>,
    },
}
