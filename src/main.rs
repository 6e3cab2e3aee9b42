// ABOUTME: Entry point for the caravel CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use caravel::config::Config;
use caravel::error::Result;
use caravel::output::{Output, OutputMode};
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    if let Err(e) = run(cli, output).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    match cli.command {
        Commands::Init { force } => {
            let cwd = std::env::current_dir()?;
            commands::init(&cwd, force, output)
        }
        Commands::Deploy { branch } => {
            let config = Config::resolve(cli.config.as_deref())?;
            let config = match branch {
                Some(branch) => config.with_branch(&branch),
                None => config,
            };
            commands::deploy(config, output).await
        }
        Commands::Rollback { release } => {
            let config = Config::resolve(cli.config.as_deref())?;
            commands::rollback(config, release.as_deref(), output).await
        }
        Commands::Releases => {
            let config = Config::resolve(cli.config.as_deref())?;
            commands::releases(config, output).await
        }
        Commands::Cleanup { keep } => {
            let config = Config::resolve(cli.config.as_deref())?;
            let config = match keep {
                Some(keep) => config.with_keep_releases(keep),
                None => config,
            };
            commands::cleanup(config, output).await
        }
    }
}
