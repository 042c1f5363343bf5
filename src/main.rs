//! Livebox - multi-tier read-through cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use livebox::cli::{Cli, Commands};
use livebox::config::{Config, ConfigManager};
use livebox::error::LiveboxResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LiveboxResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);

    match cli.command {
        Commands::Get(args) => livebox::cli::commands::get(args, &config).await,
        Commands::Journal(args) => livebox::cli::commands::journal(args, &config).await,
        Commands::Clear(args) => livebox::cli::commands::clear(args, &config).await,
        Commands::Config(args) => {
            livebox::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug. `general.logging = false` silences the
/// library entirely.
fn init_logging(verbose: u8, config: &Config) {
    let directive = if !config.general.logging {
        "livebox=off"
    } else {
        match verbose {
            0 => "livebox=warn",
            1 => "livebox=info",
            _ => "livebox=debug",
        }
    };
    let filter = EnvFilter::new(directive);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
