mod bundle;
mod cli;
mod config;
mod error;
mod folder;
mod media;
mod orchestrator;
mod prompts;
mod provider;
mod retry;
mod router;
mod scanner;
mod ui;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::AppConfig;
use orchestrator::BatchOrchestrator;
use retry::{RetryExecutor, RetryPolicy};
use router::ProviderRouter;
use scanner::FolderScanner;
use ui::BatchProgress;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "warn,noteforge=debug"
    } else {
        "warn,noteforge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .compact()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", Style::new().red().bold().apply_to("erro:"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.command.apply_overrides(&mut config);
    config.validate()?;

    match cli.command {
        Command::Config => {
            ui::print_config(&config).context("failed to render configuration")?;
        }
        Command::Scan { .. } => {
            let report = FolderScanner::new(&config)
                .scan(&config.paths.input_dir)
                .with_context(|| {
                    format!("cannot scan {}", config.paths.input_dir.display())
                })?;
            ui::print_scan_report(&report);
        }
        Command::Run { .. } => {
            let executor = RetryExecutor::new(RetryPolicy::from(&config.retry));
            let router = ProviderRouter::from_config(&config, executor)?;
            let orchestrator = BatchOrchestrator::new(&config, router);

            let stop = orchestrator.stop_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("stop requested, finishing the current folder");
                    stop.cancel();
                }
            });

            let progress = BatchProgress::new();
            match orchestrator.run(&progress).await {
                Ok(summary) => progress.finish(&summary),
                Err(e) => {
                    progress.clear();
                    return Err(e).context("batch aborted");
                }
            }
        }
    }
    Ok(())
}
