//! CLI entry point for streamgen.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use streamgen_simulator::{Cli, Command, GeneratorConfig, Report, RunArgs, Runner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateConfig { path } => {
            GeneratorConfig::write_default(&path)?;
            println!("Generated default configuration: {}", path.display());
            Ok(())
        }
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };

    init_logging(&config);
    if let Some(path) = &args.config {
        info!("Loaded configuration from: {}", path.display());
    }
    args.apply(&mut config);

    info!("Starting streamgen v{}", env!("CARGO_PKG_VERSION"));
    info!(
        output = %config.output.kind,
        interval_secs = config.interval_secs,
        orgs_count = config.orgs_count,
        cases = ?config.cases,
        "Configuration"
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let report_file = config.report_file.clone();
    let report = Runner::from_config(config, shutdown)?.run().await?;

    report.print_summary();
    if let Some(path) = report_file {
        save_report(&report, &path)?;
    }

    Ok(())
}

fn init_logging(config: &GeneratorConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level()).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(config.logging.show_target)
                .with_thread_ids(config.logging.show_thread_ids)
                .with_file(config.logging.show_location)
                .with_line_number(config.logging.show_location),
        )
        .with(filter)
        .init();
}

/// Cancels `shutdown` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("SIGINT received, shutting down gracefully...");
            }
            _ = terminate => {
                info!("SIGTERM received, shutting down gracefully...");
            }
        }

        shutdown.cancel();
    });
}

fn save_report(report: &Report, path: &Path) -> Result<()> {
    let md_path = path.with_extension("md");
    std::fs::write(&md_path, report.to_markdown())?;
    info!("Markdown report saved to: {}", md_path.display());

    let json_path = path.with_extension("json");
    std::fs::write(&json_path, report.to_json())?;
    info!("JSON report saved to: {}", json_path.display());

    Ok(())
}
