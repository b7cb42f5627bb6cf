// Clippy configuration: enable pedantic but allow overly strict lints
#![allow(clippy::missing_errors_doc)] // Internal functions don't need # Errors docs
#![allow(clippy::missing_panics_doc)] // Internal functions don't need # Panics docs
#![allow(clippy::must_use_candidate)] // Not all getters need #[must_use]
#![allow(clippy::module_name_repetitions)] // e.g., RegionId in region module is fine
#![allow(clippy::doc_markdown)] // Don't require backticks around JSON, CORS, etc.
#![allow(clippy::too_many_lines)] // Some functions are naturally long
#![allow(clippy::cast_possible_truncation)] // Layout math rounds into i64 deliberately
#![allow(clippy::cast_precision_loss)] // i64 map coordinates fit f64 exactly
#![allow(clippy::significant_drop_tightening)] // Lock guard drops are intentional
#![allow(clippy::option_if_let_else)] // if-let is more readable for Option handling
#![allow(clippy::needless_pass_by_value)] // PathBuf by value is fine for config loading

//! cli-rts - Claude Code sessions as a real-time strategy map
//!
//! A single Rust binary that provides:
//! - Daemon mode: receives hook events over HTTP and maintains the game state
//! - Emit mode: called by hooks to forward stdin JSON to the daemon
//! - Init mode: installs the hooks into a project
//!
//! Usage:
//!   cli-rts start            # Run the daemon in the current repository
//!   cli-rts emit pre-tool    # Forward a hook event (Claude Code pipes JSON)
//!   cli-rts init             # Install hooks into .claude/settings.json

mod cli;
mod config;
mod daemon;
mod errors;
mod event;
mod init;
mod state;

use clap::Parser;
use cli::{Cli, Commands};
use color_eyre::Result;
use config::CliRtsConfig;
use errors::CliRtsError;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("/tmp/cli-rts/logs"),
        |dirs| dirs.cache_dir().join("cli-rts").join("logs"),
    )
}

/// Daily-rotated file logging, optionally mirrored to stderr
///
/// The returned guard must live as long as logging is needed.
fn init_logging(level: &str, stderr: bool) -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = get_log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "cli-rts.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let log_filter = format!("cli_rts={level},tower_http={level}");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(stderr.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    Ok((guard, log_dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CliRtsConfig::load_from_path(path.clone()),
        None => CliRtsConfig::load(),
    };
    let port = cli.port.unwrap_or(config.daemon.port);

    match cli.command {
        Commands::Emit { event_type } => {
            // Hooks must stay quiet and must never fail the agent session
            let _guard = init_logging("warn", false).ok();
            event::emit::run(&event_type, &config.daemon.host, port, config.emit.timeout_ms).await;
            Ok(())
        }
        Commands::Init { path, force } => {
            let _guard = init_logging(&cli.log_level, false)?;
            init::run(path, force).map_err(|e| color_eyre::eyre::eyre!("{}", e))
        }
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }
        Commands::Start => {
            color_eyre::install()?;
            let (guard, log_dir) = init_logging(&cli.log_level, true)?;

            tracing::info!("Starting cli-rts v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Log directory: {:?}", log_dir);

            match daemon::start(&config, port).await {
                Ok(()) => Ok(()),
                Err(CliRtsError::Bind { addr, source }) => {
                    tracing::error!(%addr, error = %source, "Failed to bind");
                    eprintln!("Could not listen on {addr}: {source}");
                    eprintln!("Is a daemon already running? Check with:");
                    eprintln!("  curl http://127.0.0.1:{port}/health");
                    drop(guard);
                    std::process::exit(1);
                }
                Err(e) => Err(color_eyre::eyre::eyre!("{}", e)),
            }
        }
    }
}
