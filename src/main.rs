//! Snack scanner - QR badge validation station
//!
//! Scans participant badges with a camera, validates each one against the snack
//! ledger and shows the result to the operator.
//!
//! Module structure:
//! - `domain/` - Core types (devices, participant payloads, display, errors)
//! - `io/` - External interfaces (V4L2, zbar, ledger HTTP, console, shell cache)
//! - `services/` - Scanning logic (negotiator, scan machine, presenter, controller)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::{Parser, Subcommand};
use snack_scanner::domain::ScanEvent;
use snack_scanner::infra::{Config, Metrics};
use snack_scanner::io::shell_cache::FetchSource;
use snack_scanner::io::{
    run_operator_console, ConsoleDisplay, HttpValidationClient, ReqwestFetch, ShellCache,
    SysfsMediaPlatform, ZbarEngine,
};
use snack_scanner::services::{ScanController, TokioTimer};
use std::io::Write;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Snack scanner - QR badge validation station
#[derive(Parser, Debug)]
#[command(name = "snack-scanner", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Manage the offline shell cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Download every configured shell URL into the current cache version
    Install,
    /// Delete every cache version except the current one
    Activate,
    /// Fetch a URL, cache first, and write the body to stdout
    Fetch { url: String },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "snack-scanner starting");

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    match args.command {
        Some(Cmd::Cache { action }) => run_cache(&config, action).await,
        None => run_scanner(config).await,
    }
}

async fn run_cache(config: &Config, action: CacheAction) -> anyhow::Result<()> {
    let network = Arc::new(ReqwestFetch::new().context("failed to build HTTP client")?);
    let cache = ShellCache::new(config.cache_dir(), config.cache_version(), network);

    match action {
        CacheAction::Install => {
            let stored = cache
                .install(config.cache_shell_urls())
                .await
                .with_context(|| format!("failed to install cache {}", config.cache_version()))?;
            info!(version = %config.cache_version(), entries = %stored, "cache_install_complete");
        }
        CacheAction::Activate => {
            let removed = cache.activate().await.context("failed to activate cache")?;
            info!(version = %config.cache_version(), removed = ?removed, "cache_activated");
        }
        CacheAction::Fetch { url } => {
            let (response, source) =
                cache.fetch(&url).await.with_context(|| format!("failed to fetch {url}"))?;
            let from_cache = source == FetchSource::Cache;
            info!(
                url = %url,
                status = %response.status,
                from_cache = %from_cache,
                "cache_fetch_complete"
            );
            std::io::stdout().write_all(&response.body).context("failed to write body")?;
        }
    }
    Ok(())
}

async fn run_scanner(config: Config) -> anyhow::Result<()> {
    info!(
        config_file = %config.config_file(),
        station_id = %config.station_id(),
        validate_url = %config.validate_url(),
        cooldown_ms = %config.cooldown_ms(),
        decoder_command = %config.decoder_command(),
        preferred_resolution = %config.preferred_resolution(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let platform = Arc::new(SysfsMediaPlatform::new(config.sysfs_dir(), config.dev_dir()));
    let engine = Box::new(ZbarEngine::new(
        config.decoder_command(),
        config.decoder_args(),
        config.start_probe(),
    ));
    let client = Arc::new(
        HttpValidationClient::new(config.validate_url()).context("failed to build ledger client")?,
    );
    let display = Box::new(ConsoleDisplay::stdout());

    let (mut controller, events_rx) = ScanController::new(
        &config,
        platform,
        engine,
        client,
        Arc::new(TokioTimer),
        display,
        metrics.clone(),
    );

    // Start metrics reporter (lock-free reads)
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let reporter = metrics.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                reporter.report().log();
            }
        });
    }

    // Operator commands from stdin
    let console_tx = controller.events_tx();
    tokio::spawn(async move {
        run_operator_console(BufReader::new(tokio::io::stdin()), console_tx).await;
    });

    // Handle shutdown on Ctrl+C
    let shutdown_tx = controller.events_tx();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(ScanEvent::Shutdown).await;
    });

    if let Err(e) = controller.start().await {
        error!(error = %e, "scanner_start_failed");
        return Err(e).context("scanner could not start");
    }

    controller.run(events_rx).await;
    metrics.report().log();

    info!("snack-scanner shutdown complete");
    Ok(())
}
