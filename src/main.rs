#![forbid(unsafe_code)]

//! `catalog-intake` server binary.
//!
//! Bootstraps configuration and storage, re-dispatches inquiries left
//! active by a previous run, starts the job workers, and serves the HTTP
//! intake API until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use catalog_intake::config::GlobalConfig;
use catalog_intake::http::{self, AppState};
use catalog_intake::intake::IntakeService;
use catalog_intake::persistence;
use catalog_intake::pipeline::dispatcher::redispatch_active;
use catalog_intake::pipeline::queue::{spawn_job_workers, JobQueue};
use catalog_intake::pipeline::Pipeline;
use catalog_intake::{AppError, Result};

/// Upper bound on how long shutdown waits for in-flight jobs.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "catalog-intake", about = "Batch catalog intake server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Fail the first tenth of every inquiry's items.
    #[arg(long)]
    simulate_failure: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("catalog-intake server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.apply_env_overrides();
    if args.simulate_failure {
        config.pipeline.simulate_failure = true;
    }
    let config = Arc::new(config);
    info!(
        backend = ?config.storage.backend,
        workers = config.pipeline.workers,
        max_attempts = config.pipeline.max_attempts,
        simulate_failure = config.pipeline.simulate_failure,
        "configuration loaded"
    );

    // ── Open storage ────────────────────────────────────
    let stores = persistence::open_stores(&config).await?;

    // ── Start job workers ───────────────────────────────
    let ct = CancellationToken::new();
    let (queue, rx) = JobQueue::new();
    let pipeline = Arc::new(Pipeline::from_config(
        &config,
        Arc::clone(&stores.inquiries),
        Arc::clone(&stores.catalog),
    ));
    let workers_handle = spawn_job_workers(
        queue.clone(),
        rx,
        pipeline,
        config.pipeline.workers,
        ct.clone(),
    );
    info!("job workers started");

    // ── Recover inquiries interrupted by a previous run ──
    if config.pipeline.recover_on_startup {
        recover_on_startup(&stores, &queue).await;
    }

    // ── Start HTTP API ──────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        intake: IntakeService::new(
            Arc::clone(&stores.inquiries),
            Arc::clone(&stores.catalog),
            queue.clone(),
            config.intake.max_batch_items,
        ),
        queue: queue.clone(),
    });

    let http_ct = CancellationToken::new();
    let http_handle = {
        let http_ct = http_ct.clone();
        tokio::spawn(async move {
            if let Err(err) = http::serve_http(state, http_ct).await {
                error!(%err, "http server failed");
            }
        })
    };

    info!("catalog-intake ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");

    // Stop accepting submissions first, then let running jobs drain.
    http_ct.cancel();
    let _ = http_handle.await;

    match tokio::time::timeout(DRAIN_TIMEOUT, queue.wait_idle()).await {
        Ok(()) => info!("job queue drained"),
        Err(_) => warn!(
            in_flight = queue.in_flight(),
            "drain timed out; remaining work resumes on next start"
        ),
    }

    ct.cancel();
    let _ = workers_handle.await;

    let failed = queue.failed_jobs();
    if !failed.is_empty() {
        warn!(count = failed.len(), "units failed permanently during this run");
    }
    info!("catalog-intake shut down");

    Ok(())
}

/// Re-dispatch inquiries a previous run left `ACTIVE`.
async fn recover_on_startup(stores: &persistence::Stores, queue: &JobQueue) {
    let recovery = redispatch_active(stores.inquiries.as_ref(), queue)
        .instrument(tracing::info_span!("startup_recovery"));

    match recovery.await {
        Ok(0) => {}
        Ok(count) => info!(count, "queued interrupted inquiries for dispatch"),
        Err(err) => error!(%err, "startup recovery failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
