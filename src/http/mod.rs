//! HTTP surface for submitting inquiries and managing catalog records.
//!
//! Mounts the intake routes and `/health` on an axum router bound to
//! loopback. The server shuts down gracefully when its
//! `CancellationToken` fires.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::intake::IntakeService;
use crate::pipeline::queue::JobQueue;
use crate::{AppError, Result};

/// Shared state handed to every request handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Submission and activation service.
    pub intake: IntakeService,
    /// Job transport, for dead-letter inspection.
    pub queue: JobQueue,
}

/// Build the application router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/inquiries", post(handlers::submit_inquiry))
        .route("/inquiries/{id}", get(handlers::get_inquiry))
        .route("/records/activate", post(handlers::activate_record))
        .route("/records/deactivate", post(handlers::deactivate_record))
        .route("/records/{item_ref}", get(handlers::get_record))
        .route("/jobs/failed", get(handlers::failed_jobs))
        .with_state(state)
}

/// Serve the API on `127.0.0.1:{config.http_port}` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Http` if the listener cannot bind or the server fails.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind {bind}: {err}")))?;
    serve_listener(listener, state, ct).await
}

/// Serve the API on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("listener has no local address: {err}")))?;
    info!(bind = %local, "starting HTTP intake API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("server error: {err}")))?;

    info!("HTTP intake API shut down");
    Ok(())
}
