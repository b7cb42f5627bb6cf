//! HTTP daemon: receives hook events and serves the game state
//!
//! Every request that mutates the world takes the engine lock, applies the
//! event, serializes the snapshot while still holding the lock and queues it
//! for the writer. Snapshots therefore reach the writer in tick order and
//! never reflect a half-applied event.

pub mod snapshot;

use crate::config::CliRtsConfig;
use crate::errors::{CliRtsError, Result};
use crate::event::EventEnvelope;
use crate::state::{now_ms, Engine};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use snapshot::{SnapshotSender, SnapshotWriter};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared by every request handler and the sweeper
#[derive(Clone)]
pub struct DaemonState {
    engine: Arc<Mutex<Engine>>,
    snapshots: SnapshotSender,
}

impl DaemonState {
    pub fn new(engine: Engine, snapshots: SnapshotSender) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            snapshots,
        }
    }

    /// Queue the current state; called with the engine lock held
    fn queue_snapshot(&self, engine: &Engine) {
        match engine.state.to_snapshot() {
            Ok(bytes) => {
                if !self.snapshots.submit(bytes) {
                    tracing::warn!("Snapshot writer stopped, dropping snapshot");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize snapshot"),
        }
    }
}

/// Request-level failures, rendered as `{ok:false, error}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<CliRtsError> for ApiError {
    fn from(e: CliRtsError) -> Self {
        match e {
            CliRtsError::InvalidPayload(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "ok": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Decode a POST body into `(eventType, payload)`
fn parse_envelope(body: &[u8]) -> Result<(String, Value)> {
    let envelope: EventEnvelope = serde_json::from_slice(body)
        .map_err(|e| CliRtsError::InvalidPayload(e.to_string()))?;
    let payload = match envelope.payload {
        Some(Value::Null) | None => Value::Object(Default::default()),
        Some(payload) => payload,
    };
    Ok((envelope.event_type, payload))
}

async fn post_event(
    State(state): State<DaemonState>,
    body: Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    let (event_type, payload) = parse_envelope(&body)?;

    let mut engine = state.engine.lock().await;
    let event = engine.handle_event(&event_type, payload);
    let tick = engine.state.tick;
    state.queue_snapshot(&engine);
    drop(engine);

    tracing::debug!(event_type = %event_type, tick, event_id = %event.id, "Event applied");
    Ok(Json(json!({ "ok": true, "tick": tick, "event": event.id })))
}

async fn get_state(State(state): State<DaemonState>) -> std::result::Result<Response, ApiError> {
    let engine = state.engine.lock().await;
    let bytes = engine.state.to_snapshot().map_err(CliRtsError::from)?;
    drop(engine);
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

async fn health(State(state): State<DaemonState>) -> Json<Value> {
    let tick = state.engine.lock().await.state.tick;
    Json(json!({ "ok": true, "tick": tick }))
}

/// Build the daemon router
///
/// - `POST /events` apply one hook event
/// - `GET /state` full game state
/// - `GET /health` liveness plus current tick
pub fn build_router(state: DaemonState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/events", post(post_event))
        .route("/state", get(get_state))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically remove sub-agents whose despawn window has passed
async fn sweep_despawns(state: DaemonState, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut engine = state.engine.lock().await;
                let removed = engine.sweep_despawns(now_ms());
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        pending = engine.pending_despawns(),
                        "Despawned units removed"
                    );
                    state.queue_snapshot(&engine);
                }
            }
        }
    }
}

/// Resolve once SIGINT or SIGTERM arrives, yielding the signal's name
///
/// Handlers are registered before the future is returned, so a signal sent
/// right after this call is not missed.
fn shutdown_signal() -> impl std::future::Future<Output = &'static str> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| tracing::warn!(error = %e, "Could not listen for SIGTERM"))
        .ok();

    async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match terminate.as_mut() {
                Some(sig) => {
                    sig.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = interrupt => "SIGINT",
            () = terminate => "SIGTERM",
        }
    }
}

/// Run the daemon until SIGINT or SIGTERM
///
/// # Errors
///
/// Returns `CliRtsError::Bind` when the address is taken (typically another
/// daemon), or an I/O error if the state directory cannot be created.
pub async fn start(config: &CliRtsConfig, port: u16) -> Result<()> {
    let root = std::env::current_dir()?;
    let snapshot_path = config.state.snapshot_path(&root);
    if let Some(dir) = snapshot_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let addr = format!("{}:{}", config.daemon.host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| CliRtsError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let engine = Engine::new(&root.to_string_lossy(), config.despawn.delay_ms);
    let writer = SnapshotWriter::spawn(snapshot_path.clone());
    writer.submit(engine.state.to_snapshot()?);
    writer.flush().await;

    let state = DaemonState::new(engine, writer.sender());
    let cancel = CancellationToken::new();

    let sweeper = tokio::spawn(sweep_despawns(
        state.clone(),
        Duration::from_millis(config.despawn.sweep_interval_ms),
        cancel.clone(),
    ));

    let signal_cancel = cancel.clone();
    let signalled = shutdown_signal();
    tokio::spawn(async move {
        let name = signalled.await;
        tracing::info!(signal = name, "Shutting down");
        signal_cancel.cancel();
    });

    tracing::info!(
        %addr,
        snapshot = %snapshot_path.display(),
        "cli-rts daemon listening"
    );
    eprintln!("cli-rts daemon listening on http://{addr}");
    eprintln!("Writing state to {}", snapshot_path.display());

    let shutdown = cancel.clone();
    let served = axum::serve(listener, build_router(state, config.daemon.max_body_bytes))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Despawn sweeper task failed");
    }
    let stats = writer.shutdown().await;
    tracing::info!(
        written = stats.written,
        failed = stats.failed,
        "Daemon stopped"
    );

    served.map_err(|e| CliRtsError::Serve(e.to_string()))
}
