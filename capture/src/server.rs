//! HTTP API standing in for the desktop shell.
//!
//! Routes:
//!   GET  /api/health            → health check
//!   POST /api/connect           → (re)connect to a camera
//!   POST /api/capture           → capture a barcode-labelled image
//!   POST /api/test              → self-test capture
//!   GET  /api/history?limit=N   → newest capture records
//!   GET  /api/images/:name      → download a saved JPEG

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use scanshot_common::config::Config;
use scanshot_common::error::CaptureError;
use scanshot_common::history::{History, JsonHistory};
use scanshot_common::protocol::{
    CaptureRequest, CaptureResult, ConnectRequest, ConnectResponse, HealthResponse,
    HistoryResponse,
};

use crate::connection::{CameraTarget, ConnectionManager};
use crate::engine::CaptureEngine;

/// Shared state for route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    engine: Arc<Mutex<Option<Arc<CaptureEngine>>>>,
    history: Arc<JsonHistory>,
    busy: Arc<AtomicBool>,
    start_time: Instant,
}

impl AppState {
    fn engine(&self) -> Option<Arc<CaptureEngine>> {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Clears the busy flag when the capture finishes, however it finishes.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Start the HTTP server. Blocks until shutdown.
///
/// `engine` is the session established at startup, if any.
pub async fn run(
    config: Config,
    engine: Option<Arc<CaptureEngine>>,
    listen_addr: &str,
    shutdown: &'static AtomicBool,
) -> anyhow::Result<()> {
    let state = AppState {
        history: Arc::new(JsonHistory::in_dir(&config.save_dir)),
        config: Arc::new(config),
        engine: Arc::new(Mutex::new(engine)),
        busy: Arc::new(AtomicBool::new(false)),
        start_time: Instant::now(),
    };

    let app = router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    info!("HTTP API listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/connect", post(connect))
        .route("/api/capture", post(capture))
        .route("/api/test", post(self_test))
        .route("/api/history", get(history))
        .route("/api/images/{name}", get(download_image))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── route handlers ───────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connected: state.engine().is_some_and(|e| e.is_connected()),
    })
}

async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, StatusCode> {
    let config = state.config.clone();
    let slot = state.engine.clone();

    let connected = tokio::task::spawn_blocking(move || {
        let target = CameraTarget {
            ip: req.ip,
            port: req.port.unwrap_or(config.camera_port),
            rtsp_port: config.rtsp_port,
            username: req.username,
            password: req.password,
        };
        let connection = Arc::new(ConnectionManager::connect(target, config.connect_timeout()));
        let engine = Arc::new(crate::build_engine(&config, connection));
        let connected = engine.is_connected();
        let mut current = slot.lock().unwrap_or_else(|poisoned| {
            warn!("Session slot was poisoned, replacing it anyway");
            poisoned.into_inner()
        });
        // The replaced session is dropped here, off the async runtime.
        let _old = current.replace(engine);
        connected
    })
    .await
    .map_err(|e| {
        error!("Connect task failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ConnectResponse { connected }))
}

async fn capture(
    State(state): State<AppState>,
    Json(req): Json<CaptureRequest>,
) -> Result<Json<CaptureResult>, StatusCode> {
    run_capture(state, move |engine| engine.capture(&req.barcode, &req.description)).await
}

async fn self_test(State(state): State<AppState>) -> Result<Json<CaptureResult>, StatusCode> {
    run_capture(state, |engine| engine.self_test()).await
}

async fn run_capture<F>(state: AppState, job: F) -> Result<Json<CaptureResult>, StatusCode>
where
    F: FnOnce(&CaptureEngine) -> CaptureResult + Send + 'static,
{
    let Some(engine) = state.engine() else {
        return Ok(Json(CaptureResult::failure(&CaptureError::NotConnected)));
    };
    let guard = BusyGuard::acquire(&state.busy).ok_or(StatusCode::CONFLICT)?;

    let result = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        job(&engine)
    })
    .await
    .map_err(|e| {
        error!("Capture task failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.unwrap_or(state.config.history_limit);
    Json(HistoryResponse {
        total: state.history.count(),
        records: state.history.list(limit),
    })
}

async fn download_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    // Sanitise: prevent directory traversal
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !name.to_ascii_lowercase().ends_with(".jpg") {
        return Err(StatusCode::NOT_FOUND);
    }

    let file_path: PathBuf = state.config.save_dir.join(&name);
    if !file_path.exists() {
        return Err(StatusCode::NOT_FOUND);
    }

    let bytes = tokio::fs::read(&file_path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, "image/jpeg")],
        Body::from(bytes),
    ))
}
