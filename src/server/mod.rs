//! HTTP prediction server.
//!
//! Routes:
//! - `GET /health` liveness, independent of model state
//! - `POST /predict` score one feature vector
//! - `GET /metrics` Prometheus exposition
//!
//! Every request passes through a middleware that records its method,
//! matched route, status and latency.

mod handlers;
pub mod metrics;
pub mod service;

pub use handlers::{ApiError, ErrorDetail, HealthResponse};
pub use metrics::MetricsRegistry;
pub use service::{PredictError, Prediction, PredictionService};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{ConfigError, ServeConfig};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn from_config(config: &ServeConfig) -> Self {
        Self {
            service: Arc::new(PredictionService::new(config.model_path.clone())),
            metrics: Arc::new(MetricsRegistry::new(config.multiproc_dir.clone())),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/predict", post(handlers::predict))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();
    let response = next.run(request).await;
    state.metrics.record_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Bind `config.addr` and serve until Ctrl-C.
pub async fn serve(config: ServeConfig) -> Result<(), ServeError> {
    let listener = TcpListener::bind(config.addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: config.addr,
            source,
        })?;
    let state = AppState::from_config(&config);
    info!(
        addr = %config.addr,
        model = %state.service.model_path().display(),
        multiprocess = state.metrics.is_multiprocess(),
        "prediction server listening"
    );
    serve_on(listener, state).await
}

/// Serve on an already-bound listener until Ctrl-C.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), ServeError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("prediction server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler, run until the process is killed.
        std::future::pending::<()>().await;
    }
}
