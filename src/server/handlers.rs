//! HTTP request handlers
//!
//! Axum handlers for the prediction API. Each handler maps service results
//! to a status code and JSON body; nothing below this layer knows about HTTP.

use std::time::Instant;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::features::FeatureVector;
use crate::server::AppState;
use crate::server::service::Prediction;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body, `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorDetail>);

/// Liveness probe; does not touch the model.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Score one feature vector.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<FeatureVector>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(features) = payload.map_err(|rejection| {
        debug!("rejected predict body: {}", rejection.body_text());
        (rejection.status(), Json(ErrorDetail::new(rejection.body_text())))
    })?;

    let started = Instant::now();
    let result = state.service.predict(&features).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(prediction) => {
            state
                .metrics
                .record_prediction(&prediction.prediction.to_string(), elapsed);
            debug!(
                class = prediction.prediction,
                elapsed_ms = elapsed * 1000.0,
                "served prediction"
            );
            Ok(Json(prediction))
        }
        Err(err) => {
            state.metrics.record_prediction("error", elapsed);
            error!("prediction failed: {err}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorDetail::new(err.to_string())),
            ))
        }
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.export(),
    )
}
