//! HTTP scoring surface: `POST /predict` and `GET /health`

use crate::error::SentinelError;
use crate::features::RawRecord;
use crate::risk::Verdict;
use crate::service::ScoringService;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub type AppState = Arc<ScoringService>;

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub status: &'static str,
    pub cluster_assigned: Option<usize>,
    pub message: String,
    pub label: String,
    pub risk_level: String,
    pub action: String,
}

impl From<Verdict> for PredictResponse {
    fn from(verdict: Verdict) -> Self {
        let status = match verdict {
            Verdict::Clustered { .. } => "success",
            Verdict::ManualReview { .. } => "manual_review",
        };
        Self {
            status,
            cluster_assigned: verdict.cluster(),
            message: verdict.message(),
            label: verdict.label().to_string(),
            risk_level: verdict.risk_level().to_string(),
            action: verdict.action().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn predict(
    State(service): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictResponse>, SentinelError> {
    let Json(body) = payload.map_err(|e| SentinelError::InvalidPayload {
        reason: e.body_text(),
    })?;

    let verdict = RawRecord::from_json(&body)
        .and_then(|record| service.assess(&record))
        .map_err(|e| {
            warn!(error = %e, "Prediction failed");
            e
        })?;

    info!(
        cluster = ?verdict.cluster(),
        label = verdict.label(),
        "Prediction served"
    );
    Ok(Json(verdict.into()))
}
