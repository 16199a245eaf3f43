//! Typed errors raised while training, loading and scoring

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Model artifact not found at {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error("Model artifact is malformed: {reason}")]
    ArtifactFormat { reason: String },

    #[error("Unsupported artifact version {found} (expected {expected})")]
    UnsupportedArtifactVersion { found: u32, expected: u32 },

    #[error("Invalid transaction time '{value}': expected HH:MM:SS")]
    InvalidTime { value: String },

    #[error("Invalid transaction date '{value}'")]
    InvalidDate { value: String },

    #[error("Schema mismatch on column '{column}': {reason}")]
    SchemaMismatch { column: String, reason: String },

    #[error("Features cannot be scored: {reason}")]
    NonFiniteFeatures { reason: String },

    #[error("No rows available: {context}")]
    EmptyDataset { context: String },

    #[error("Training failed: {reason}")]
    Training { reason: String },

    #[error("Invalid request payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV processing error: {source}")]
    Csv {
        #[from]
        source: polars::error::PolarsError,
    },
}

impl SentinelError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by one record rather than by the service itself
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            SentinelError::InvalidTime { .. }
                | SentinelError::InvalidDate { .. }
                | SentinelError::SchemaMismatch { .. }
                | SentinelError::NonFiniteFeatures { .. }
                | SentinelError::InvalidPayload { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        // Every scoring failure is reported as a server-side failure to keep
        // the `{error}` contract of the prediction endpoint.
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for SentinelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type SentinelResult<T> = std::result::Result<T, SentinelError>;
