//! Fraud Sentinel: transaction risk clustering
//!
//! Offline training of a preprocessing + K-Means pipeline over engineered
//! transaction features, and a thin scoring layer that maps cluster ids to
//! risk interpretations for CLI, batch and HTTP callers.

pub mod api;
pub mod artifact;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod risk;
pub mod service;
pub mod telemetry;
pub mod viz;

// Re-export public items for easier access
pub use artifact::{ArtifactMetadata, PipelineArtifact};
pub use cli::Args;
pub use config::AppConfig;
pub use error::{SentinelError, SentinelResult};
pub use features::{engineer, FeatureSchema, RawRecord, TransactionInput};
pub use pipeline::{Pipeline, PipelineParams, TrainingReport};
pub use risk::{RiskTable, Verdict};
pub use service::ScoringService;

/// Common result type used at the application edge
pub type Result<T> = anyhow::Result<T>;
