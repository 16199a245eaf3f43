//! Configuration management: optional TOML file layered under `SENTINEL__*`
//! environment variables

use crate::artifact::DEFAULT_ARTIFACT_FILE;
use crate::model::ClusteringParams;
use crate::pipeline::PipelineParams;
use crate::risk::RiskTable;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/sentinel.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub risk: RiskTable,
}

/// Artifact location and training hyperparameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path of the persisted pipeline artifact
    pub artifact_path: PathBuf,
    /// Number of K-Means clusters
    pub clusters: usize,
    /// RNG seed for centroid initialization
    pub seed: u64,
    /// Maximum K-Means iterations
    pub max_iters: u64,
    /// K-Means convergence tolerance
    pub tolerance: f64,
    /// Neighbors used by the numeric imputer
    pub neighbors: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let clustering = ClusteringParams::default();
        Self {
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_FILE),
            clusters: clustering.n_clusters,
            seed: clustering.seed,
            max_iters: clustering.max_iters,
            tolerance: clustering.tolerance,
            neighbors: PipelineParams::default().n_neighbors,
        }
    }
}

impl ModelConfig {
    pub fn pipeline_params(&self) -> PipelineParams {
        PipelineParams {
            clustering: ClusteringParams {
                n_clusters: self.clusters,
                seed: self.seed,
                max_iters: self.max_iters,
                tolerance: self.tolerance,
            },
            n_neighbors: self.neighbors,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the default path when it exists, then the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH, false)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P, required: bool) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(Environment::with_prefix("SENTINEL").separator("__"))
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
