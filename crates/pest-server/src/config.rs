//! Server configuration

use anyhow::{Context, Result};
use pest_core::DEFAULT_PEST_THRESHOLD;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, read from `PEST_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP port for upload, directory, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Model manifest binding the artifact, labels and preprocessing constants
    #[serde(default = "default_model_manifest")]
    pub model_manifest: PathBuf,

    /// Versioned advisory dataset
    #[serde(default = "default_knowledge_base")]
    pub knowledge_base: PathBuf,

    /// Confidence a prediction must exceed to be reported as a pest
    #[serde(default = "default_pest_threshold")]
    pub pest_threshold: f32,

    /// Deadline for one classification, after which the result is discarded
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,

    /// Largest accepted upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "pest-server".to_string())
}

fn default_api_port() -> u16 {
    8000
}

fn default_model_manifest() -> PathBuf {
    PathBuf::from("data/model.json")
}

fn default_knowledge_base() -> PathBuf {
    PathBuf::from("data/pests.json")
}

fn default_pest_threshold() -> f32 {
    DEFAULT_PEST_THRESHOLD
}

fn default_inference_timeout_ms() -> u64 {
    5_000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("PEST").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid server configuration")
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}
