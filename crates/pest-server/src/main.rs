//! Pest identification server
//!
//! Loads the classifier and advisory dataset once, then serves uploads until
//! interrupted.

use anyhow::{Context, Result};
use pest_core::{
    DecisionPolicy, InferenceService, KnowledgeBase, ModelManifest, OnnxClassifier, Preprocessor,
    ServiceMetrics, StructuredLogger,
};
use pest_server::{
    api,
    config::ServerConfig,
    health::{components, HealthRegistry},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pest-server");

    let config = ServerConfig::load()?;
    info!(
        instance = %config.instance_name,
        manifest = %config.model_manifest.display(),
        knowledge_base = %config.knowledge_base.display(),
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    for name in components::ALL {
        health_registry.register(name).await;
    }

    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    let policy = DecisionPolicy::with_threshold(config.pest_threshold)
        .context("Invalid pest threshold")?;
    info!(pest_threshold = policy.pest_threshold(), "Decision policy configured");

    let manifest = ModelManifest::load(&config.model_manifest).with_context(|| {
        format!(
            "Failed to load model manifest {}",
            config.model_manifest.display()
        )
    })?;
    let labels = manifest.label_set()?;

    let knowledge = KnowledgeBase::load(&config.knowledge_base, &labels).with_context(|| {
        format!(
            "Failed to load knowledge base {}",
            config.knowledge_base.display()
        )
    })?;
    metrics.set_knowledge_base_records(knowledge.len());
    health_registry.set_healthy(components::KNOWLEDGE_BASE).await;

    let classifier = match OnnxClassifier::from_manifest(&manifest) {
        Ok(classifier) => classifier,
        Err(e) => {
            error!(error = %e, "Model failed to load");
            health_registry
                .set_unhealthy(components::MODEL, e.to_string())
                .await;
            return Err(e).context("Failed to load classifier");
        }
    };
    logger.log_model_loaded(&manifest.version, labels.len(), classifier.checksum());

    let service = InferenceService::new(
        Preprocessor::new(manifest.input.clone())?,
        Arc::new(classifier),
        labels,
        policy,
    )?
    .with_logger(logger.clone());

    health_registry.set_model_version(&manifest.version).await;
    health_registry.set_healthy(components::MODEL).await;
    health_registry.set_healthy(components::CLASSIFIER).await;

    logger.log_startup(SERVICE_VERSION, &manifest.version, knowledge.version());

    let app_state = Arc::new(
        api::AppState::new(
            Arc::new(service),
            Arc::new(knowledge),
            health_registry.clone(),
        )
        .with_limits(config.inference_timeout(), config.max_upload_bytes),
    );

    health_registry.set_ready(true).await;

    tokio::select! {
        result = api::serve(config.api_port, app_state) => {
            if let Err(e) = &result {
                error!(error = %e, "API server stopped");
            }
            logger.log_shutdown("server stopped");
            result
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
            Ok(())
        }
    }
}
