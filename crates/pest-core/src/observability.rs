//! Observability infrastructure for the identification service
//!
//! Provides:
//! - Prometheus metrics (preprocessing/inference latency, outcome counters, model version)
//! - Structured logging of service events with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    preprocess_latency_seconds: Histogram,
    inference_latency_seconds: Histogram,
    classifications: IntCounter,
    pests_detected: IntCounter,
    classification_errors: IntCounterVec,
    slow_inferences: IntCounter,
    model_version_info: GaugeVec,
    knowledge_base_records: IntGauge,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            preprocess_latency_seconds: register_histogram!(
                "pest_service_preprocess_latency_seconds",
                "Time spent decoding and normalizing uploaded images",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register preprocess_latency_seconds"),

            inference_latency_seconds: register_histogram!(
                "pest_service_inference_latency_seconds",
                "Time spent running the classifier forward pass",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            classifications: register_int_counter!(
                "pest_service_classifications_total",
                "Total number of successful classifications"
            )
            .expect("Failed to register classifications_total"),

            pests_detected: register_int_counter!(
                "pest_service_pests_detected_total",
                "Classifications whose confidence exceeded the pest threshold"
            )
            .expect("Failed to register pests_detected_total"),

            classification_errors: register_int_counter_vec!(
                "pest_service_classification_errors_total",
                "Failed classifications by error kind",
                &["kind"]
            )
            .expect("Failed to register classification_errors_total"),

            slow_inferences: register_int_counter!(
                "pest_service_slow_inferences_total",
                "Forward passes slower than the inference latency target"
            )
            .expect("Failed to register slow_inferences_total"),

            model_version_info: register_gauge_vec!(
                "pest_service_model_version_info",
                "Information about the loaded classifier",
                &["version", "classes"]
            )
            .expect("Failed to register model_version_info"),

            knowledge_base_records: register_int_gauge!(
                "pest_service_knowledge_base_records",
                "Number of advisory records loaded"
            )
            .expect("Failed to register knowledge_base_records"),
        }
    }
}

/// Handle to the process-wide service metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a handle, registering the collectors on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_preprocess_latency(&self, duration_secs: f64) {
        self.inner().preprocess_latency_seconds.observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    /// Count a successful classification
    pub fn record_classification(&self, is_pest: bool) {
        self.inner().classifications.inc();
        if is_pest {
            self.inner().pests_detected.inc();
        }
    }

    pub fn inc_classification_errors(&self, kind: &str) {
        self.inner()
            .classification_errors
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_slow_inferences(&self) {
        self.inner().slow_inferences.inc();
    }

    pub fn set_model_version(&self, version: &str, classes: usize) {
        let classes = classes.to_string();
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version, classes.as_str()])
            .set(1.0);
    }

    pub fn set_knowledge_base_records(&self, count: usize) {
        self.inner().knowledge_base_records.set(count as i64);
    }
}

/// Structured logger for service events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, model_version: &str, knowledge_version: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            service_version = %version,
            model_version = %model_version,
            knowledge_version = %knowledge_version,
            "Pest identification service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Pest identification service shutting down"
        );
    }

    pub fn log_model_loaded(&self, version: &str, classes: usize, checksum: Option<&str>) {
        info!(
            event = "model_loaded",
            instance = %self.instance,
            model_version = %version,
            classes = classes,
            checksum = checksum.unwrap_or("unverified"),
            "Classifier ready"
        );
    }

    pub fn log_classification(
        &self,
        label: &str,
        confidence: f32,
        is_pest: bool,
        model_version: &str,
        elapsed_ms: f64,
    ) {
        info!(
            event = "classification_completed",
            instance = %self.instance,
            label = %label,
            confidence = confidence,
            is_pest = is_pest,
            model_version = %model_version,
            elapsed_ms = elapsed_ms,
            "Prediction complete: {} with confidence {:.2}%",
            label,
            confidence * 100.0
        );
    }

    pub fn log_classification_failed(&self, kind: &str, error: &str) {
        if kind == "no_input" || kind == "decode_error" {
            info!(
                event = "classification_failed",
                instance = %self.instance,
                kind = %kind,
                error = %error,
                "Rejected classification request"
            );
        } else {
            warn!(
                event = "classification_failed",
                instance = %self.instance,
                kind = %kind,
                error = %error,
                "Classification failed"
            );
        }
    }
}
