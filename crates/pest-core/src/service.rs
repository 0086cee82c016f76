//! Inference service facade
//!
//! Composes decoding, classification and the pest decision for a single
//! request. One instance is built at startup and shared by reference.

use crate::classifier::Classifier;
use crate::decision::DecisionPolicy;
use crate::error::{PestError, Result};
use crate::models::{ClassificationResult, LabelSet};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::preprocess::Preprocessor;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Immutable identification pipeline
pub struct InferenceService {
    preprocessor: Preprocessor,
    classifier: Arc<dyn Classifier>,
    labels: LabelSet,
    policy: DecisionPolicy,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl InferenceService {
    /// Assemble a service; the classifier must score exactly one class per label
    pub fn new(
        preprocessor: Preprocessor,
        classifier: Arc<dyn Classifier>,
        labels: LabelSet,
        policy: DecisionPolicy,
    ) -> Result<Self> {
        if classifier.num_classes() != labels.len() {
            return Err(PestError::ModelLoad(format!(
                "classifier produces {} scores but {} labels are configured",
                classifier.num_classes(),
                labels.len()
            )));
        }

        let metrics = ServiceMetrics::new();
        metrics.set_model_version(classifier.model_version(), labels.len());

        Ok(Self {
            preprocessor,
            classifier,
            labels,
            policy,
            metrics,
            logger: StructuredLogger::new("local"),
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn model_version(&self) -> &str {
        self.classifier.model_version()
    }

    /// Classify one image
    pub fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationResult> {
        let start = Instant::now();

        match self.run(image_bytes) {
            Ok(result) => {
                self.metrics.record_classification(result.is_pest);
                self.logger.log_classification(
                    result.prediction.label.as_str(),
                    result.prediction.confidence,
                    result.is_pest,
                    self.model_version(),
                    start.elapsed().as_secs_f64() * 1000.0,
                );
                Ok(result)
            }
            Err(e) => {
                self.metrics.inc_classification_errors(e.kind());
                self.logger
                    .log_classification_failed(e.kind(), &e.to_string());
                Err(e)
            }
        }
    }

    fn run(&self, image_bytes: &[u8]) -> Result<ClassificationResult> {
        if image_bytes.is_empty() {
            return Err(PestError::NoInput);
        }

        let preprocess_start = Instant::now();
        let tensor = self.preprocessor.prepare(image_bytes)?;
        self.metrics
            .observe_preprocess_latency(preprocess_start.elapsed().as_secs_f64());
        debug!(shape = ?tensor.shape(), "Input tensor prepared");

        let inference_start = Instant::now();
        let scores = self.classifier.infer(&tensor)?;
        self.metrics
            .observe_inference_latency(inference_start.elapsed().as_secs_f64());

        let prediction = self.policy.decide(&scores, &self.labels)?;
        let is_pest = self.policy.is_pest(prediction.confidence);

        Ok(ClassificationResult {
            advisory_ref: prediction.label.clone(),
            prediction,
            is_pest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreVector;
    use crate::preprocess::tests::solid_png;
    use crate::preprocess::{ImageTensor, PreprocessConfig};

    /// Classifier returning fixed logits regardless of input
    struct FixedLogits {
        logits: Vec<f32>,
    }

    impl Classifier for FixedLogits {
        fn infer(&self, _input: &ImageTensor) -> Result<ScoreVector> {
            ScoreVector::new(self.logits.clone(), self.logits.len())
        }

        fn num_classes(&self) -> usize {
            self.logits.len()
        }

        fn model_version(&self) -> &str {
            "fixture"
        }
    }

    /// Classifier that always fails its forward pass
    struct Broken;

    impl Classifier for Broken {
        fn infer(&self, input: &ImageTensor) -> Result<ScoreVector> {
            Err(PestError::Inference(format!("unexpected rank for {:?}", input.shape())))
        }

        fn num_classes(&self) -> usize {
            12
        }

        fn model_version(&self) -> &str {
            "broken"
        }
    }

    fn service(classifier: Arc<dyn Classifier>) -> InferenceService {
        InferenceService::new(
            Preprocessor::new(PreprocessConfig::reference()).unwrap(),
            classifier,
            LabelSet::reference(),
            DecisionPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_class_count_mismatch_rejected() {
        let result = InferenceService::new(
            Preprocessor::new(PreprocessConfig::reference()).unwrap(),
            Arc::new(FixedLogits { logits: vec![0.0; 5] }),
            LabelSet::reference(),
            DecisionPolicy::default(),
        );
        assert!(matches!(result, Err(PestError::ModelLoad(_))));
    }

    #[test]
    fn test_empty_bytes_is_no_input() {
        let svc = service(Arc::new(FixedLogits { logits: vec![0.0; 12] }));
        assert!(matches!(svc.classify(&[]), Err(PestError::NoInput)));
    }

    #[test]
    fn test_non_image_bytes_is_decode_error() {
        let svc = service(Arc::new(FixedLogits { logits: vec![0.0; 12] }));
        let result = svc.classify(b"this is a text file, not a photograph of a pest");
        assert!(matches!(result, Err(PestError::Decode(_))));
    }

    #[test]
    fn test_inference_failure_is_tagged() {
        let svc = service(Arc::new(Broken));
        let err = svc.classify(&solid_png(32, 32, [1, 2, 3])).unwrap_err();
        assert_eq!(err.kind(), "inference_error");
    }

    #[test]
    fn test_uniform_logits_not_a_pest() {
        let svc = service(Arc::new(FixedLogits { logits: vec![0.0; 12] }));
        let result = svc.classify(&solid_png(32, 32, [9, 9, 9])).unwrap();

        assert_eq!(result.prediction.index, 0);
        assert_eq!(result.prediction.label.as_str(), "Ants");
        assert!((result.prediction.confidence - 1.0 / 12.0).abs() < 1e-6);
        assert!(!result.is_pest);
        assert_eq!(result.advisory_ref, result.prediction.label);
    }

    #[test]
    fn test_confident_prediction_is_pest() {
        let mut logits = vec![0.0; 12];
        logits[7] = 10.0;
        let svc = service(Arc::new(FixedLogits { logits }));
        let result = svc.classify(&solid_png(64, 48, [200, 10, 10])).unwrap();

        assert_eq!(result.prediction.label.as_str(), "Moths");
        assert!(result.is_pest);
        assert_eq!(result.advisory_ref.as_str(), "Moths");
    }

    #[test]
    fn test_custom_threshold_applied() {
        let mut logits = vec![0.0; 12];
        logits[3] = 4.0;
        let svc = InferenceService::new(
            Preprocessor::new(PreprocessConfig::reference()).unwrap(),
            Arc::new(FixedLogits { logits }),
            LabelSet::reference(),
            DecisionPolicy::with_threshold(0.95).unwrap(),
        )
        .unwrap();

        let result = svc.classify(&solid_png(16, 16, [0, 0, 0])).unwrap();
        assert_eq!(result.prediction.label.as_str(), "Caterpillars");
        assert!(result.prediction.confidence < 0.95);
        assert!(!result.is_pest);
    }
}
