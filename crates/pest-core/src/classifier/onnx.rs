//! ONNX inference using tract
//!
//! Runs the exported pest CNN with the input fact pinned to the manifest's
//! `1x3xHxW` shape. The optimized plan is built once and only read afterwards.

use super::Classifier;
use crate::error::{PestError, Result};
use crate::manifest::ModelManifest;
use crate::models::ScoreVector;
use crate::observability::ServiceMetrics;
use crate::preprocess::ImageTensor;
use std::fmt::Display;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Inference latency above which a warning is logged
pub const SLOW_INFERENCE_MS: u128 = 250;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// CNN classifier backed by a frozen ONNX export
pub struct OnnxClassifier {
    model: TractModel,
    input_shape: [usize; 4],
    num_classes: usize,
    version: String,
    checksum: Option<String>,
    metrics: ServiceMetrics,
}

impl OnnxClassifier {
    /// Load the artifact named by a manifest, verifying checksum and shapes
    pub fn from_manifest(manifest: &ModelManifest) -> Result<Self> {
        let labels = manifest.label_set()?;
        let artifact = manifest.read_artifact()?;
        let mut classifier = Self::from_bytes(
            &artifact.bytes,
            manifest.input.input_shape(),
            labels.len(),
            manifest.version.clone(),
        )?;
        classifier.checksum = Some(artifact.checksum);
        Ok(classifier)
    }

    /// Build a classifier from raw ONNX bytes
    pub fn from_bytes(
        model_bytes: &[u8],
        input_shape: [usize; 4],
        num_classes: usize,
        version: impl Into<String>,
    ) -> Result<Self> {
        let model = Self::load_model(model_bytes, input_shape, num_classes)?;
        let version = version.into();

        info!(
            version = %version,
            input_shape = ?input_shape,
            classes = num_classes,
            "Classifier loaded"
        );

        Ok(Self {
            model,
            input_shape,
            num_classes,
            version,
            checksum: None,
            metrics: ServiceMetrics::new(),
        })
    }

    /// Parse, pin the input shape, optimize and check the output shape
    fn load_model(
        model_bytes: &[u8],
        input_shape: [usize; 4],
        num_classes: usize,
    ) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .map_err(|e| load_error("failed to parse ONNX model", e))?
            .with_input_fact(0, f32::fact(input_shape).into())
            .map_err(|e| load_error("failed to set input shape", e))?
            .into_optimized()
            .map_err(|e| load_error("failed to optimize model", e))?;

        let output_shape = model
            .output_fact(0)
            .map_err(|e| load_error("model has no output", e))?
            .shape
            .as_concrete()
            .map(|dims| dims.to_vec());

        match output_shape {
            Some(dims) if dims == [1, num_classes] => {}
            Some(dims) => {
                return Err(PestError::ModelLoad(format!(
                    "model output shape {:?} does not match [1, {}]",
                    dims, num_classes
                )))
            }
            None => {
                return Err(PestError::ModelLoad(
                    "model output shape is not fully determined".to_string(),
                ))
            }
        }

        model
            .into_runnable()
            .map_err(|e| load_error("failed to create runnable model", e))
    }

    /// SHA256 of the artifact, when loaded through a manifest
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
}

impl Classifier for OnnxClassifier {
    fn infer(&self, input: &ImageTensor) -> Result<ScoreVector> {
        if input.shape() != self.input_shape {
            return Err(PestError::Inference(format!(
                "input tensor shape {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let start = Instant::now();
        let tensor: Tensor = input.as_array().clone().into();

        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| PestError::Inference(format!("forward pass failed: {:#}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| PestError::Inference("model produced no output".to_string()))?;
        let logits: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| PestError::Inference(format!("unexpected output type: {:#}", e)))?
            .iter()
            .copied()
            .collect();

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            self.metrics.inc_slow_inferences();
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Inference exceeded {}ms target", SLOW_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, "Inference completed");
        }

        ScoreVector::new(logits, self.num_classes)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}

fn load_error(stage: &str, err: impl Display) -> PestError {
    PestError::ModelLoad(format!("{}: {:#}", stage, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::compute_checksum;
    use crate::preprocess::tests::solid_png;
    use crate::preprocess::{PreprocessConfig, Preprocessor};
    use prost::Message;
    use std::fs;
    use tempfile::TempDir;
    use tract_onnx::pb;
    use tract_onnx::prelude::tract_ndarray::Array4;

    const REFERENCE_SHAPE: [usize; 4] = [1, 3, 300, 300];

    fn float_value(name: &str) -> pb::ValueInfoProto {
        pb::ValueInfoProto {
            name: name.to_string(),
            r#type: Some(pb::TypeProto {
                value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                    elem_type: pb::tensor_proto::DataType::Float as i32,
                    shape: None,
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn node(op_type: &str, inputs: &[&str], output: &str) -> pb::NodeProto {
        pb::NodeProto {
            op_type: op_type.to_string(),
            input: inputs.iter().map(|i| i.to_string()).collect(),
            output: vec![output.to_string()],
            ..Default::default()
        }
    }

    fn linear_weights(classes: usize) -> Vec<f32> {
        (0..3 * classes).map(|i| ((i % 7) as f32 - 3.0) * 0.25).collect()
    }

    /// Channel means through a `3 x classes` linear layer, serialized as ONNX
    fn pooled_linear_model(classes: usize) -> Vec<u8> {
        let graph = pb::GraphProto {
            name: "pooled_linear".to_string(),
            node: vec![
                node("GlobalAveragePool", &["input"], "pooled"),
                node("Flatten", &["pooled"], "flat"),
                node("MatMul", &["flat", "weights"], "logits"),
            ],
            initializer: vec![pb::TensorProto {
                name: "weights".to_string(),
                dims: vec![3, classes as i64],
                data_type: pb::tensor_proto::DataType::Float as i32,
                float_data: linear_weights(classes),
                ..Default::default()
            }],
            input: vec![float_value("input")],
            output: vec![float_value("logits")],
            ..Default::default()
        };

        pb::ModelProto {
            ir_version: 7,
            opset_import: vec![pb::OperatorSetIdProto {
                domain: String::new(),
                version: 13,
            }],
            graph: Some(graph),
            ..Default::default()
        }
        .encode_to_vec()
    }

    #[test]
    fn test_forward_pass_on_preprocessed_photo() {
        let classifier =
            OnnxClassifier::from_bytes(&pooled_linear_model(12), REFERENCE_SHAPE, 12, "linear")
                .unwrap();
        assert_eq!(classifier.num_classes(), 12);
        assert_eq!(classifier.model_version(), "linear");

        let preprocessor = Preprocessor::new(PreprocessConfig::reference()).unwrap();
        let tensor = preprocessor
            .prepare(&solid_png(64, 48, [200, 120, 40]))
            .unwrap();
        let scores = classifier.infer(&tensor).unwrap();

        let logits = scores.as_slice();
        assert_eq!(logits.len(), 12);
        assert!(logits.iter().all(|l| l.is_finite()));

        let pixels = (300 * 300) as f32;
        let means: Vec<f32> = (0..3)
            .map(|c| {
                tensor
                    .as_array()
                    .index_axis(tract_ndarray::Axis(1), c)
                    .sum()
                    / pixels
            })
            .collect();
        let weights = linear_weights(12);
        for (j, logit) in logits.iter().enumerate() {
            let expected: f32 = (0..3).map(|c| means[c] * weights[c * 12 + j]).sum();
            assert!(
                (logit - expected).abs() < 1e-4,
                "class {}: got {}, expected {}",
                j,
                logit,
                expected
            );
        }
    }

    #[test]
    fn test_wrong_class_count_is_model_load_error() {
        let err = OnnxClassifier::from_bytes(&pooled_linear_model(10), REFERENCE_SHAPE, 12, "v1")
            .err()
            .unwrap();
        assert!(matches!(err, PestError::ModelLoad(_)));
        assert!(err.to_string().contains("[1, 10]"), "{}", err);
    }

    #[test]
    fn test_mismatched_input_is_inference_error() {
        let classifier =
            OnnxClassifier::from_bytes(&pooled_linear_model(12), REFERENCE_SHAPE, 12, "v1")
                .unwrap();
        let small = ImageTensor::from_array(Array4::zeros((1, 3, 32, 32)));
        assert!(matches!(
            classifier.infer(&small),
            Err(PestError::Inference(_))
        ));
    }

    #[test]
    fn test_manifest_load_records_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let bytes = pooled_linear_model(12);
        fs::write(temp_dir.path().join("best_model.onnx"), &bytes).unwrap();
        let json = serde_json::json!({
            "version": "2.1.0",
            "artifact": "best_model.onnx",
            "sha256": compute_checksum(&bytes),
            "labels": crate::models::REFERENCE_LABELS,
        })
        .to_string();
        let manifest = ModelManifest::from_json_str(&json, temp_dir.path()).unwrap();

        let classifier = OnnxClassifier::from_manifest(&manifest).unwrap();
        assert_eq!(classifier.model_version(), "2.1.0");
        assert_eq!(classifier.checksum(), Some(compute_checksum(&bytes).as_str()));
    }

    #[test]
    fn test_unparseable_bytes_is_model_load_error() {
        let result = OnnxClassifier::from_bytes(b"definitely not onnx", [1, 3, 300, 300], 12, "v1");
        assert!(matches!(result, Err(PestError::ModelLoad(_))));
    }

    #[test]
    fn test_empty_bytes_is_model_load_error() {
        let result = OnnxClassifier::from_bytes(&[], [1, 3, 300, 300], 12, "v1");
        assert!(matches!(result, Err(PestError::ModelLoad(_))));
    }

    #[test]
    fn test_manifest_with_missing_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let json = serde_json::json!({
            "version": "1.0.0",
            "artifact": "best_model.onnx",
            "labels": crate::models::REFERENCE_LABELS,
        })
        .to_string();
        let manifest = ModelManifest::from_json_str(&json, temp_dir.path()).unwrap();

        assert!(matches!(
            OnnxClassifier::from_manifest(&manifest),
            Err(PestError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_manifest_with_corrupt_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let corrupt = b"\x08\x07\x12\x04junk";
        fs::write(temp_dir.path().join("best_model.onnx"), corrupt).unwrap();
        let json = serde_json::json!({
            "version": "1.0.0",
            "artifact": "best_model.onnx",
            "sha256": compute_checksum(corrupt),
            "labels": crate::models::REFERENCE_LABELS,
        })
        .to_string();
        let manifest = ModelManifest::from_json_str(&json, temp_dir.path()).unwrap();

        let err = OnnxClassifier::from_manifest(&manifest).err().unwrap();
        assert_eq!(err.kind(), "model_load_error");
    }
}
