//! Pest classifier

mod onnx;

pub use onnx::{OnnxClassifier, SLOW_INFERENCE_MS};

use crate::error::Result;
use crate::models::ScoreVector;
use crate::preprocess::ImageTensor;

/// Maps a normalized image tensor to per-class logits
///
/// Implementations hold frozen parameters and must be safe to call from many
/// threads at once without shared mutable scratch state.
pub trait Classifier: Send + Sync {
    /// Run a forward pass over a `1x3xHxW` tensor
    fn infer(&self, input: &ImageTensor) -> Result<ScoreVector>;

    /// Length of the score vector this classifier produces
    fn num_classes(&self) -> usize;

    /// Version string of the loaded parameters
    fn model_version(&self) -> &str;
}
