//! Score post-processing and the pest/not-pest decision
//!
//! Converts logits to a probability distribution, picks the arg-max class and
//! gates it with a confidence threshold.

use crate::error::{PestError, Result};
use crate::models::{LabelSet, Prediction, ScoreVector};

/// Default confidence a prediction must strictly exceed to count as a pest.
///
/// Placeholder heuristic carried over from the first deployment, not a
/// calibrated operating point.
pub const DEFAULT_PEST_THRESHOLD: f32 = 0.5;

/// Numerically stable softmax; accumulates in f64
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Vec::new();
    }

    let exps: Vec<f64> = scores.iter().map(|&s| ((s - max) as f64).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| (e / sum) as f32).collect()
}

/// Index of the largest value; the first occurrence wins on ties
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, current)) if v <= current => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Decision parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pest_threshold: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            pest_threshold: DEFAULT_PEST_THRESHOLD,
        }
    }
}

impl DecisionPolicy {
    /// Build a policy with a custom threshold in [0, 1]
    pub fn with_threshold(pest_threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&pest_threshold) {
            return Err(PestError::Config(format!(
                "pest threshold {} must lie in [0, 1]",
                pest_threshold
            )));
        }
        Ok(Self { pest_threshold })
    }

    pub fn pest_threshold(&self) -> f32 {
        self.pest_threshold
    }

    /// Softmax over the scores, then pick the most probable label
    pub fn decide(&self, scores: &ScoreVector, labels: &LabelSet) -> Result<Prediction> {
        if scores.len() != labels.len() {
            return Err(PestError::Inference(format!(
                "score vector has {} entries but {} labels are configured",
                scores.len(),
                labels.len()
            )));
        }

        let probabilities = softmax(scores.as_slice());
        let index = argmax(&probabilities)
            .ok_or_else(|| PestError::Inference("empty score vector".to_string()))?;
        let label = labels
            .get(index)
            .cloned()
            .ok_or_else(|| PestError::Inference(format!("no label at index {}", index)))?;

        Ok(Prediction {
            label,
            index,
            confidence: probabilities[index],
        })
    }

    /// True iff the confidence strictly exceeds the threshold
    pub fn is_pest(&self, confidence: f32) -> bool {
        confidence > self.pest_threshold
    }
}
