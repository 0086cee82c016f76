//! Core data models for pest identification

use crate::error::{PestError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;

/// Class ordering of the reference deployment's classifier
pub const REFERENCE_LABELS: [&str; 12] = [
    "Ants",
    "Bees",
    "Beetles",
    "Caterpillars",
    "Earthworms",
    "Earwigs",
    "Grasshoppers",
    "Moths",
    "Slugs",
    "Snails",
    "Wasps",
    "Weevils",
];

/// Name of a pest species the classifier can recognize
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ClassLabel {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClassLabel {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Ordered set of class labels; position `i` names output index `i` of the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<ClassLabel>,
}

impl LabelSet {
    /// Build a label set, rejecting empty, blank or duplicate names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<ClassLabel> = names.into_iter().map(|n| ClassLabel::new(n)).collect();

        if labels.is_empty() {
            return Err(PestError::Config("label set is empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if label.as_str().trim().is_empty() {
                return Err(PestError::Config("label set contains a blank label".to_string()));
            }
            if !seen.insert(label.as_str()) {
                return Err(PestError::Config(format!("duplicate label '{}'", label)));
            }
        }

        Ok(Self { labels })
    }

    /// The twelve-class ordering of the reference deployment
    pub fn reference() -> Self {
        Self {
            labels: REFERENCE_LABELS.iter().map(|n| ClassLabel::from(*n)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClassLabel> {
        self.labels.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.as_str() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassLabel> {
        self.labels.iter()
    }
}

/// Unnormalized per-class scores (logits) in label order
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    /// Wrap raw logits, checking the length against the expected class count
    pub fn new(logits: Vec<f32>, expected_classes: usize) -> Result<Self> {
        if logits.len() != expected_classes {
            return Err(PestError::Inference(format!(
                "model produced {} scores, expected {}",
                logits.len(),
                expected_classes
            )));
        }
        if let Some(i) = logits.iter().position(|v| !v.is_finite()) {
            return Err(PestError::Inference(format!(
                "model produced a non-finite score at index {}",
                i
            )));
        }
        Ok(Self(logits))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Top class and its probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: ClassLabel,
    pub index: usize,
    pub confidence: f32,
}

/// Outcome of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub prediction: Prediction,
    pub is_pest: bool,
    /// Key into the knowledge store for the advisory content
    pub advisory_ref: ClassLabel,
}
