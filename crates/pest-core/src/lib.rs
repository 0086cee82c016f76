//! Core library for agricultural pest identification
//!
//! This crate provides:
//! - Image decoding and normalization to the classifier's input contract
//! - ONNX classifier inference
//! - Softmax/arg-max decision with a configurable pest threshold
//! - The read-only pest advisory knowledge base
//! - An inference facade and its observability

pub mod classifier;
pub mod decision;
pub mod error;
pub mod knowledge;
pub mod manifest;
pub mod models;
pub mod observability;
pub mod preprocess;
pub mod service;

pub use classifier::{Classifier, OnnxClassifier};
pub use decision::{DecisionPolicy, DEFAULT_PEST_THRESHOLD};
pub use error::{PestError, Result};
pub use knowledge::{CommonSpecies, KnowledgeBase, PestRecord};
pub use manifest::ModelManifest;
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use preprocess::{ImageTensor, PreprocessConfig, Preprocessor, ResizeFilter};
pub use service::InferenceService;
