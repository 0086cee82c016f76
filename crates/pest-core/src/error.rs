//! Error taxonomy for the identification pipeline
//!
//! Every failure path in the core returns one of these tagged variants so that
//! boundary layers can pick their own user-facing message and status code.

use thiserror::Error;

/// Errors produced by the pest identification core
#[derive(Debug, Error)]
pub enum PestError {
    /// Empty or missing image payload
    #[error("no image provided")]
    NoInput,

    /// Bytes are not a valid, supported image
    #[error("invalid image: {0}")]
    Decode(#[from] image::ImageError),

    /// Model artifact missing, corrupt or shape-incompatible (startup only)
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Forward computation failed or produced an unusable output
    #[error("inference failed: {0}")]
    Inference(String),

    /// Knowledge store lookup named a label that has no record
    #[error("unknown pest label: {0}")]
    UnknownLabel(String),

    /// Advisory dataset is unreadable or not total over the label set
    #[error("invalid knowledge base: {0}")]
    KnowledgeBase(String),

    /// Preprocessing or decision constants are out of range
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PestError {
    /// Stable tag for this error, used as a metrics label and API error code
    pub fn kind(&self) -> &'static str {
        match self {
            PestError::NoInput => "no_input",
            PestError::Decode(_) => "decode_error",
            PestError::ModelLoad(_) => "model_load_error",
            PestError::Inference(_) => "inference_error",
            PestError::UnknownLabel(_) => "unknown_label",
            PestError::KnowledgeBase(_) => "knowledge_base_error",
            PestError::Config(_) => "config_error",
        }
    }

    /// Whether the error was caused by the request payload rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PestError::NoInput | PestError::Decode(_) | PestError::UnknownLabel(_)
        )
    }
}

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, PestError>;
