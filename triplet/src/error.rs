use std::error::Error as StdError;

use thiserror::Error;
use visage_metric::MetricError;

/// Errors returned by sampling, mining and training.
#[derive(Debug, Error)]
pub enum TripletError {
    /// The dataset has fewer distinct classes than one batch needs.
    #[error("dataset exhausted: {classes} distinct classes, need {required} per batch")]
    DatasetExhausted { classes: usize, required: usize },

    #[error("invalid sampler config: {0}")]
    InvalidConfig(String),

    #[error("margin must be positive and finite, got {0}")]
    InvalidMargin(f32),

    #[error("batch length mismatch: {embeddings} embeddings, {labels} labels")]
    LengthMismatch { embeddings: usize, labels: usize },

    #[error("triplet index {index} out of range for a batch of {len}")]
    TripletOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Metric(#[from] MetricError),

    /// Failure raised by the embedding model or its checkpoint sink,
    /// passed through unchanged.
    #[error("model: {0}")]
    Model(#[source] Box<dyn StdError + Send + Sync>),
}
