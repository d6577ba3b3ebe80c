use thiserror::Error;
use visage_faceindex::IndexError;

/// Errors returned by recognition operations.
#[derive(Debug, Error)]
pub enum RecognizeError {
    /// Raised by a [`crate::FaceEmbedder`]; passed through unchanged.
    #[error("embed: {0}")]
    Embed(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("embedder model {embedder:?} does not match index model {index:?}")]
    ModelMismatch { embedder: String, index: String },

    #[error("embedder dimension {embedder} does not match index dimension {index}")]
    DimensionMismatch { embedder: usize, index: usize },

    #[error("invalid threshold {0}: must be finite and non-negative")]
    InvalidThreshold(f32),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("calibration: {0}")]
    Calibration(String),
}
