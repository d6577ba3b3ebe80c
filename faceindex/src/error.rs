use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("faceindex: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("faceindex: embedding contains a non-finite value at {position}")]
    NonFinite { position: usize },

    #[error("faceindex: index built for model {stored:?}, active model is {active:?}")]
    ModelMismatch { stored: String, active: String },

    #[error("faceindex: batch length mismatch: {labels} labels, {embeddings} embeddings")]
    BatchLengthMismatch { labels: usize, embeddings: usize },

    #[error("faceindex: {what} is {len} bytes, maximum is {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("faceindex: invalid config: {0}")]
    InvalidConfig(String),

    #[error("faceindex: {0}")]
    Io(String),

    #[error("faceindex: invalid format: {0}")]
    InvalidFormat(String),
}
