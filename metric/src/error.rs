use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("metric: embedding {index} has dimension {got}, want {want}")]
    RaggedEmbeddings { index: usize, got: usize, want: usize },
}
