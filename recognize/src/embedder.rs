use crate::RecognizeError;

/// Maps an encoded face image to an embedding vector.
///
/// The output length is fixed per model version and reported by
/// [`FaceEmbedder::dimension`]. Embeddings from different `model_id`s live
/// in different spaces and must never share an index.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait FaceEmbedder: Send + Sync {
    /// Computes the embedding of one face image.
    fn embed(&self, image: &[u8]) -> Result<Vec<f32>, RecognizeError>;

    /// Returns the dimensionality of the embedding vectors (e.g., 128).
    fn dimension(&self) -> usize;

    /// Identifies the model and its version.
    fn model_id(&self) -> &str;
}
