use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::RecognizeError;
use crate::classifier::{Classification, OpenSetClassifier};
use crate::embedder::FaceEmbedder;

/// One recognized face: the decision plus the embedding it was made on,
/// so callers can enroll or inspect the face without embedding it again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceResult {
    pub classification: Classification,
    pub embedding: Vec<f32>,
}

/// Serving boundary: embeds images and classifies or enrolls them.
pub struct Recognizer {
    embedder: Arc<dyn FaceEmbedder>,
    classifier: OpenSetClassifier,
}

impl Recognizer {
    /// Fails if the embedder produces vectors for a different model or
    /// dimension than the classifier's index holds.
    pub fn new(
        embedder: Arc<dyn FaceEmbedder>,
        classifier: OpenSetClassifier,
    ) -> Result<Self, RecognizeError> {
        let cfg = classifier.index().config();
        if embedder.model_id() != cfg.model_id {
            return Err(RecognizeError::ModelMismatch {
                embedder: embedder.model_id().to_string(),
                index: cfg.model_id.clone(),
            });
        }
        if embedder.dimension() != cfg.dim {
            return Err(RecognizeError::DimensionMismatch {
                embedder: embedder.dimension(),
                index: cfg.dim,
            });
        }
        Ok(Self {
            embedder,
            classifier,
        })
    }

    pub fn classifier(&self) -> &OpenSetClassifier {
        &self.classifier
    }

    /// Classify a single face image.
    pub fn recognize(&self, image: &[u8]) -> Result<FaceResult, RecognizeError> {
        let embedding = self.embedder.embed(image)?;
        let classification = self.classifier.classify(&embedding)?;
        Ok(FaceResult {
            classification,
            embedding,
        })
    }

    /// Classify every face crop taken from one picture, in input order.
    pub fn recognize_faces<I>(&self, faces: &[I]) -> Result<Vec<FaceResult>, RecognizeError>
    where
        I: AsRef<[u8]>,
    {
        faces.iter().map(|f| self.recognize(f.as_ref())).collect()
    }

    /// Embed `image` and enroll it under `label`. Returns the entry id.
    pub fn enroll_image(&self, image: &[u8], label: &str) -> Result<u64, RecognizeError> {
        let embedding = self.embedder.embed(image)?;
        let id = self.classifier.index().enroll(label, &embedding)?;
        info!("recognize: enrolled {:?} as entry {}", label, id);
        Ok(id)
    }
}
