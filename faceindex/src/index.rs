use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use visage_metric::Metric;

use crate::error::IndexError;
use crate::flat::FlatIndex;
use crate::hnsw::{HnswConfig, HnswIndex};

/// Longest label or model id, in bytes, that an index accepts and the
/// on-disk format can hold.
pub const MAX_STRING_LEN: usize = 1 << 16;

/// Neighbor is a single result from a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Enrollment sequence number of the matched entry (0-based).
    pub id: u64,

    /// Identity label the entry was enrolled under.
    pub label: String,

    /// Distance between the query and the entry.
    /// Lower values indicate higher similarity.
    pub distance: f32,
}

/// A stored (label, embedding) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: u64,
    pub label: String,
    pub embedding: Vec<f32>,
}

/// Fixed properties of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Identifier of the embedding model that produced the vectors.
    pub model_id: String,

    /// Embedding dimension. Must be positive.
    pub dim: usize,

    #[serde(default)]
    pub metric: Metric,
}

impl IndexConfig {
    pub(crate) fn validate(&self) -> Result<(), IndexError> {
        if self.dim == 0 {
            return Err(IndexError::InvalidConfig("dim must be positive".into()));
        }
        check_len("model id", &self.model_id)
    }
}

/// FaceIndex is the interface shared by the exact and accelerated indices.
///
/// Implementations are single-writer / multi-reader: queries run in
/// parallel, an enrollment excludes every other call on the same index.
pub trait FaceIndex: Send + Sync {
    /// Appends `embedding` under `label` and returns its entry id.
    ///
    /// Nothing is stored if the label or embedding is rejected.
    fn enroll(&self, label: &str, embedding: &[f32]) -> Result<u64, IndexError>;

    /// Appends several entries under one write lock. All labels and
    /// embeddings are validated before any is stored.
    fn enroll_batch(&self, labels: &[&str], embeddings: &[&[f32]]) -> Result<Vec<u64>, IndexError>;

    /// Returns up to `k` nearest entries, ascending by distance, ties by id.
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn config(&self) -> &IndexConfig;

    /// All entries in enrollment order.
    fn entries(&self) -> Vec<Entry>;
}

/// Which [`FaceIndex`] implementation to build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Flat,
    Hnsw(HnswConfig),
}

impl Backend {
    /// Builds an empty index.
    pub fn build(&self, cfg: IndexConfig) -> Result<Arc<dyn FaceIndex>, IndexError> {
        Ok(match self {
            Self::Flat => Arc::new(FlatIndex::new(cfg)?),
            Self::Hnsw(h) => Arc::new(HnswIndex::new(cfg, h.clone())?),
        })
    }
}

pub(crate) fn check_len(what: &'static str, s: &str) -> Result<(), IndexError> {
    if s.len() > MAX_STRING_LEN {
        return Err(IndexError::TooLong {
            what,
            len: s.len(),
            max: MAX_STRING_LEN,
        });
    }
    Ok(())
}

/// Rejects over-long labels and wrong-length or non-finite embeddings.
pub(crate) fn check_entry(label: &str, embedding: &[f32], dim: usize) -> Result<(), IndexError> {
    check_len("label", label)?;
    check_embedding(embedding, dim)
}

/// Rejects wrong-length and non-finite embeddings.
pub(crate) fn check_embedding(embedding: &[f32], dim: usize) -> Result<(), IndexError> {
    if embedding.len() != dim {
        return Err(IndexError::DimensionMismatch {
            got: embedding.len(),
            want: dim,
        });
    }
    if let Some(position) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(IndexError::NonFinite { position });
    }
    Ok(())
}

pub(crate) fn check_batch(
    labels: &[&str],
    embeddings: &[&[f32]],
    dim: usize,
) -> Result<(), IndexError> {
    if labels.len() != embeddings.len() {
        return Err(IndexError::BatchLengthMismatch {
            labels: labels.len(),
            embeddings: embeddings.len(),
        });
    }
    labels
        .iter()
        .zip(embeddings)
        .try_for_each(|(l, e)| check_entry(l, e, dim))
}

/// Result ordering: distance, then enrollment order.
pub(crate) fn by_distance_then_id(a: &(u64, f32), b: &(u64, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dim: usize) -> IndexConfig {
        IndexConfig {
            model_id: "m1".into(),
            dim,
            metric: Metric::Euclidean,
        }
    }

    #[test]
    fn backend_builds_both_kinds() {
        for backend in [Backend::Flat, Backend::Hnsw(HnswConfig::default())] {
            let idx = backend.build(cfg(2)).unwrap();
            assert!(idx.is_empty());
            assert_eq!(idx.config().model_id, "m1");
        }
    }

    #[test]
    fn zero_dim_rejected() {
        assert!(matches!(
            Backend::Flat.build(cfg(0)),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn long_model_id_rejected() {
        let mut c = cfg(2);
        c.model_id = "m".repeat(MAX_STRING_LEN + 1);
        for backend in [Backend::Flat, Backend::Hnsw(HnswConfig::default())] {
            assert!(matches!(
                backend.build(c.clone()),
                Err(IndexError::TooLong { what: "model id", .. })
            ));
        }
    }

    #[test]
    fn check_batch_rejects_long_label() {
        let long = "x".repeat(MAX_STRING_LEN + 1);
        assert!(matches!(
            check_batch(&["a", long.as_str()], &[&[0.0], &[1.0]], 1),
            Err(IndexError::TooLong {
                what: "label",
                max: MAX_STRING_LEN,
                ..
            })
        ));
        let edge = "x".repeat(MAX_STRING_LEN);
        assert!(check_batch(&[edge.as_str()], &[&[0.0]], 1).is_ok());
    }

    #[test]
    fn check_embedding_errors() {
        assert!(matches!(
            check_embedding(&[1.0], 2),
            Err(IndexError::DimensionMismatch { got: 1, want: 2 })
        ));
        assert!(matches!(
            check_embedding(&[1.0, f32::NAN], 2),
            Err(IndexError::NonFinite { position: 1 })
        ));
        assert!(check_embedding(&[1.0, 2.0], 2).is_ok());
    }

    #[test]
    fn ordering_breaks_ties_by_id() {
        let mut v = vec![(3u64, 0.5f32), (1, 0.5), (2, 0.1)];
        v.sort_by(by_distance_then_id);
        assert_eq!(v, vec![(2, 0.1), (1, 0.5), (3, 0.5)]);
    }
}
