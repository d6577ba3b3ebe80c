use rayon::prelude::*;

use crate::distance::Metric;
use crate::error::MetricError;

/// Square matrix of pairwise distances over one batch of embeddings.
///
/// Row-major, symmetric, zero diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f32>,
}

impl DistanceMatrix {
    /// Computes all pairwise distances. Rows are filled in parallel.
    ///
    /// Every embedding must have the same dimension as the first one.
    pub fn compute<E>(embeddings: &[E], metric: Metric) -> Result<Self, MetricError>
    where
        E: AsRef<[f32]> + Sync,
    {
        let n = embeddings.len();
        if let Some(first) = embeddings.first() {
            let want = first.as_ref().len();
            for (index, e) in embeddings.iter().enumerate() {
                let got = e.as_ref().len();
                if got != want {
                    return Err(MetricError::RaggedEmbeddings { index, got, want });
                }
            }
        }

        let mut data = vec![0.0f32; n * n];
        if n > 0 {
            data.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                let a = embeddings[i].as_ref();
                for (j, cell) in row.iter_mut().enumerate() {
                    if i != j {
                        *cell = metric.distance(a, embeddings[j].as_ref());
                    }
                }
            });
        }

        Ok(Self { n, data })
    }

    /// Number of rows (and columns).
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between embeddings `i` and `j`. Panics when out of range.
    pub fn get(&self, i: usize, j: usize) -> f32 {
        assert!(i < self.n && j < self.n, "metric: index ({i}, {j}) out of range {}", self.n);
        self.data[i * self.n + j]
    }

    /// Row `i` as a slice of length `len()`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}
