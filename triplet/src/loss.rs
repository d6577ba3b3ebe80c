use serde::Serialize;
use visage_metric::{DistanceMatrix, Metric, MetricError};

use crate::error::TripletError;
use crate::miner::Triplet;

/// Per-batch loss summary.
#[derive(Debug, Clone, Serialize)]
pub struct LossReport {
    /// Mean hinge loss over all triplets.
    pub loss: f32,

    /// Hinge loss of each triplet, parallel to the triplet list.
    pub per_triplet: Vec<f32>,

    /// Triplets with a non-zero loss.
    pub active: usize,
}

/// Result of [`TripletLoss::forward`].
///
/// `NoTriplets` is not a zero loss: the batch taught nothing and the caller
/// must skip the optimizer step.
#[derive(Debug, Clone, Serialize)]
pub enum LossOutcome {
    Computed(LossReport),
    NoTriplets,
}

impl LossOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoTriplets)
    }

    /// Mean loss, or `None` for a no-op batch.
    pub fn loss(&self) -> Option<f32> {
        match self {
            Self::Computed(r) => Some(r.loss),
            Self::NoTriplets => None,
        }
    }
}

/// Margin-based triplet loss: `max(0, d(a,p) - d(a,n) + margin)`, averaged.
#[derive(Debug, Clone, Copy)]
pub struct TripletLoss {
    margin: f32,
    metric: Metric,
}

impl TripletLoss {
    pub fn new(margin: f32, metric: Metric) -> Result<Self, TripletError> {
        if !(margin.is_finite() && margin > 0.0) {
            return Err(TripletError::InvalidMargin(margin));
        }
        Ok(Self { margin, metric })
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    fn hinge(&self, d_pos: f32, d_neg: f32) -> f32 {
        (d_pos - d_neg + self.margin).max(0.0)
    }

    /// Loss over mined triplets, reading distances from the miner's matrix.
    ///
    /// Every triplet index must address a row of `distances`.
    pub fn forward(
        &self,
        distances: &DistanceMatrix,
        triplets: &[Triplet],
    ) -> Result<LossOutcome, TripletError> {
        check_triplets(triplets, distances.len())?;
        if triplets.is_empty() {
            return Ok(LossOutcome::NoTriplets);
        }
        let per_triplet: Vec<f32> = triplets
            .iter()
            .map(|t| {
                self.hinge(
                    distances.get(t.anchor, t.positive),
                    distances.get(t.anchor, t.negative),
                )
            })
            .collect();
        let active = per_triplet.iter().filter(|&&l| l > 0.0).count();
        let sum: f64 = per_triplet.iter().map(|&l| l as f64).sum();
        Ok(LossOutcome::Computed(LossReport {
            loss: (sum / per_triplet.len() as f64) as f32,
            per_triplet,
            active,
        }))
    }

    /// Gradient of the mean loss with respect to every batch embedding.
    ///
    /// Returns one row per embedding; rows not touched by an active triplet
    /// are zero. An empty triplet list yields all-zero rows.
    ///
    /// Fails on ragged rows or triplet indices outside the batch.
    pub fn backward<E>(
        &self,
        embeddings: &[E],
        triplets: &[Triplet],
    ) -> Result<Vec<Vec<f32>>, TripletError>
    where
        E: AsRef<[f32]>,
    {
        let dim = embeddings.first().map_or(0, |e| e.as_ref().len());
        if let Some((index, e)) = embeddings
            .iter()
            .enumerate()
            .find(|(_, e)| e.as_ref().len() != dim)
        {
            return Err(MetricError::RaggedEmbeddings {
                index,
                got: e.as_ref().len(),
                want: dim,
            }
            .into());
        }
        check_triplets(triplets, embeddings.len())?;

        let mut grads = vec![vec![0.0f64; dim]; embeddings.len()];
        if triplets.is_empty() {
            return Ok(to_f32(grads));
        }
        let scale = 1.0 / triplets.len() as f64;

        for t in triplets {
            let a = embeddings[t.anchor].as_ref();
            let p = embeddings[t.positive].as_ref();
            let n = embeddings[t.negative].as_ref();
            let d_pos = self.metric.distance(a, p);
            let d_neg = self.metric.distance(a, n);
            if self.hinge(d_pos, d_neg) <= 0.0 {
                continue;
            }

            // d(a,p) pulls a and p together, d(a,n) pushes a and n apart.
            let (ga_p, gp) = pair_grad(self.metric, a, p, d_pos);
            let (ga_n, gn) = pair_grad(self.metric, a, n, d_neg);
            for k in 0..dim {
                grads[t.anchor][k] += scale * (ga_p[k] - ga_n[k]);
                grads[t.positive][k] += scale * gp[k];
                grads[t.negative][k] -= scale * gn[k];
            }
        }
        Ok(to_f32(grads))
    }
}

fn check_triplets(triplets: &[Triplet], len: usize) -> Result<(), TripletError> {
    let bad = triplets
        .iter()
        .flat_map(|t| [t.anchor, t.positive, t.negative])
        .find(|&i| i >= len);
    match bad {
        Some(index) => Err(TripletError::TripletOutOfRange { index, len }),
        None => Ok(()),
    }
}

/// Partial derivatives of `metric(x, y)` with respect to `x` and `y`.
fn pair_grad(metric: Metric, x: &[f32], y: &[f32], d: f32) -> (Vec<f64>, Vec<f64>) {
    let diff: Vec<f64> = x.iter().zip(y).map(|(&a, &b)| a as f64 - b as f64).collect();
    match metric {
        Metric::SquaredEuclidean => {
            let gx: Vec<f64> = diff.iter().map(|v| 2.0 * v).collect();
            let gy = gx.iter().map(|v| -v).collect();
            (gx, gy)
        }
        Metric::Euclidean => {
            if d <= 0.0 {
                // Subgradient at coincident points.
                return (vec![0.0; x.len()], vec![0.0; x.len()]);
            }
            let inv = 1.0 / d as f64;
            let gx: Vec<f64> = diff.iter().map(|v| v * inv).collect();
            let gy = gx.iter().map(|v| -v).collect();
            (gx, gy)
        }
        Metric::Cosine => {
            let nx = x.iter().map(|&v| (v as f64).powi(2)).sum::<f64>().sqrt();
            let ny = y.iter().map(|&v| (v as f64).powi(2)).sum::<f64>().sqrt();
            if nx == 0.0 || ny == 0.0 {
                return (vec![0.0; x.len()], vec![0.0; x.len()]);
            }
            let dot: f64 = x.iter().zip(y).map(|(&a, &b)| a as f64 * b as f64).sum();
            let cos = dot / (nx * ny);
            // d = 1 - cos; d(cos)/dx = y/(|x||y|) - cos * x/|x|^2
            let gx = x
                .iter()
                .zip(y)
                .map(|(&a, &b)| -(b as f64 / (nx * ny) - cos * a as f64 / (nx * nx)))
                .collect();
            let gy = x
                .iter()
                .zip(y)
                .map(|(&a, &b)| -(a as f64 / (nx * ny) - cos * b as f64 / (ny * ny)))
                .collect();
            (gx, gy)
        }
    }
}

fn to_f32(grads: Vec<Vec<f64>>) -> Vec<Vec<f32>> {
    grads
        .into_iter()
        .map(|row| row.into_iter().map(|v| v as f32).collect())
        .collect()
}
