use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;
use visage_metric::{DistanceMatrix, Metric};

use crate::error::TripletError;

/// Indices of one (anchor, positive, negative) triple within a batch.
///
/// Anchor and positive share a label, the negative does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Triplet {
    pub anchor: usize,
    pub positive: usize,
    pub negative: usize,
}

/// Output of [`TripletMiner::mine`].
#[derive(Debug, Clone)]
pub struct Mined {
    /// Pairwise distances the triplets were selected from.
    pub distances: DistanceMatrix,

    /// Triplets ordered by anchor, then positive.
    pub triplets: Vec<Triplet>,

    /// How many triplets found a semi-hard negative.
    pub semi_hard: usize,

    /// How many fell back to the hardest negative.
    pub fallback: usize,
}

impl Mined {
    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }
}

/// Online semi-hard negative miner.
///
/// For every ordered anchor/positive pair it picks the closest negative with
/// `d(a,p) < d(a,n) < d(a,p) + margin`; if none exists it falls back to the
/// closest negative overall. Ties resolve to the lowest batch index.
///
/// Anchors are mined in parallel; results do not depend on scheduling.
#[derive(Debug, Clone, Copy)]
pub struct TripletMiner {
    margin: f32,
    metric: Metric,
}

impl TripletMiner {
    /// `margin` must equal the one used by [`crate::TripletLoss`].
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

    /// Computes the batch distance matrix and mines triplets from it.
    pub fn mine<E, L>(&self, embeddings: &[E], labels: &[L]) -> Result<Mined, TripletError>
    where
        E: AsRef<[f32]> + Sync,
        L: PartialEq + Sync,
    {
        if embeddings.len() != labels.len() {
            return Err(TripletError::LengthMismatch {
                embeddings: embeddings.len(),
                labels: labels.len(),
            });
        }
        let distances = DistanceMatrix::compute(embeddings, self.metric)?;
        let per_anchor: Vec<Vec<(Triplet, bool)>> = (0..labels.len())
            .into_par_iter()
            .map(|a| self.mine_anchor(&distances, labels, a))
            .collect();

        let mut triplets = Vec::new();
        let mut semi_hard = 0;
        for (t, is_semi_hard) in per_anchor.into_iter().flatten() {
            if is_semi_hard {
                semi_hard += 1;
            }
            triplets.push(t);
        }
        let fallback = triplets.len() - semi_hard;
        debug!(
            batch = labels.len(),
            triplets = triplets.len(),
            semi_hard,
            fallback,
            "miner: mined batch"
        );

        Ok(Mined {
            distances,
            triplets,
            semi_hard,
            fallback,
        })
    }

    /// Triplets for one anchor; the flag marks a semi-hard negative.
    fn mine_anchor<L: PartialEq>(
        &self,
        dist: &DistanceMatrix,
        labels: &[L],
        a: usize,
    ) -> Vec<(Triplet, bool)> {
        let row = dist.row(a);
        let negatives: Vec<usize> = (0..labels.len())
            .filter(|&n| labels[n] != labels[a])
            .collect();

        // Hardest negative does not depend on the positive.
        let mut hardest: Option<usize> = None;
        for &n in &negatives {
            if hardest.is_none_or(|h| row[n] < row[h]) {
                hardest = Some(n);
            }
        }
        let Some(hardest) = hardest else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for p in 0..labels.len() {
            if p == a || labels[p] != labels[a] {
                continue;
            }
            let d_pos = row[p];
            let upper = d_pos + self.margin;

            let mut semi: Option<usize> = None;
            for &n in &negatives {
                let d = row[n];
                if d > d_pos && d < upper && semi.is_none_or(|s| d < row[s]) {
                    semi = Some(n);
                }
            }

            let (negative, is_semi_hard) = match semi {
                Some(n) => (n, true),
                None => (hardest, false),
            };
            out.push((
                Triplet {
                    anchor: a,
                    positive: p,
                    negative,
                },
                is_semi_hard,
            ));
        }
        out
    }
}
