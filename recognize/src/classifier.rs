use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use visage_faceindex::{FaceIndex, Neighbor};

use crate::RecognizeError;
use crate::threshold::Threshold;

/// Outcome label of a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Known(l) => Some(l.as_str()),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Result of classifying one embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub identity: Identity,

    /// Distance to the deciding entry: the winning match when known, the
    /// nearest entry when unknown. `None` means the index was empty.
    pub distance: Option<f32>,

    /// Entry id of the deciding entry, `None` for an empty index.
    pub reference: Option<u64>,
}

impl Classification {
    fn empty() -> Self {
        Self {
            identity: Identity::Unknown,
            distance: None,
            reference: None,
        }
    }
}

/// How neighbors within τ are turned into a label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Label of the single nearest entry.
    #[default]
    Nearest,

    /// Majority label among the `k` nearest entries within τ. Equal vote
    /// counts go to the label with the closest member.
    RadiusVote { k: usize },
}

/// Classifier settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Acceptance radius τ, in the index's metric.
    /// Default: 1.0.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default)]
    pub strategy: Strategy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            strategy: Strategy::Nearest,
        }
    }
}

fn default_threshold() -> f32 {
    1.0
}

impl ClassifierConfig {
    /// Fills a zero vote count. τ = 0 is kept: it accepts exact matches only.
    pub fn with_defaults(mut self) -> Self {
        if let Strategy::RadiusVote { k } = &mut self.strategy {
            if *k == 0 {
                *k = 5;
            }
        }
        self
    }
}

/// Decides between an enrolled identity and "unknown" for a query
/// embedding.
///
/// The threshold is inclusive: a match at exactly τ is accepted. Queries
/// run concurrently; τ is read once per call.
pub struct OpenSetClassifier {
    index: Arc<dyn FaceIndex>,
    threshold: Threshold,
    strategy: Strategy,
}

impl OpenSetClassifier {
    pub fn new(index: Arc<dyn FaceIndex>, threshold: Threshold, strategy: Strategy) -> Self {
        Self {
            index,
            threshold,
            strategy,
        }
    }

    /// Builds a classifier with its own threshold handle from `cfg`.
    pub fn from_config(
        index: Arc<dyn FaceIndex>,
        cfg: ClassifierConfig,
    ) -> Result<Self, RecognizeError> {
        let cfg = cfg.with_defaults();
        Ok(Self::new(index, Threshold::new(cfg.threshold)?, cfg.strategy))
    }

    pub fn index(&self) -> &Arc<dyn FaceIndex> {
        &self.index
    }

    /// Handle for retuning τ while the classifier is serving.
    pub fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn classify(&self, embedding: &[f32]) -> Result<Classification, RecognizeError> {
        let tau = self.threshold.get();
        let result = match self.strategy {
            Strategy::Nearest => {
                let neighbors = self.index.query(embedding, 1)?;
                match neighbors.first() {
                    None => Classification::empty(),
                    Some(n) => decide(n, n.distance <= tau),
                }
            }
            Strategy::RadiusVote { k } => {
                let neighbors = self.index.query(embedding, k.max(1))?;
                vote(&neighbors, tau)
            }
        };
        debug!(
            "recognize: {:?} at {:?} (tau {}, entries {})",
            result.identity,
            result.distance,
            tau,
            self.index.len()
        );
        Ok(result)
    }
}

fn decide(n: &Neighbor, accept: bool) -> Classification {
    Classification {
        identity: if accept {
            Identity::Known(n.label.clone())
        } else {
            Identity::Unknown
        },
        distance: Some(n.distance),
        reference: Some(n.id),
    }
}

/// `neighbors` must be ordered by (distance, id).
fn vote(neighbors: &[Neighbor], tau: f32) -> Classification {
    let Some(nearest) = neighbors.first() else {
        return Classification::empty();
    };

    // (label, votes, closest member); first-seen order is closeness order.
    let mut tally: Vec<(&str, usize, &Neighbor)> = Vec::new();
    for n in neighbors.iter().take_while(|n| n.distance <= tau) {
        match tally.iter_mut().find(|(l, _, _)| *l == n.label) {
            Some(entry) => entry.1 += 1,
            None => tally.push((n.label.as_str(), 1, n)),
        }
    }

    let mut winner: Option<(usize, &Neighbor)> = None;
    for &(_, votes, closest) in &tally {
        if winner.is_none_or(|(best, _)| votes > best) {
            winner = Some((votes, closest));
        }
    }
    match winner {
        Some((_, n)) => decide(n, true),
        None => decide(nearest, false),
    }
}
