use std::collections::HashMap;
use std::hash::Hash;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TripletError;

/// Controls batch composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Distinct identities per batch. Default: 30.
    pub classes_per_batch: usize,

    /// Samples drawn per identity. Default: 40.
    pub samples_per_class: usize,

    /// RNG seed. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            classes_per_batch: 30,
            samples_per_class: 40,
            seed: None,
        }
    }
}

impl SamplerConfig {
    /// Number of samples in one batch.
    pub fn batch_size(&self) -> usize {
        self.classes_per_batch * self.samples_per_class
    }
}

/// One training step's worth of samples.
///
/// Laid out class-major: `samples_per_class` consecutive entries per class.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<L> {
    /// Dataset positions of the drawn samples.
    pub indices: Vec<usize>,
    /// Label of each drawn sample, parallel to `indices`.
    pub labels: Vec<L>,
}

impl<L> Batch<L> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

struct ClassMembers<L> {
    label: L,
    members: Vec<usize>,
}

/// Draws batches with exactly `classes_per_batch` identities, each with
/// exactly `samples_per_class` samples.
///
/// The sampler only reads the label list it was built from. Its RNG state
/// carries across epochs, so consecutive epochs visit samples in different
/// orders while a fixed seed reproduces the whole sequence.
pub struct BatchSampler<L> {
    cfg: SamplerConfig,
    classes: Vec<ClassMembers<L>>,
    total: usize,
    rng: StdRng,
}

impl<L: Clone + Eq + Hash> BatchSampler<L> {
    /// Groups `labels` (one per dataset sample) by class.
    ///
    /// Fails with [`TripletError::DatasetExhausted`] when there are fewer
    /// distinct classes than `classes_per_batch`.
    pub fn new(labels: &[L], cfg: SamplerConfig) -> Result<Self, TripletError> {
        if cfg.classes_per_batch == 0 || cfg.samples_per_class == 0 {
            return Err(TripletError::InvalidConfig(format!(
                "classes_per_batch ({}) and samples_per_class ({}) must be positive",
                cfg.classes_per_batch, cfg.samples_per_class
            )));
        }

        let mut slot: HashMap<&L, usize> = HashMap::new();
        let mut classes: Vec<ClassMembers<L>> = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            let c = *slot.entry(label).or_insert_with(|| {
                classes.push(ClassMembers {
                    label: label.clone(),
                    members: Vec::new(),
                });
                classes.len() - 1
            });
            classes[c].members.push(i);
        }

        if classes.len() < cfg.classes_per_batch {
            return Err(TripletError::DatasetExhausted {
                classes: classes.len(),
                required: cfg.classes_per_batch,
            });
        }

        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            cfg,
            classes,
            total: labels.len(),
            rng,
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.cfg
    }

    /// Number of distinct classes in the dataset.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Batches yielded by one epoch: enough to draw every sample about once,
    /// and at least one.
    pub fn batches_per_epoch(&self) -> usize {
        (self.total / self.cfg.batch_size()).max(1)
    }

    /// Starts a new epoch. Batches are produced lazily.
    pub fn epoch(&mut self) -> Epoch<'_, L> {
        let queues = self
            .classes
            .iter()
            .map(|c| {
                let mut q = c.members.clone();
                q.shuffle(&mut self.rng);
                q
            })
            .collect();
        let left = self.batches_per_epoch();
        debug!(
            classes = self.classes.len(),
            samples = self.total,
            batches = left,
            "sampler: epoch start"
        );
        Epoch {
            sampler: self,
            queues,
            left,
        }
    }
}

/// Lazy iterator over one epoch's batches.
pub struct Epoch<'a, L> {
    sampler: &'a mut BatchSampler<L>,
    queues: Vec<Vec<usize>>,
    left: usize,
}

impl<L: Clone + Eq + Hash> Epoch<'_, L> {
    /// Picks the classes with the most undrawn samples, random among equals.
    fn pick_classes(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.queues.len()).collect();
        order.shuffle(&mut self.sampler.rng);
        // Stable sort keeps the shuffled order among equal queue lengths.
        order.sort_by(|&a, &b| self.queues[b].len().cmp(&self.queues[a].len()));
        order.truncate(self.sampler.cfg.classes_per_batch);
        order
    }

    fn draw(&mut self, class: usize) -> Vec<usize> {
        let BatchSampler { cfg, classes, rng, .. } = &mut *self.sampler;
        let want = cfg.samples_per_class;
        let members = &classes[class].members;
        let queue = &mut self.queues[class];

        if members.len() < want {
            // Too few samples: take each once, then repeat at random.
            let mut out = members.clone();
            out.shuffle(rng);
            while out.len() < want {
                if let Some(&m) = members.choose(rng) {
                    out.push(m);
                }
            }
            queue.clear();
            return out;
        }

        let mut out = Vec::with_capacity(want);
        while out.len() < want {
            match queue.pop() {
                Some(m) => out.push(m),
                None => {
                    // Refill without repeating anything already in this batch.
                    let mut refill: Vec<usize> =
                        members.iter().copied().filter(|m| !out.contains(m)).collect();
                    refill.shuffle(rng);
                    *queue = refill;
                }
            }
        }
        out
    }
}

impl<L: Clone + Eq + Hash> Iterator for Epoch<'_, L> {
    type Item = Batch<L>;

    fn next(&mut self) -> Option<Batch<L>> {
        if self.left == 0 {
            return None;
        }
        self.left -= 1;

        let size = self.sampler.cfg.batch_size();
        let mut indices = Vec::with_capacity(size);
        let mut labels = Vec::with_capacity(size);
        for class in self.pick_classes() {
            let drawn = self.draw(class);
            let label = &self.sampler.classes[class].label;
            labels.extend(std::iter::repeat_n(label.clone(), drawn.len()));
            indices.extend(drawn);
        }
        Some(Batch { indices, labels })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.left, Some(self.left))
    }
}

impl<L: Clone + Eq + Hash> ExactSizeIterator for Epoch<'_, L> {}
