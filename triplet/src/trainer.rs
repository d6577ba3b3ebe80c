use std::error::Error as StdError;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use visage_metric::Metric;

use crate::error::TripletError;
use crate::loss::{LossOutcome, TripletLoss};
use crate::miner::TripletMiner;
use crate::sampler::{BatchSampler, SamplerConfig};

/// The embedding network as seen by the training loop.
///
/// Implementations own their parameters and optimizer; the trainer only
/// hands them batch positions and loss gradients.
pub trait TrainableModel {
    type Error: StdError + Send + Sync + 'static;

    /// Embeds the dataset samples at `indices`, one row per index.
    fn forward(&mut self, indices: &[usize]) -> Result<Vec<Vec<f32>>, Self::Error>;

    /// Applies one optimizer step from dL/d(embedding) per batch row.
    fn step(&mut self, grads: &[Vec<f32>]) -> Result<(), Self::Error>;
}

/// Fields every checkpoint record carries. Parameter and optimizer state
/// are serialized by the sink from the model itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub run_id: String,
    pub model_id: String,
}

/// Receives a checkpoint at the end of every completed epoch.
pub trait CheckpointSink<M> {
    fn save(
        &mut self,
        meta: &CheckpointMeta,
        model: &M,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Cooperative stop request, honored between batches only.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Training loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Triplet margin shared by miner and loss. Default: 1.0.
    #[serde(default)]
    pub margin: f32,

    #[serde(default)]
    pub metric: Metric,

    /// Log running averages every this many batches. Default: 10.
    #[serde(default)]
    pub log_every: usize,

    /// Identifies this run in checkpoints.
    #[serde(default)]
    pub run_id: String,

    /// Embedding model identifier written into checkpoints.
    #[serde(default)]
    pub model_id: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            margin: 1.0,
            metric: Metric::Euclidean,
            log_every: 10,
            run_id: String::new(),
            model_id: String::new(),
        }
    }
}

impl TrainerConfig {
    fn with_defaults(mut self) -> Self {
        if self.margin == 0.0 {
            self.margin = 1.0;
        }
        if self.log_every == 0 {
            self.log_every = 10;
        }
        self
    }
}

/// Summary of one epoch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EpochReport {
    pub epoch: usize,

    /// Batches whose optimizer step ran.
    pub batches: usize,

    /// Batches skipped because no triplets were mined.
    pub skipped: usize,

    /// Total triplets across stepped batches.
    pub triplets: usize,

    /// Mean batch loss over stepped batches, `None` if none stepped.
    pub mean_loss: Option<f32>,

    pub forward_time: Duration,
    pub loss_time: Duration,
    pub step_time: Duration,

    /// The stop flag ended this epoch early.
    pub cancelled: bool,
}

/// Drives sampler, model, miner and loss through whole epochs.
///
/// Batches run strictly one after another: a batch's optimizer step
/// completes before the next batch is drawn.
pub struct Trainer<L> {
    cfg: TrainerConfig,
    sampler: BatchSampler<L>,
    miner: TripletMiner,
    loss: TripletLoss,
    stop: StopFlag,
}

impl<L: Clone + Eq + Hash + Sync> Trainer<L> {
    /// `labels` holds the label of every dataset sample, by position.
    pub fn new(labels: &[L], cfg: TrainerConfig) -> Result<Self, TripletError> {
        let cfg = cfg.with_defaults();
        let sampler = BatchSampler::new(labels, cfg.sampler.clone())?;
        let miner = TripletMiner::new(cfg.margin, cfg.metric)?;
        let loss = TripletLoss::new(cfg.margin, cfg.metric)?;
        Ok(Self {
            cfg,
            sampler,
            miner,
            loss,
            stop: StopFlag::new(),
        })
    }

    /// Handle that stops training at the next batch boundary.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Runs one epoch.
    pub fn train_epoch<M: TrainableModel>(
        &mut self,
        epoch: usize,
        model: &mut M,
    ) -> Result<EpochReport, TripletError> {
        let mut report = EpochReport {
            epoch,
            ..Default::default()
        };
        let mut loss_sum = 0.0f64;
        let log_every = self.cfg.log_every;

        for (batch_idx, batch) in self.sampler.epoch().enumerate() {
            if self.stop.is_stopped() {
                report.cancelled = true;
                break;
            }

            let timing = Instant::now();
            let embeddings = model
                .forward(&batch.indices)
                .map_err(|e| TripletError::Model(Box::new(e)))?;
            report.forward_time += timing.elapsed();

            let timing = Instant::now();
            let mined = self.miner.mine(&embeddings, &batch.labels)?;
            let outcome = self.loss.forward(&mined.distances, &mined.triplets)?;
            report.loss_time += timing.elapsed();

            let batch_loss = match outcome {
                LossOutcome::NoTriplets => {
                    warn!(epoch, batch = batch_idx, "trainer: no triplets mined, skipping step");
                    report.skipped += 1;
                    continue;
                }
                LossOutcome::Computed(r) => r.loss,
            };

            let timing = Instant::now();
            let grads = self.loss.backward(&embeddings, &mined.triplets)?;
            model
                .step(&grads)
                .map_err(|e| TripletError::Model(Box::new(e)))?;
            report.step_time += timing.elapsed();

            report.batches += 1;
            report.triplets += mined.triplets.len();
            loss_sum += batch_loss as f64;
            debug!(
                epoch,
                batch = batch_idx,
                loss = batch_loss,
                triplets = mined.triplets.len(),
                semi_hard = mined.semi_hard,
                fallback = mined.fallback,
                "trainer: batch"
            );

            if report.batches % log_every == 0 {
                let n = report.batches as u32;
                info!(
                    epoch,
                    batch = batch_idx,
                    training_loss = loss_sum / report.batches as f64,
                    forward_ms = (report.forward_time / n).as_secs_f64() * 1e3,
                    loss_ms = (report.loss_time / n).as_secs_f64() * 1e3,
                    step_ms = (report.step_time / n).as_secs_f64() * 1e3,
                    "trainer: progress"
                );
            }
        }

        if report.batches > 0 {
            report.mean_loss = Some((loss_sum / report.batches as f64) as f32);
        }
        info!(
            epoch,
            batches = report.batches,
            skipped = report.skipped,
            mean_loss = report.mean_loss,
            cancelled = report.cancelled,
            "trainer: epoch done"
        );
        Ok(report)
    }

    /// Runs `epochs` epochs, checkpointing after each completed one.
    ///
    /// Returns early, without a checkpoint, when the stop flag interrupts an
    /// epoch.
    pub fn fit<M: TrainableModel>(
        &mut self,
        model: &mut M,
        epochs: usize,
        mut sink: Option<&mut dyn CheckpointSink<M>>,
    ) -> Result<Vec<EpochReport>, TripletError> {
        let mut reports = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            info!(epoch = epoch + 1, epochs, "trainer: epoch start");
            let report = self.train_epoch(epoch, model)?;
            let cancelled = report.cancelled;
            reports.push(report);
            if cancelled {
                break;
            }
            if let Some(sink) = sink.as_deref_mut() {
                let meta = CheckpointMeta {
                    epoch,
                    run_id: self.cfg.run_id.clone(),
                    model_id: self.cfg.model_id.clone(),
                };
                sink.save(&meta, model).map_err(TripletError::Model)?;
            }
        }
        Ok(reports)
    }
}
