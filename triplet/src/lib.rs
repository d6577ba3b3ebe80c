//! Metric-learning training core: stratified batch sampling, online
//! semi-hard triplet mining and margin-based triplet loss.
//!
//! # Pipeline
//!
//! ```text
//! labels ──> BatchSampler ──> Batch { indices, labels }
//!                                  │
//!                    TrainableModel::forward
//!                                  │
//!                             embeddings
//!                                  │
//!          TripletMiner::mine ──> Mined { distances, triplets }
//!                                  │
//!          TripletLoss::forward ──> LossOutcome::{Computed, NoTriplets}
//!                                  │
//!          TripletLoss::backward ──> TrainableModel::step
//! ```
//!
//! [`Trainer`] drives the loop for whole epochs and may only be stopped at a
//! batch boundary.

mod error;
mod loss;
mod miner;
mod sampler;
mod trainer;

pub use error::TripletError;
pub use loss::{LossOutcome, LossReport, TripletLoss};
pub use miner::{Mined, Triplet, TripletMiner};
pub use sampler::{Batch, BatchSampler, Epoch, SamplerConfig};
pub use trainer::{
    CheckpointMeta, CheckpointSink, EpochReport, StopFlag, TrainableModel, Trainer, TrainerConfig,
};
