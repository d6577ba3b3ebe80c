//! Mine command.

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use visage_triplet::{BatchSampler, LossOutcome, TripletLoss, TripletMiner};

use super::{load_labeled, output_result};
use crate::Cli;
use crate::config::load_config;

/// Run semi-hard triplet mining and the triplet loss over labeled
/// embeddings.
///
/// By default the whole file is one batch. With `--sample` the file is
/// treated as a dataset and one epoch of stratified batches is drawn from
/// it using the `training` section of the config.
#[derive(Args)]
pub struct MineCommand {
    /// Labeled input file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    file: String,

    /// Draw stratified batches instead of using the file as one batch
    #[arg(long)]
    sample: bool,

    /// Include the mined triplets in the output
    #[arg(long)]
    triplets: bool,
}

#[derive(Serialize)]
struct BatchReport {
    batch: usize,
    size: usize,
    triplets: usize,
    semi_hard: usize,
    fallback: usize,
    /// `None` when no triplet could be formed.
    loss: Option<f32>,
    active: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    mined: Option<Vec<[usize; 3]>>,
}

impl MineCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let cfg = load_config(cli)?;
        let (labels, embeddings) = load_labeled(&self.file)?;
        if labels.is_empty() {
            bail!("{} contains no embeddings", self.file);
        }

        let margin = cfg.training.margin;
        let miner = TripletMiner::new(margin, cfg.metric)?;
        let loss = TripletLoss::new(margin, cfg.metric)?;

        let batches: Vec<Vec<usize>> = if self.sample {
            let mut sampler = BatchSampler::new(&labels, cfg.training.sampler())?;
            sampler.epoch().map(|b| b.indices).collect()
        } else {
            vec![(0..labels.len()).collect()]
        };

        let mut reports = Vec::with_capacity(batches.len());
        for (batch, indices) in batches.iter().enumerate() {
            let embs: Vec<&[f32]> = indices.iter().map(|&i| embeddings[i].as_slice()).collect();
            let labs: Vec<&str> = indices.iter().map(|&i| labels[i].as_str()).collect();

            let mined = miner.mine(&embs, &labs)?;
            let (value, active) = match loss.forward(&mined.distances, &mined.triplets)? {
                LossOutcome::Computed(r) => (Some(r.loss), r.active),
                LossOutcome::NoTriplets => (None, 0),
            };
            reports.push(BatchReport {
                batch,
                size: indices.len(),
                triplets: mined.triplets.len(),
                semi_hard: mined.semi_hard,
                fallback: mined.fallback,
                loss: value,
                active,
                mined: self.triplets.then(|| {
                    mined
                        .triplets
                        .iter()
                        .map(|t| [indices[t.anchor], indices[t.positive], indices[t.negative]])
                        .collect()
                }),
            });
        }

        output_result(&reports, cli.output.as_deref(), cli.json)
    }
}
