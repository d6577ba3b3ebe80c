//! Calibrate command.

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use visage_recognize::{Calibration, calibrate_threshold, pair_distances};

use super::{load_labeled, output_result, print_success};
use crate::Cli;
use crate::config::{config_path, load_config};

/// Derive a threshold from labeled embeddings for a target false-accept
/// rate.
#[derive(Args)]
pub struct CalibrateCommand {
    /// Labeled input file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    file: String,

    /// Target false-accept rate, in [0, 1]
    #[arg(long, default_value_t = 0.001)]
    far: f32,

    /// Store the threshold in the config file
    #[arg(long)]
    write: bool,
}

#[derive(Serialize)]
struct Report {
    genuine_pairs: usize,
    impostor_pairs: usize,
    #[serde(flatten)]
    calibration: Calibration,
}

impl CalibrateCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let mut cfg = load_config(cli)?;
        let (labels, embeddings) = load_labeled(&self.file)?;
        if labels.is_empty() {
            bail!("{} contains no embeddings", self.file);
        }

        let (genuine, impostor) = pair_distances(&embeddings, &labels, cfg.metric)?;
        let calibration = calibrate_threshold(&genuine, &impostor, self.far)?;
        output_result(
            &Report {
                genuine_pairs: genuine.len(),
                impostor_pairs: impostor.len(),
                calibration,
            },
            cli.output.as_deref(),
            cli.json,
        )?;

        if self.write {
            let path = config_path(cli)?;
            cfg.threshold = calibration.threshold;
            cfg.save_file(&path)?;
            print_success(&format!(
                "threshold {} written to {}",
                calibration.threshold,
                path.display()
            ));
        }
        Ok(())
    }
}
