//! Info command.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{open_index, output_result};
use crate::Cli;
use crate::config::load_config;

/// Show the index's model, metric and per-identity entry counts.
#[derive(Args)]
pub struct InfoCommand {}

#[derive(Serialize)]
struct Info {
    path: String,
    model_id: String,
    dim: usize,
    metric: String,
    entries: usize,
    threshold: f32,
    identities: BTreeMap<String, usize>,
}

impl InfoCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let cfg = load_config(cli)?;
        let index = open_index(&cfg, None)?;
        let ic = index.config();

        let mut identities = BTreeMap::new();
        for entry in index.entries() {
            *identities.entry(entry.label).or_insert(0) += 1;
        }

        let info = Info {
            path: cfg.index_path()?.display().to_string(),
            model_id: ic.model_id.clone(),
            dim: ic.dim,
            metric: ic.metric.to_string(),
            entries: index.len(),
            threshold: cfg.threshold,
            identities,
        };
        output_result(&info, cli.output.as_deref(), cli.json)
    }
}
