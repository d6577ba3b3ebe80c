//! Classify command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use visage_recognize::{Classification, OpenSetClassifier, Strategy};

use super::{Record, load_file, open_index, output_result};
use crate::Cli;
use crate::config::load_config;

/// Classify embeddings against the enrolled identities.
///
/// Labels in the input, if present, are echoed as `expected` so results
/// can be checked by eye.
#[derive(Args)]
pub struct ClassifyCommand {
    /// Input file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    file: String,

    /// Vote among the K nearest entries within the threshold
    #[arg(long, value_name = "K")]
    vote: Option<usize>,
}

#[derive(Serialize)]
struct Row<'a> {
    face: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<&'a str>,
    #[serde(flatten)]
    result: Classification,
}

impl ClassifyCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let mut cfg = load_config(cli)?;
        if let Some(k) = self.vote {
            cfg.strategy = Strategy::RadiusVote { k };
        }
        let records: Vec<Record> = load_file(&self.file)?;
        let index = open_index(&cfg, None)?;
        let classifier = OpenSetClassifier::from_config(index, cfg.classifier())?;

        let rows = records
            .iter()
            .enumerate()
            .map(|(face, r)| {
                Ok(Row {
                    face,
                    expected: r.label(),
                    result: classifier.classify(r.embedding())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        output_result(&rows, cli.output.as_deref(), cli.json)
    }
}
