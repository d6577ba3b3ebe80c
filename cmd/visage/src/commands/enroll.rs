//! Enroll command.

use anyhow::{Result, bail};
use clap::Args;

use super::{Record, load_file, open_index, print_success, save_index};
use crate::Cli;
use crate::config::load_config;

/// Enroll embeddings into the index.
///
/// The input file holds `{label, embedding}` records, or bare vectors when
/// `--label` is given. Every record becomes its own entry.
#[derive(Args)]
pub struct EnrollCommand {
    /// Input file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    file: String,

    /// Label for records that do not carry one
    #[arg(short = 'l', long)]
    label: Option<String>,
}

impl EnrollCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let cfg = load_config(cli)?;
        let records: Vec<Record> = load_file(&self.file)?;
        let Some(first) = records.first() else {
            bail!("{} contains no embeddings", self.file);
        };

        let mut labels = Vec::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            match (r.label(), &self.label) {
                (Some(l), _) => labels.push(l),
                (None, Some(l)) => labels.push(l.as_str()),
                (None, None) => bail!("record {i} has no label, pass --label"),
            }
        }
        let embeddings: Vec<&[f32]> = records.iter().map(Record::embedding).collect();

        let index = open_index(&cfg, Some(first.embedding().len()))?;
        let ids = index.enroll_batch(&labels, &embeddings)?;
        save_index(&cfg, index.as_ref())?;

        print_success(&format!(
            "enrolled {} embeddings ({} entries total)",
            ids.len(),
            index.len()
        ));
        Ok(())
    }
}
