//! Utility functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;
use visage_faceindex::{FaceIndex, IndexConfig};

use crate::config::Config;

/// One embedding from an input file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Labeled { label: String, embedding: Vec<f32> },
    Bare(Vec<f32>),
}

impl Record {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Labeled { label, .. } => Some(label.as_str()),
            Self::Bare(_) => None,
        }
    }

    pub fn embedding(&self) -> &[f32] {
        match self {
            Self::Labeled { embedding, .. } | Self::Bare(embedding) => embedding,
        }
    }
}

/// Loads a YAML or JSON file, chosen by extension.
pub fn load_file<T: DeserializeOwned>(path: &str) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");

    let result = match ext.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content).with_context(|| format!("invalid JSON in {path}"))?,
        _ => serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {path}"))?,
    };
    Ok(result)
}

/// Loads records that must all carry a label.
pub fn load_labeled(path: &str) -> Result<(Vec<String>, Vec<Vec<f32>>)> {
    let records: Vec<Record> = load_file(path)?;
    let mut labels = Vec::with_capacity(records.len());
    let mut embeddings = Vec::with_capacity(records.len());
    for (i, r) in records.into_iter().enumerate() {
        match r {
            Record::Labeled { label, embedding } => {
                labels.push(label);
                embeddings.push(embedding);
            }
            Record::Bare(_) => bail!("record {i} in {path} has no label"),
        }
    }
    Ok((labels, embeddings))
}

/// Opens the configured index. With `create_dim`, a missing file yields a
/// new empty index of that dimension instead of an error.
pub fn open_index(cfg: &Config, create_dim: Option<usize>) -> Result<Arc<dyn FaceIndex>> {
    let path = cfg.index_path()?;
    let backend = cfg.backend();
    if path.exists() {
        let snapshot = visage_faceindex::load_file(&path, &cfg.model_id)
            .with_context(|| format!("failed to load index {}", path.display()))?;
        return Ok(snapshot.into_index(&backend)?);
    }
    let Some(dim) = create_dim else {
        bail!("index {} not found, enroll some faces first", path.display());
    };
    info!("creating new index at {} (dim {dim})", path.display());
    Ok(backend.build(IndexConfig {
        model_id: cfg.model_id.clone(),
        dim,
        metric: cfg.metric,
    })?)
}

/// Saves the index to the configured path, creating parent directories.
pub fn save_index(cfg: &Config, index: &dyn FaceIndex) -> Result<()> {
    let path = cfg.index_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    visage_faceindex::save_file(index, &path)
        .with_context(|| format!("failed to save index {}", path.display()))?;
    Ok(())
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(
    result: &T,
    output_path: Option<&str>,
    as_json: bool,
) -> Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)? + "\n"
    } else {
        serde_yaml::to_string(result)?
    };

    match output_path {
        Some(path) => std::fs::write(path, output)?,
        None => print!("{}", output),
    }
    Ok(())
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}
