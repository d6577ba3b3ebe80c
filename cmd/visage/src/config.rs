//! Configuration file loading and command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visage_faceindex::{Backend, HnswConfig};
use visage_metric::Metric;
use visage_recognize::{ClassifierConfig, Strategy};
use visage_triplet::SamplerConfig;

use crate::Cli;

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".visage";

/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Default index filename under the data directory.
pub const DEFAULT_INDEX_FILE: &str = "index.vidx";

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not find home directory")
}

/// Returns ~/.visage/config.yaml.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(DEFAULT_BASE_DIR).join(DEFAULT_CONFIG_FILE))
}

/// Returns ~/.visage/data/index.vidx.
pub fn default_index_path() -> Result<PathBuf> {
    Ok(home_dir()?
        .join(DEFAULT_BASE_DIR)
        .join("data")
        .join(DEFAULT_INDEX_FILE))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Flat,
    Hnsw,
}

/// Training-side settings used by `visage mine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub classes_per_batch: usize,
    pub samples_per_class: usize,
    pub margin: f32,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let sampler = SamplerConfig::default();
        Self {
            classes_per_batch: sampler.classes_per_batch,
            samples_per_class: sampler.samples_per_class,
            margin: 1.0,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn sampler(&self) -> SamplerConfig {
        SamplerConfig {
            classes_per_batch: self.classes_per_batch,
            samples_per_class: self.samples_per_class,
            seed: self.seed,
        }
    }
}

/// Configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding model the index was built for.
    pub model_id: String,

    /// Index file. Default: ~/.visage/data/index.vidx.
    pub index_path: Option<PathBuf>,

    /// Acceptance radius τ.
    pub threshold: f32,

    pub strategy: Strategy,

    /// Metric for newly created indices. Loaded indices keep their own.
    pub metric: Metric,

    pub backend: BackendKind,

    pub hnsw: HnswConfig,

    pub training: TrainingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_id: "default".into(),
            index_path: None,
            threshold: ClassifierConfig::default().threshold,
            strategy: Strategy::default(),
            metric: Metric::default(),
            backend: BackendKind::default(),
            hnsw: HnswConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl Config {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Writes the configuration as YAML, creating parent directories.
    pub fn save_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply(&mut self, cli: &Cli) {
        if let Some(model) = &cli.model {
            self.model_id = model.clone();
        }
        if let Some(index) = &cli.index {
            self.index_path = Some(PathBuf::from(index));
        }
        if let Some(threshold) = cli.threshold {
            self.threshold = threshold;
        }
        if let Some(backend) = cli.backend {
            self.backend = backend;
        }
    }

    pub fn index_path(&self) -> Result<PathBuf> {
        match &self.index_path {
            Some(p) => Ok(p.clone()),
            None => default_index_path(),
        }
    }

    pub fn backend(&self) -> Backend {
        match self.backend {
            BackendKind::Flat => Backend::Flat,
            BackendKind::Hnsw => Backend::Hnsw(self.hnsw.clone()),
        }
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            threshold: self.threshold,
            strategy: self.strategy,
        }
    }
}

/// Resolves the config path from `--config` or the default location.
pub fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(p) => Ok(PathBuf::from(p)),
        None => default_config_path(),
    }
}

/// Loads the configuration and applies command-line overrides.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = Config::load_file(&config_path(cli)?)?;
    cfg.apply(cli);
    Ok(cfg)
}
