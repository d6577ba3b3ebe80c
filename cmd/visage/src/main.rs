//! visage CLI - enroll face embeddings, classify them against an open set,
//! calibrate the acceptance threshold and inspect triplet mining.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{CalibrateCommand, ClassifyCommand, EnrollCommand, InfoCommand, MineCommand};
use config::BackendKind;

/// visage CLI - open-set face recognition on precomputed embeddings.
///
/// Embeddings are read from JSON or YAML files, either as bare vectors or
/// as `{label, embedding}` records.
///
/// Configuration is read from ~/.visage/config.yaml; the flags below
/// override it.
#[derive(Parser)]
#[command(name = "visage")]
#[command(about = "Face embedding enrollment and open-set classification")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.visage/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Index file (default is ~/.visage/data/index.vidx)
    #[arg(long, global = true)]
    pub index: Option<String>,

    /// Embedding model identifier
    #[arg(short = 'm', long, global = true)]
    pub model: Option<String>,

    /// Acceptance threshold (distance)
    #[arg(short = 't', long, global = true)]
    pub threshold: Option<f32>,

    /// Index backend used when loading or creating the index
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (default: YAML)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enroll labeled embeddings into the index
    Enroll(EnrollCommand),
    /// Classify embeddings against the enrolled identities
    Classify(ClassifyCommand),
    /// Show index contents
    Info(InfoCommand),
    /// Derive a threshold from labeled embeddings
    Calibrate(CalibrateCommand),
    /// Run semi-hard triplet mining and loss over labeled embeddings
    Mine(MineCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Enroll(cmd) => cmd.run(&cli),
        Commands::Classify(cmd) => cmd.run(&cli),
        Commands::Info(cmd) => cmd.run(&cli),
        Commands::Calibrate(cmd) => cmd.run(&cli),
        Commands::Mine(cmd) => cmd.run(&cli),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(std::iter::once("visage").chain(args.iter().copied()))?;
        match &cli.command {
            Commands::Enroll(cmd) => cmd.run(&cli),
            Commands::Classify(cmd) => cmd.run(&cli),
            Commands::Info(cmd) => cmd.run(&cli),
            Commands::Calibrate(cmd) => cmd.run(&cli),
            Commands::Mine(cmd) => cmd.run(&cli),
        }
    }

    fn read_json(path: &str) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn enroll_classify_info() {
        let dir = tempfile::tempdir().unwrap();
        let p = |name: &str| dir.path().join(name).to_str().unwrap().to_string();
        let (cfg, index, out) = (p("config.yaml"), p("index.vidx"), p("out.json"));
        let (alice, bob, query) = (p("alice.json"), p("bob.json"), p("query.json"));

        std::fs::write(&alice, "[[0.0, 0.0], [0.1, 0.0]]").unwrap();
        std::fs::write(&bob, r#"[{"label": "bob", "embedding": [5.0, 5.0]}]"#).unwrap();
        std::fs::write(&query, "[[0.05, 0.0], [2.5, 2.5]]").unwrap();

        let (cfg, index, out) = (cfg.as_str(), index.as_str(), out.as_str());
        let common = ["--config", cfg, "--index", index, "--model", "m1"];

        run(&[&common[..], &["enroll", "-f", alice.as_str(), "-l", "alice"]].concat()).unwrap();
        run(&[&common[..], &["enroll", "-f", bob.as_str()]].concat()).unwrap();

        run(&[
            &common[..],
            &["--threshold", "0.5", "--json", "-o", out, "classify", "-f", query.as_str()],
        ]
        .concat())
        .unwrap();
        let rows = read_json(out);
        assert_eq!(rows[0]["identity"]["known"], "alice");
        assert_eq!(rows[1]["identity"], "unknown");

        run(&[&common[..], &["--json", "-o", out, "info"]].concat()).unwrap();
        let info = read_json(out);
        assert_eq!(info["entries"], 3);
        assert_eq!(info["identities"]["alice"], 2);
        assert_eq!(info["model_id"], "m1");

        // Another model must not reuse the index.
        assert!(run(&["--config", cfg, "--index", index, "--model", "m2", "info"]).is_err());
    }

    #[test]
    fn mine_and_calibrate() {
        let dir = tempfile::tempdir().unwrap();
        let p = |name: &str| dir.path().join(name).to_str().unwrap().to_string();
        let (cfg, out, batch) = (p("config.yaml"), p("out.json"), p("batch.yaml"));
        std::fs::write(
            &batch,
            "- {label: a, embedding: [0.0]}\n\
             - {label: a, embedding: [1.0]}\n\
             - {label: b, embedding: [1.5]}\n\
             - {label: b, embedding: [9.0]}\n",
        )
        .unwrap();
        let (cfg, out, batch) = (cfg.as_str(), out.as_str(), batch.as_str());

        run(&["--config", cfg, "--json", "-o", out, "mine", "-f", batch]).unwrap();
        let reports = read_json(out);
        assert_eq!(reports[0]["size"], 4);
        assert_eq!(reports[0]["triplets"], 4);

        run(&[
            "--config", cfg, "--json", "-o", out, "calibrate", "-f", batch, "--far", "0.0",
            "--write",
        ])
        .unwrap();
        let report = read_json(out);
        assert_eq!(report["genuine_pairs"], 2);
        assert_eq!(report["impostor_pairs"], 4);
        assert_eq!(report["false_accept_rate"], 0.0);

        let saved = config::Config::load_file(std::path::Path::new(cfg)).unwrap();
        assert!(saved.threshold > 0.0 && saved.threshold < 0.5);
    }
}
