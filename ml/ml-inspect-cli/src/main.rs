//! Dataset inspection command line.
//!
//! # Usage
//!
//! - `ml-inspect --repo-id lerobot/pusht` - inspect an episodic table
//! - `ml-inspect --stream batches.jsonl` - inspect a batch stream
//! - `ml-inspect --config source.json` - inspect a described source
//!
//! Reports go to stdout (or `--output`); logs go to stderr. Exits with
//! status 1 when the source cannot be opened or fails while streaming.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use ml_inspect::{InspectConfig, InspectionReport, SourceDescriptor, inspect_descriptor};
use owo_colors::OwoColorize;

/// Inspect a training dataset: schema, statistics and anomalies.
#[derive(Parser, Debug)]
#[command(name = "ml-inspect")]
#[command(about = "Inspect a training dataset", long_about = None)]
#[command(version)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["repo_id", "stream", "config"])
))]
struct Cli {
    /// Episodic table repository id (e.g. "lerobot/pusht")
    #[arg(long)]
    repo_id: Option<String>,

    /// Batch stream file or directory of JSONL files
    #[arg(long)]
    stream: Option<PathBuf>,

    /// JSON file holding a source descriptor
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dataset root directory (defaults to $HF_LEROBOT_HOME)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Number of samples to inspect
    #[arg(long, short = 'n', default_value_t = 10)]
    num_samples: usize,

    /// Number of leading samples used for schema discovery
    #[arg(long)]
    probe_size: Option<usize>,

    /// Expected samples per batch (streaming sources)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Pretty)]
    format: Format,

    /// Write the report to a file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Log filter (e.g. "info" or "warn,ml_inspect=debug")
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

impl Cli {
    fn descriptor(&self) -> Result<SourceDescriptor> {
        let mut descriptor = if let Some(repo_id) = &self.repo_id {
            SourceDescriptor::random_access(repo_id)
        } else if let Some(stream) = &self.stream {
            let path = std::path::absolute(stream)
                .with_context(|| format!("invalid stream path {}", stream.display()))?;
            SourceDescriptor::streaming(path.to_string_lossy())
        } else if let Some(config) = &self.config {
            SourceDescriptor::from_json_file(config)
                .with_context(|| format!("failed to load source config {}", config.display()))?
        } else {
            anyhow::bail!("one of --repo-id, --stream or --config is required");
        };

        if let Some(root) = &self.root {
            descriptor = descriptor.with_root(root.clone());
        }
        if let Some(batch_size) = self.batch_size {
            descriptor = descriptor.with_batch_size(batch_size);
        }
        Ok(descriptor)
    }

    fn inspect_config(&self) -> InspectConfig {
        let config = InspectConfig::new(self.num_samples);
        match self.probe_size {
            Some(probe_size) => config.with_probe_size(probe_size),
            None => config,
        }
    }
}

fn render(report: &InspectionReport, format: Format, color: bool) -> Result<String> {
    match format {
        Format::Json => Ok(report.to_json()?),
        Format::Pretty => {
            let mut text = report.to_text();
            let status = if report.has_anomalies() {
                format!("⚠ {} anomalies found", report.anomalies.len())
            } else {
                "✓ No anomalies".to_string()
            };
            text.push('\n');
            if !color {
                text.push_str(&status);
            } else if report.has_anomalies() {
                text.push_str(&status.yellow().bold().to_string());
            } else {
                text.push_str(&status.green().bold().to_string());
            }
            Ok(text)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let descriptor = cli.descriptor()?;
    let config = cli.inspect_config();
    let report = inspect_descriptor(&descriptor, &config)
        .with_context(|| format!("failed to inspect '{}'", descriptor.identifier))?;

    match &cli.output {
        Some(path) => {
            let rendered = render(&report, cli.format, false)?;
            std::fs::write(path, rendered + "\n")
                .with_context(|| format!("failed to write report to {}", path.display()))?;
        }
        None => println!("{}", render(&report, cli.format, true)?),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&logging::Config {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ml-inspect").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn source_is_required() {
        assert!(Cli::try_parse_from(["ml-inspect"]).is_err());
        assert!(
            Cli::try_parse_from(["ml-inspect", "--repo-id", "a/b", "--stream", "x.jsonl"])
                .is_err()
        );
    }

    #[test]
    fn repo_id_descriptor() {
        let cli = parse(&["--repo-id", "lerobot/pusht", "--root", "/data", "-n", "20"]);
        let descriptor = cli.descriptor().unwrap();
        assert_eq!(descriptor.identifier, "lerobot/pusht");
        assert_eq!(descriptor.resolve_path(), PathBuf::from("/data/lerobot/pusht"));

        let config = cli.inspect_config();
        assert_eq!(config.num_samples, 20);
        assert_eq!(config.probe_size, 5);
    }

    #[test]
    fn stream_path_is_absolute() {
        let cli = parse(&["--stream", "batches.jsonl", "--batch-size", "8"]);
        let descriptor = cli.descriptor().unwrap();
        assert!(PathBuf::from(&descriptor.identifier).is_absolute());
        assert_eq!(descriptor.batch_size, Some(8));
    }

    #[test]
    fn probe_size_override() {
        let cli = parse(&["--repo-id", "a/b", "-n", "3", "--probe-size", "2"]);
        assert_eq!(cli.inspect_config().probe_size, 2);
    }

    #[test]
    fn run_writes_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let stream = dir.path().join("batches.jsonl");
        std::fs::write(&stream, "{\"x\": [1.0, 3.0]}\n").unwrap();
        let output = dir.path().join("report.json");

        let cli = parse(&[
            "--stream",
            stream.to_str().unwrap(),
            "-n",
            "2",
            "--format",
            "json",
            "--output",
            output.to_str().unwrap(),
        ]);
        run(&cli).unwrap();

        let report = InspectionReport::from_json(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report.samples_inspected, 2);
        assert_eq!(report.stats["x"].mean, vec![2.0]);
    }

    #[test]
    fn run_fails_on_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["--stream", dir.path().join("nope").to_str().unwrap()]);
        let err = run(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }

    #[test]
    fn pretty_render_without_color() {
        let dir = tempfile::tempdir().unwrap();
        let stream = dir.path().join("batches.jsonl");
        std::fs::write(&stream, "{\"x\": [1.0]}\n").unwrap();
        let cli = parse(&["--stream", stream.to_str().unwrap(), "-n", "1"]);

        let report = inspect_descriptor(&cli.descriptor().unwrap(), &cli.inspect_config()).unwrap();
        let text = render(&report, Format::Pretty, false).unwrap();
        assert!(text.contains("Dataset Inspection"));
        assert!(text.ends_with("✓ No anomalies"));
    }
}
