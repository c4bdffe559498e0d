use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use guard_core::observability::{setup_logging, LogFormat, VerdictMetrics};
use guard_core::{GuardSettings, PipelineConfig, ValidationPipeline, Verdict};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "guardctl", about = "Validate untrusted text or path fragments")]
struct Cli {
    /// Pipeline configuration file (TOML)
    #[arg(short, long, default_value = "guard.toml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = Format::Pretty)]
    log_format: Format,

    /// Print Prometheus counters after the verdict
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

impl From<Format> for LogFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Pretty => LogFormat::Pretty,
            Format::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Normalize, sanitize and scan a piece of text
    Text {
        input: Option<String>,

        /// Read raw bytes from stdin instead of INPUT
        #[arg(long, conflicts_with = "input")]
        stdin: bool,
    },
    /// Resolve a fragment under the trusted root
    Path {
        fragment: String,

        /// Accept targets that do not exist yet
        #[arg(long)]
        allow_missing: bool,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("guardctl: {:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();
    setup_logging(cli.log_format.into());

    let settings = GuardSettings::load(&cli.config)
        .with_context(|| format!("failed to read {}", cli.config.display()))?
        .with_env_overrides();
    let pipeline = ValidationPipeline::new(
        PipelineConfig::from_settings(settings).context("invalid pipeline configuration")?,
    );
    let metrics = VerdictMetrics::new()?;

    let accepted = match cli.command {
        Command::Text { input, stdin } => {
            let verdict = if stdin {
                let mut raw = Vec::new();
                std::io::stdin().read_to_end(&mut raw)?;
                pipeline.validate_text_bytes(&raw)
            } else {
                let input = input.context("either INPUT or --stdin is required")?;
                pipeline.validate_text(&input)
            };
            metrics.record_text(&verdict);
            print_verdict(&verdict)?
        }
        Command::Path { fragment, allow_missing } => {
            if allow_missing {
                let verdict = pipeline.validate_new_path(&fragment);
                metrics.record_path(&verdict);
                print_verdict(&verdict)?
            } else {
                let verdict = pipeline.validate_path(&fragment);
                metrics.record_path(&verdict);
                print_verdict(&verdict)?
            }
        }
    };

    if cli.metrics {
        print!("{}", metrics.export()?);
    }

    Ok(accepted)
}

fn print_verdict<T: Serialize>(verdict: &Verdict<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(verdict)?);
    Ok(verdict.is_accepted())
}
