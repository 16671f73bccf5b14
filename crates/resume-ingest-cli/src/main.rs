//! resume-ingest CLI
//!
//! Usage:
//!   resume-ingest detect <FILE>             Detect the document type
//!   resume-ingest validate <FILE>           Validate without decoding
//!   resume-ingest parse <FILE>              Parse one document
//!   resume-ingest batch <FILE>...           Parse several documents
//!
//! Results are printed as JSON on stdout. Failures print a structured error report on
//! stdout, the end-user message on stderr, and exit non-zero.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resume_ingest::core::progress::ProgressCallback;
use resume_ingest::{
    DocumentParser, ErrorKind, IngestConfig, OwnedInput, ParserError, ProgressEvent, ProgressReporter, RawInput,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code for input the service refused (bad type, too large, failed validation).
const EXIT_REJECTED: u8 = 2;
/// Exit code for documents that were accepted but could not be decoded.
const EXIT_FAILED: u8 = 1;

#[derive(Parser)]
#[command(
    name = "resume-ingest",
    version,
    about = "Detect, validate and extract text from uploaded résumés",
    after_help = "EXAMPLES:\n  \
                  resume-ingest detect cv.pdf\n  \
                  resume-ingest parse --progress cv.docx\n  \
                  resume-ingest batch --concurrency 4 --stop-on-error uploads/*.pdf\n\n\
                  Without --config, resume-ingest.toml is looked up in the current directory and its parents."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Maximum accepted file size in bytes
    #[arg(long, global = true)]
    max_size: Option<u64>,

    /// Per-attempt decode timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the type of a document from its content and name
    Detect {
        file: PathBuf,
    },

    /// Validate a document without decoding it
    Validate {
        file: PathBuf,
    },

    /// Parse a single document
    Parse {
        file: PathBuf,

        /// Report progress on stderr
        #[arg(long)]
        progress: bool,
    },

    /// Parse several documents
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Documents processed at the same time
        #[arg(long)]
        concurrency: Option<usize>,

        /// Abort on the first failing document
        #[arg(long)]
        stop_on_error: bool,

        /// Report progress on stderr
        #[arg(long)]
        progress: bool,
    },
}

#[derive(Serialize)]
struct BatchEntry<'a> {
    file: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a resume_ingest::ParseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<resume_ingest::ErrorReport>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(max_size) = cli.max_size {
        config.max_file_size = max_size;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Command::Batch {
        concurrency,
        stop_on_error,
        ..
    } = &cli.command
    {
        if let Some(concurrency) = concurrency {
            config.concurrency = *concurrency;
        }
        config.stop_on_error |= *stop_on_error;
    }

    let parser = DocumentParser::new(config).context("Invalid configuration")?;

    match cli.command {
        Command::Detect { file } => {
            let content = read_file(&file)?;
            let input = RawInput::new(&content).with_filename(file_name(&file));
            match parser.detect(&input) {
                Ok(detection) => print_json(&detection),
                Err(err) => Ok(report_failure(&err)),
            }
        }
        Command::Validate { file } => {
            let content = read_file(&file)?;
            let input = RawInput::new(&content).with_filename(file_name(&file));
            let report = parser.validate(&input);
            print_json(&report)?;
            if report.valid {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_REJECTED))
            }
        }
        Command::Parse { file, progress } => {
            let content = read_file(&file)?;
            let input = RawInput::new(&content).with_filename(file_name(&file));
            let reporter = progress_reporter(progress, parser.config().progress_interval());
            match parser.parse_with_progress(&input, &reporter).await {
                Ok(result) => print_json(&result),
                Err(err) => Ok(report_failure(&err)),
            }
        }
        Command::Batch { files, progress, .. } => {
            let inputs = files
                .iter()
                .map(|path| Ok(OwnedInput::new(read_file(path)?).with_filename(file_name(path))))
                .collect::<Result<Vec<_>>>()?;
            let reporter = progress_reporter(progress, parser.config().progress_interval());

            let outcome = match parser.parse_batch_with_progress(inputs, reporter).await {
                Ok(outcome) => outcome,
                Err(err) => return Ok(report_failure(&err)),
            };

            let entries: Vec<BatchEntry<'_>> = files
                .iter()
                .zip(&outcome.results)
                .map(|(file, result)| match result {
                    Ok(parsed) => BatchEntry {
                        file,
                        result: Some(parsed),
                        error: None,
                    },
                    Err(err) => BatchEntry {
                        file,
                        result: None,
                        error: Some(err.report()),
                    },
                })
                .collect();
            print_json(&entries)?;

            let stats = parser.statistics();
            tracing::info!(
                processed = stats.files_processed,
                succeeded = stats.successes,
                failed = stats.errors,
                average_ms = stats.average_processing_time_ms,
                "Batch complete"
            );
            if outcome.is_complete_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_FAILED))
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    if let Some(path) = path {
        return IngestConfig::from_file(path).with_context(|| format!("Failed to load config from {}", path.display()));
    }
    let discovered = IngestConfig::discover().context("Failed to discover configuration")?;
    Ok(discovered.unwrap_or_default())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|name| name.to_str()).unwrap_or_default()
}

fn progress_reporter(enabled: bool, interval: std::time::Duration) -> ProgressReporter {
    if !enabled {
        return ProgressReporter::silent();
    }
    let callback: ProgressCallback = Arc::new(|event: &ProgressEvent| {
        let stage = event.stage.as_deref().unwrap_or("batch");
        eprintln!("[{:>5.1}%] {}: {}", event.percent, stage, event.message);
    });
    ProgressReporter::new(callback, interval)
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(ExitCode::SUCCESS)
}

fn report_failure(err: &ParserError) -> ExitCode {
    match serde_json::to_string_pretty(&err.report()) {
        Ok(json) => println!("{}", json),
        Err(serialize_err) => tracing::error!(error = %serialize_err, "Failed to serialize error report"),
    }
    eprintln!("Error: {}", err.user_message());
    match err.kind() {
        ErrorKind::Validation | ErrorKind::FileSize | ErrorKind::UnsupportedFormat => ExitCode::from(EXIT_REJECTED),
        _ => ExitCode::from(EXIT_FAILED),
    }
}
