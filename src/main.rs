use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info};

use rusty_quality::report::{MarkdownReport, ReportSink, TextReport, write_csv, write_json};
use rusty_quality::{BatchOptions, RuleSource, StoreLocation, load_registry, run_batch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Markdown,
}

/// Validate every table of a store against per-dataset quality rules.
#[derive(Debug, Parser)]
#[command(name = "rusty-quality", version, about)]
struct Args {
    /// SQLite database file, or a directory of .csv/.json/.parquet tables.
    #[arg(long, env = "RQ_STORE")]
    store: PathBuf,

    /// YAML or JSON rule overrides. Without it every table uses the default rule.
    #[arg(long, env = "RQ_RULES")]
    rules: Option<PathBuf>,

    /// Where to write the result table (stdout when omitted).
    #[arg(short, long, env = "RQ_OUTPUT")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv, env = "RQ_FORMAT")]
    format: OutputFormat,

    /// Also render a paginated report to this file.
    #[arg(long, env = "RQ_REPORT")]
    report: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text, env = "RQ_REPORT_FORMAT")]
    report_format: ReportFormat,

    /// Worker threads; 1 validates sequentially.
    #[arg(long, default_value_t = 1, env = "RQ_WORKERS")]
    workers: usize,

    /// Seconds a table read may wait on a locked store.
    #[arg(long, default_value_t = 30, env = "RQ_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Exit with status 2 when any dataset is ERROR.
    #[arg(long, env = "RQ_FAIL_ON_ERROR")]
    fail_on_error: bool,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let outcome = match run(&args) {
        Ok(errors) => Some(errors),
        Err(e) => {
            error!("{e:#}");
            None
        }
    };
    ExitCode::from(exit_status(outcome, args.fail_on_error))
}

/// 0 when the batch ran, 1 when it could not run, 2 when `fail_on_error`
/// is set and at least one dataset is ERROR.
fn exit_status(error_count: Option<usize>, fail_on_error: bool) -> u8 {
    match error_count {
        None => 1,
        Some(errors) if errors > 0 && fail_on_error => 2,
        Some(_) => 0,
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Run the batch and write its outputs. Returns the number of ERROR datasets.
fn run(args: &Args) -> Result<usize> {
    let source = args.rules.clone().map(RuleSource::File);
    let registry = load_registry(source.as_ref()).context("loading rule overrides")?;
    if registry.is_empty() {
        info!("no rule overrides, every dataset uses the default rule");
    } else {
        debug!("{} dataset(s) have rule overrides", registry.len());
    }

    let location = StoreLocation::from_path(&args.store)
        .with_context(|| format!("opening store {}", args.store.display()))?;
    let options = BatchOptions {
        workers: args.workers,
        load_timeout: Duration::from_secs(args.timeout_secs),
    };
    let batch = run_batch(&location, &registry, &options).context("running validation batch")?;
    debug!("{} diagnostic(s) recorded", batch.diagnostics.len());

    let out = open_output(args.output.as_deref())?;
    let written = match args.format {
        OutputFormat::Csv => write_csv(&batch.results, out),
        OutputFormat::Json => write_json(&batch.results, out),
    };
    written.context("writing results")?;

    if let Some(path) = &args.report {
        let file = BufWriter::new(
            File::create(path).with_context(|| format!("creating report {}", path.display()))?,
        );
        let rendered = match args.report_format {
            ReportFormat::Text => TextReport::new(file).render(&batch.results),
            ReportFormat::Markdown => MarkdownReport::new(file).render(&batch.results),
        };
        rendered.context("rendering report")?;
    }

    Ok(batch.error_count())
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("creating {}", p.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}
