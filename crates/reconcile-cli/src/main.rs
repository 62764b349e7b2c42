//! reconcile-cli — headless two-sided reconciliation runner.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use reconcile_core::{
    reconcile, CancellationToken, CurrencyRateProvider, ExecContext, NeverCancelled, NoopProgress,
    ProgressEvent, ProgressSink, ReconConfig, Row, Scalar, SystemClock,
};

const EXIT_SUCCESS: u8 = 0;
const EXIT_MISMATCH: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_RUNTIME: u8 = 3;
const EXIT_INVALID_CONFIG: u8 = 4;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(about = "Config-driven multi-source reconciliation")]
#[command(version)]
struct Cli {
    /// Path to the reconciliation config JSON file
    config: PathBuf,

    /// Path to the source-side CSV file
    source: PathBuf,

    /// Path to the target-side CSV file
    target: PathBuf,

    /// Print the full verdict list as JSON to stdout
    #[arg(long)]
    json: bool,

    /// Write the full JSON batch to a file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print progress to stderr as the run proceeds
    #[arg(long)]
    progress: bool,
}

struct NoRates;

impl CurrencyRateProvider for NoRates {
    fn rate(&self, _from: &str, _to: &str) -> Option<f64> {
        None
    }
}

struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn on_progress(&self, event: ProgressEvent) {
        eprintln!("{}: {:.1}%", event.stage.label(), event.processed_percent);
    }
}

fn load_csv_rows(path: &PathBuf) -> Result<Vec<Row>, String> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let mut rows = Vec::new();
    for (line_index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("{}: row {}: {e}", path.display(), line_index + 2))?;
        let mut row: Row = HashMap::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Scalar::String(value.to_string()));
        }
        row.insert(reconcile_core::value::LINE_KEY.to_string(), Scalar::Number((line_index + 2) as f64));
        rows.push(row);
    }
    Ok(rows)
}

fn run(cli: &Cli) -> Result<ExitCode, (u8, String)> {
    let config_str = std::fs::read_to_string(&cli.config)
        .map_err(|e| (EXIT_RUNTIME, format!("cannot read config: {e}")))?;
    let config = ReconConfig::from_json(&config_str).map_err(|e| (EXIT_INVALID_CONFIG, e.to_string()))?;

    let sources = load_csv_rows(&cli.source).map_err(|e| (EXIT_RUNTIME, e))?;
    let targets = load_csv_rows(&cli.target).map_err(|e| (EXIT_RUNTIME, e))?;

    let rates = NoRates;
    let clock = SystemClock;
    let ctx = ExecContext { rates: &rates, clock: &clock };

    let progress: Box<dyn ProgressSink> = if cli.progress { Box::new(StderrProgress) } else { Box::new(NoopProgress) };
    let cancel: &dyn CancellationToken = &NeverCancelled;

    let batch = reconcile(sources, targets, &config, &ctx, progress.as_ref(), cancel)
        .map_err(|e| (EXIT_RUNTIME, e.to_string()))?;

    let json_str = serde_json::to_string_pretty(&batch)
        .map_err(|e| (EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = cli.output {
        std::fs::write(path, &json_str).map_err(|e| (EXIT_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if cli.json {
        println!("{json_str}");
    }

    let s = &batch.summary;
    eprintln!(
        "reconcile: {} matched, {} discrepancies, {} unmatched source, {} unmatched target, {} dropped",
        s.matched, s.discrepancy, s.unmatched_source, s.unmatched_target, s.dropped_rows
    );

    if s.discrepancy > 0 || s.unmatched_source > 0 || s.unmatched_target > 0 {
        return Ok(ExitCode::from(EXIT_MISMATCH));
    }

    Ok(ExitCode::from(EXIT_SUCCESS))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err((code, message)) => {
            eprintln!("error: {message}");
            if code == EXIT_USAGE {
                eprintln!("usage: reconcile <config.json> <source.csv> <target.csv>");
            }
            ExitCode::from(code)
        }
    }
}
