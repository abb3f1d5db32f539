//! logsieve CLI - build filter packs and run pack scans
//!
//! Two subcommands wrap the library's pack builder and stage-A scanner:
//!
//! ```text
//! logsieve pack --output pack.clpf --manifest filters.tsv --output-json out.json
//! logsieve scan --pack-path pack.clpf --archives A1,A2 --query 'f == "x"' --output-json out.json
//! ```
//!
//! Results are written as a single JSON document to `--output-json`; errors
//! go to stderr as structured log lines and exit with status 1. JSON is
//! only written once the full result is computed — a failing run never
//! leaves partial output behind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use logsieve::{build_pack, read_manifest, scan_pack, Result, SieveError};

#[derive(Parser)]
#[command(name = "logsieve")]
#[command(version, about = "Probabilistic pre-filter tooling for log archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a filter pack from a manifest of per-archive filter files
    Pack {
        /// Output filter pack path
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Manifest file: one `archive_id<TAB>filter_path` per line
        #[arg(long)]
        manifest: PathBuf,

        /// Write the JSON build summary to this file
        #[arg(long = "output-json")]
        output_json: PathBuf,
    },

    /// Scan a filter pack and report which archives may match a query
    Scan {
        /// Path to the filter pack file
        #[arg(long = "pack-path")]
        pack_path: PathBuf,

        /// Comma-separated candidate archive ids
        #[arg(long)]
        archives: String,

        /// Query to extract filter terms from
        #[arg(long, short = 'q')]
        query: String,

        /// Write the JSON scan result to this file
        #[arg(long = "output-json")]
        output_json: PathBuf,
    },
}

/// Formats stderr log lines as `YYYY-MM-DDTHH:MM:SS.mmm±zz [level] message`.
struct LogLineFormat;

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%z");
        let level = event.metadata().level().as_str().to_ascii_lowercase();
        write!(writer, "{timestamp} [{level}] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .event_format(LogLineFormat)
        .with_env_filter(filter)
        .init();
}

fn emit_json<T: Serialize>(output_path: &Path, payload: &T) -> Result<()> {
    // Serialize fully before touching the file so a failure cannot leave
    // partial JSON behind.
    let text = serde_json::to_string(payload)
        .map_err(|e| SieveError::InvalidArgument(format!("failed to encode JSON output: {e}")))?;
    std::fs::write(output_path, text)?;
    Ok(())
}

fn split_archive_ids(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn run_pack(output: &Path, manifest: &Path, output_json: &Path) -> Result<()> {
    let entries = read_manifest(manifest)?;
    let result = build_pack(output, &entries)?;
    emit_json(output_json, &result)
}

fn run_scan(pack_path: &Path, archives: &str, query: &str, output_json: &Path) -> Result<()> {
    let archive_ids = split_archive_ids(archives);
    if archive_ids.is_empty() {
        return Err(SieveError::InvalidArgument(
            "archives must include at least one id".to_string(),
        ));
    }
    let outcome = scan_pack(pack_path, &archive_ids, query)?;
    emit_json(output_json, &outcome)
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Pack {
            output,
            manifest,
            output_json,
        } => run_pack(output, manifest, output_json),
        Commands::Scan {
            pack_path,
            archives,
            query,
            output_json,
        } => run_scan(pack_path, archives, query, output_json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}
