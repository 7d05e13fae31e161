use clap::Parser;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use grc_flowgraph_upgrade::{
    document::{Document, DocumentError},
    migration::{MigrationFailure, Migrator},
    reporter::{ReportError, ReportFormat, TransformationReporter},
    rule_catalog::RuleCatalog,
    schema_version::SchemaVersion,
    version_detector::VersionDetector,
};

#[derive(Parser, Debug)]
#[command(name = "grc-flowgraph-upgrade")]
#[command(about = "Convert legacy GNU Radio Companion flow graphs to a newer block vocabulary")]
struct Args {
    /// Path to the .grc flow graph to convert
    input_file: PathBuf,

    /// Version to convert to (e.g., 3.10) - defaults to the newest release in the catalog
    #[arg(long, value_name = "VERSION")]
    target_version: Option<String>,

    /// Only report the detected source version, without converting
    #[arg(long)]
    detect_only: bool,

    /// Report format: console, json or yaml
    #[arg(long, value_name = "FORMAT", default_value = "console")]
    report_format: ReportFormat,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    InvalidVersion(String),

    #[error("Invalid version pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to parse flow graph: {0}")]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Migration(#[from] MigrationFailure),

    #[error(transparent)]
    Report(#[from] ReportError),
}

fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = run(args) {
        if let CliError::Migration(failure) = &e {
            for line in failure.log.lines() {
                eprintln!("{}", line);
            }
        }
        eprintln!("\n❌ Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), CliError> {
    let catalog = RuleCatalog::standard();
    let reporter = TransformationReporter::new().with_format(args.report_format);

    // Reject a bad target before touching the input file
    let requested_target = args
        .target_version
        .as_deref()
        .map(parse_target_version)
        .transpose()?;

    let source = fs::read_to_string(&args.input_file).map_err(|source| CliError::Read {
        path: args.input_file.clone(),
        source,
    })?;

    if args.detect_only {
        let detection = VersionDetector::new(&catalog).detect_source(&source);
        let report = reporter.generate_detection_report(&catalog, &detection);
        print!("{}", reporter.format_report(&report)?);
        return Ok(());
    }

    let document = Document::parse(&source)?;
    let outcome = Migrator::new(&catalog).migrate(&args.input_file, document, requested_target.as_ref())?;

    // Serialize fully before creating the output file so a failure leaves nothing behind
    let converted = outcome.document.to_xml_string()?;
    fs::write(&outcome.output_path, converted).map_err(|source| CliError::Write {
        path: outcome.output_path.clone(),
        source,
    })?;

    let report = reporter.generate_report(&catalog, &outcome);
    print!("{}", reporter.format_report(&report)?);
    Ok(())
}

/// Validates version string format (X.Y) and converts it
fn parse_target_version(version: &str) -> Result<SchemaVersion, CliError> {
    let version_regex = Regex::new(r"^\d+\.\d+$")?;
    if !version_regex.is_match(version) {
        return Err(CliError::InvalidVersion(format!(
            "Invalid version format '{}'. Expected: X.Y (e.g., 3.10)",
            version
        )));
    }
    version
        .parse()
        .map_err(|e: grc_flowgraph_upgrade::schema_version::SchemaVersionError| {
            CliError::InvalidVersion(e.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_version() {
        assert_eq!(parse_target_version("3.10").unwrap(), SchemaVersion::new(3, 10));
        assert!(parse_target_version("v3.10").is_err());
        assert!(parse_target_version("3.10.1").is_err());
        assert!(parse_target_version("latest").is_err());
        assert!(matches!(parse_target_version("3.x"), Err(CliError::InvalidVersion(_))));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "grc-flowgraph-upgrade",
            "radio.grc",
            "--target-version",
            "3.8",
            "--report-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.input_file, PathBuf::from("radio.grc"));
        assert_eq!(args.target_version.as_deref(), Some("3.8"));
        assert_eq!(args.report_format, ReportFormat::Json);
        assert!(!args.detect_only);
    }
}
