//! geez-pdf
//!
//! Replaces the Western-Arabic page numbers printed in a PDF's bottom
//! corners with Ge'ez numerals drawn in the outer margin.
//!
//! The font and configuration are loaded before the input is read, so a
//! bad setup fails without touching any document. Output is written to a
//! `.partial` file and renamed into place only once it is complete.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use geez_core::{AnnotatorConfig, DocumentProcessor, FontResource, GeezError};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Largest accepted input, 16 MiB
const DEFAULT_MAX_INPUT_BYTES: u64 = 16 * 1024 * 1024;

/// Command-line arguments for geez-pdf
#[derive(Parser, Debug)]
#[command(name = "geez-pdf")]
#[command(about = "Replace a PDF's Arabic page numbers with Ge'ez numerals")]
struct Args {
    /// PDF to renumber
    input: PathBuf,

    /// Output path (default: geez_<input name> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TrueType font containing the Ge'ez numeral glyphs
    #[arg(long, default_value = "static/Tayitu.ttf")]
    font: PathBuf,

    /// TOML file with detection, placement and redaction settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refuse inputs larger than this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_INPUT_BYTES)]
    max_input_bytes: u64,

    /// Print a JSON report of the changes to stdout
    #[arg(long)]
    report: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => AnnotatorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnnotatorConfig::default(),
    };
    let font = FontResource::from_file(&args.font)
        .with_context(|| format!("Failed to load font {}", args.font.display()))?;
    info!("Using font {} from {}", font.name(), args.font.display());
    let processor = DocumentProcessor::new(Arc::new(font), config);

    let input = read_input(&args.input, args.max_input_bytes)?;
    let output = processor
        .process(&input)
        .with_context(|| format!("Failed to renumber {}", args.input.display()))?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    write_output(&output_path, &output.data)?;

    info!(
        "Wrote {} ({} pages, {} numbers replaced)",
        output_path.display(),
        output.report.page_count,
        output.report.redacted_fragments()
    );

    if args.report {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    }

    Ok(())
}

fn read_input(path: &Path, max_bytes: u64) -> anyhow::Result<Vec<u8>> {
    let size = fs::metadata(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .len();
    if size > max_bytes {
        return Err(GeezError::UnsupportedInput(format!(
            "{} is {} bytes, the limit is {}",
            path.display(),
            size,
            max_bytes
        ))
        .into());
    }
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// `dir/book.pdf` becomes `dir/geez_book.pdf`.
fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    input.with_file_name(format!("geez_{}", name))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut partial = OsString::from(path.as_os_str());
    partial.push(".partial");
    PathBuf::from(partial)
}

/// Write to `<path>.partial`, then rename over `path`. The partial file is
/// removed if either step fails.
fn write_output(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let partial = partial_path(path);
    if let Err(e) = fs::write(&partial, data) {
        let _ = fs::remove_file(&partial);
        return Err(e).with_context(|| format!("Failed to write {}", partial.display()));
    }
    if let Err(e) = fs::rename(&partial, path) {
        let _ = fs::remove_file(&partial);
        return Err(e).with_context(|| format!("Failed to move output to {}", path.display()));
    }
    Ok(())
}
