//! bunyan-rotate - copy-truncate rotation for live bunyan logs
//!
//! Drains a newline-delimited JSON log that a daemon is still appending to,
//! into a plain or gzip-compressed archive, without losing in-flight writes.
//!
//! # Usage
//!
//! ```bash
//! # Plain copy, truncating the live log afterwards
//! bunyan-rotate /var/log/app/bunyan.log /var/log/app/bunyan.%Y%m%dT%H%M%S.log
//!
//! # Gzip at the default level, only once the log reaches 16M, with digests
//! bunyan-rotate -z -s 16M -M /var/log/app/bunyan.log /var/log/app/bunyan.%s.log.gz
//! ```

mod digest;
mod rotate;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bunyan_sinks::{Compression, SinkKind};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rotate a live bunyan log into a plain or gzip-compressed archive.
#[derive(Parser, Debug)]
#[command(name = "bunyan-rotate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Take the output path literally instead of as a strftime template
    #[arg(short = 'F', long)]
    no_format: bool,

    /// Compress with gzip at this level (1 = fastest, 9 = smallest)
    #[arg(short = 'l', long, value_name = "LEVEL",
          value_parser = clap::value_parser!(u32).range(1..=9))]
    level: Option<u32>,

    /// Record length and MD5/SHA-256 digests in an <output>.meta sidecar
    #[arg(short = 'M', long)]
    meta: bool,

    /// Only rotate once the input is at least this big (K/M/G/T suffixes)
    #[arg(short = 's', long, value_name = "SIZE", value_parser = parse_scaled)]
    size: Option<u64>,

    /// Copy without truncating the input afterwards
    #[arg(short = 'T', long)]
    no_truncate: bool,

    /// Compress with gzip at the default level
    #[arg(short = 'z', long)]
    gzip: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Live log file to rotate
    input: PathBuf,

    /// Output path, rendered as a strftime template with the current time
    output: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let sink = match cli.level {
        Some(level) => SinkKind::Gzip(Compression::new(level)),
        None if cli.gzip => SinkKind::Gzip(Compression::default()),
        None => SinkKind::Raw,
    };

    let output = if cli.no_format {
        PathBuf::from(&cli.output)
    } else {
        render_output_path(&cli.output)?
    };

    let request = rotate::Rotation {
        input: cli.input,
        output,
        sink,
        min_size: cli.size,
        truncate: !cli.no_truncate,
        meta: cli.meta,
    };

    // BelowMinSize is a clean exit: not ready to rotate yet.
    rotate::run(&request)?;

    Ok(())
}

/// Render the output template with the current local time.
fn render_output_path(template: &str) -> Result<PathBuf> {
    use std::fmt::Write as FmtWrite;

    let mut rendered = String::new();
    write!(rendered, "{}", Local::now().format(template))
        .ok()
        .with_context(|| format!("invalid output template '{}'", template))?;

    if rendered.is_empty() {
        bail!("output template '{}' rendered an empty name", template);
    }

    Ok(PathBuf::from(rendered))
}

/// Parse a byte count with an optional K/M/G/T (powers of 1024) suffix.
fn parse_scaled(raw: &str) -> std::result::Result<u64, String> {
    let raw = raw.trim();
    let (digits, shift) = match raw.chars().last() {
        Some(suffix) if suffix.is_ascii_alphabetic() => {
            let shift = match suffix.to_ascii_uppercase() {
                'B' => 0,
                'K' => 10,
                'M' => 20,
                'G' => 30,
                'T' => 40,
                _ => return Err(format!("unknown size suffix '{}'", suffix)),
            };
            (&raw[..raw.len() - 1], shift)
        }
        _ => (raw, 0),
    };

    let count: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{}'", raw))?;
    let scaled = count
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size '{}' is too large", raw))?;

    if scaled == 0 {
        return Err("size must be positive".to_string());
    }

    Ok(scaled)
}

/// Initialize the tracing subscriber for logging.
///
/// Diagnostics go to stderr; stdout stays clean.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("warn"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
