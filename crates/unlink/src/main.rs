//! bunyan-unlink - age-based pruning of rotated logs
//!
//! Deletes rotated log files once they are old enough, judged by an inode
//! timestamp or by a date parsed out of the filename. Runs once per
//! invocation; a periodic scheduler drives it per directory.
//!
//! # Usage
//!
//! ```bash
//! # Delete files not modified in the last 3 days (the default)
//! bunyan-unlink /var/log/app/archive
//!
//! # Show what a 12-hour sweep keyed on the filename date would delete
//! bunyan-unlink -n -H 12 -f 'bunyan.%Y%m%dT%H%M%S' /var/log/app/archive
//! ```

mod sweep;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Duration, Local};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sweep::{AgeField, MatchStrategy, Sweep};

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: i64 = 60 * 60 * 24;
const SECONDS_PER_WEEK: i64 = 60 * 60 * 24 * 7;

/// Delete rotated log files older than a configured age.
#[derive(Parser, Debug)]
#[command(name = "bunyan-unlink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Match on last access time
    #[arg(short = 'a', long, group = "match")]
    atime: bool,

    /// Match on last inode change time
    #[arg(short = 'c', long, group = "match")]
    ctime: bool,

    /// Match on last modification time (the default)
    #[arg(short = 'm', long, group = "match")]
    mtime: bool,

    /// Match on a timestamp parsed from the filename with this strftime format
    #[arg(short = 'f', long, value_name = "FORMAT", group = "match")]
    format: Option<String>,

    /// Print matching files instead of deleting them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Age in minutes
    #[arg(short = 'M', long, value_name = "N", group = "age",
          value_parser = clap::value_parser!(u32).range(1..))]
    minutes: Option<u32>,

    /// Age in hours
    #[arg(short = 'H', long, value_name = "N", group = "age",
          value_parser = clap::value_parser!(u32).range(1..))]
    hours: Option<u32>,

    /// Age in days
    #[arg(short = 'D', long, value_name = "N", group = "age",
          value_parser = clap::value_parser!(u32).range(1..))]
    days: Option<u32>,

    /// Age in weeks
    #[arg(short = 'W', long, value_name = "N", group = "age",
          value_parser = clap::value_parser!(u32).range(1..))]
    weeks: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Directory to sweep
    #[arg(default_value = ".")]
    dir: PathBuf,
}

impl Cli {
    fn age_seconds(&self) -> i64 {
        if let Some(n) = self.minutes {
            i64::from(n) * SECONDS_PER_MINUTE
        } else if let Some(n) = self.hours {
            i64::from(n) * SECONDS_PER_HOUR
        } else if let Some(n) = self.days {
            i64::from(n) * SECONDS_PER_DAY
        } else if let Some(n) = self.weeks {
            i64::from(n) * SECONDS_PER_WEEK
        } else {
            3 * SECONDS_PER_DAY
        }
    }

    fn strategy(&self) -> MatchStrategy {
        if let Some(format) = &self.format {
            MatchStrategy::NameFormat(format.clone())
        } else if self.atime {
            MatchStrategy::Age(AgeField::Accessed)
        } else if self.ctime {
            MatchStrategy::Age(AgeField::Changed)
        } else {
            MatchStrategy::Age(AgeField::Modified)
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let request = Sweep {
        cutoff: Local::now() - Duration::seconds(cli.age_seconds()),
        strategy: cli.strategy(),
        dry_run: cli.dry_run,
        dir: cli.dir,
    };

    let report = sweep::run(&request)
        .with_context(|| format!("failed to read directory '{}'", request.dir.display()))?;

    tracing::debug!(
        matched = report.matched,
        removed = report.removed,
        "sweep complete"
    );

    if report.had_errors {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Initialize the tracing subscriber for logging.
///
/// Diagnostics go to stderr; stdout carries only the dry-run listing.
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
