//! Age-based directory sweep.
//!
//! Walks one directory (non-recursive), matching regular files against a
//! cutoff instant and unlinking (or, in dry-run mode, printing) the ones
//! that are old enough. Dotfiles and non-regular files are skipped.
//!
//! Per-entry failures are warnings, not fatal: a half-pruned directory is
//! still useful, and the next scheduled run will retry whatever was left.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

/// One sweep request, resolved from the command line.
#[derive(Debug, Clone)]
pub struct Sweep {
    /// Directory to walk.
    pub dir: PathBuf,

    /// Files at or before this instant match.
    pub cutoff: DateTime<Local>,

    /// How a file's age is judged.
    pub strategy: MatchStrategy,

    /// Print matching names to stdout instead of deleting.
    pub dry_run: bool,
}

/// How a file's age is judged against the cutoff.
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    /// Compare one of the file's timestamps.
    Age(AgeField),

    /// Parse a timestamp out of the filename with a strftime format;
    /// names the format cannot parse never match.
    NameFormat(String),
}

/// Which inode timestamp to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeField {
    /// Last access.
    Accessed,

    /// Last data modification.
    Modified,

    /// Last inode change.
    Changed,
}

impl AgeField {
    fn seconds(&self, meta: &fs::Metadata) -> i64 {
        match self {
            AgeField::Accessed => meta.atime(),
            AgeField::Modified => meta.mtime(),
            AgeField::Changed => meta.ctime(),
        }
    }
}

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files whose age matched the cutoff.
    pub matched: u64,

    /// Files actually unlinked (zero in dry-run mode).
    pub removed: u64,

    /// Whether any per-entry operation failed.
    pub had_errors: bool,
}

/// Walk the directory once.
///
/// Returns `Err` only when the directory itself cannot be read; per-entry
/// failures are logged and surface as [`SweepReport::had_errors`].
pub fn run(sweep: &Sweep) -> io::Result<SweepReport> {
    let mut report = SweepReport::default();

    for entry in fs::read_dir(&sweep.dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %sweep.dir.display(), error = %e, "failed to read directory entry");
                report.had_errors = true;
                continue;
            }
        };

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(file = %name, error = %e, "failed to stat");
                report.had_errors = true;
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }

        if !sweep.strategy.matches(sweep.cutoff, &meta, &name) {
            continue;
        }
        report.matched += 1;

        if sweep.dry_run {
            println!("{}", name);
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(file = %name, "unlinked");
                report.removed += 1;
            }
            Err(e) => {
                warn!(file = %name, error = %e, "failed to unlink");
                report.had_errors = true;
            }
        }
    }

    Ok(report)
}

impl MatchStrategy {
    fn matches(&self, cutoff: DateTime<Local>, meta: &fs::Metadata, name: &str) -> bool {
        match self {
            MatchStrategy::Age(field) => field.seconds(meta) <= cutoff.timestamp(),
            MatchStrategy::NameFormat(format) => match parse_name_stamp(format, name, cutoff) {
                Some(stamp) => stamp <= cutoff.naive_local(),
                None => false,
            },
        }
    }
}

/// Parse a timestamp out of a filename.
///
/// The format is matched against a prefix of the name, so trailing pieces
/// like `.log.gz` need not be spelled out. A date-only format borrows the
/// cutoff's time of day; a format naming less than a full date never
/// matches.
fn parse_name_stamp(format: &str, name: &str, cutoff: DateTime<Local>) -> Option<NaiveDateTime> {
    if let Ok((stamp, _rest)) = NaiveDateTime::parse_and_remainder(name, format) {
        return Some(stamp);
    }

    if let Ok((date, _rest)) = NaiveDate::parse_and_remainder(name, format) {
        return Some(date.and_time(cutoff.time()));
    }

    None
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod sweep_test;
