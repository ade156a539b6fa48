//! Copy-and-truncate loop for a live log file.
//!
//! The input may be appended to by an uncontrolled writer for the whole run,
//! so a zero-length read cannot be trusted as end of stream: the writer may
//! have appended between our last read and the EOF check. The loop closes
//! that race by taking an exclusive advisory lock on the input, reading once
//! more, and only treating a second empty read as confirmed EOF. The sink is
//! finalized and the input truncated while that lock is still held, so no
//! appended bytes can fall between the confirmation and the truncate.
//!
//! The lock is transient: it is never held during the bulk of the copy, and
//! it is released whether or not EOF was confirmed. The protocol assumes the
//! writer takes the same advisory lock before appending; a writer that
//! appends without locking can still race the final truncate, which is
//! outside this program's control.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use bunyan_sinks::{LogSink, SinkKind};
use thiserror::Error;
use tracing::debug;

use crate::digest::DigestSet;

/// Read granularity for the copy loop.
const CHUNK_SIZE: usize = 64 * 1024;

pub type Result<T> = std::result::Result<T, RotateError>;

/// Errors that abort a rotation.
///
/// Nothing here is recovered from: every variant ends the invocation, and
/// partial output is left behind rather than cleaned up.
#[derive(Debug, Error)]
pub enum RotateError {
    /// Input could not be opened.
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Input could not be stat'ed for the minimum-size gate.
    #[error("failed to stat '{path}': {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read from the input failed.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The exclusive advisory lock could not be taken.
    #[error("failed to lock '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The advisory lock could not be released.
    #[error("failed to unlock '{path}': {source}")]
    Unlock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input could not be truncated after a confirmed copy.
    #[error("failed to truncate '{path}': {source}")]
    Truncate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output file or stream could not be created.
    #[error("failed to create '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A write to the output sink failed.
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output sink could not be finalized.
    #[error("failed to finalize '{path}': {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The metadata sidecar could not be written.
    #[error("failed to write metadata '{path}': {source}")]
    Meta {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One rotation request, resolved from the command line.
#[derive(Debug, Clone)]
pub struct Rotation {
    /// Live log file to drain.
    pub input: PathBuf,

    /// Destination for the copied bytes.
    pub output: PathBuf,

    /// Output encoding, selected once at startup.
    pub sink: SinkKind,

    /// Skip the whole rotation while the input is smaller than this.
    pub min_size: Option<u64>,

    /// Truncate the input to zero after a confirmed full copy.
    pub truncate: bool,

    /// Record length and digests in an `<output>.meta` sidecar.
    pub meta: bool,
}

/// Outcome of a rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The input was drained; this many bytes were copied.
    Rotated { bytes: u64 },

    /// The input has not reached the configured minimum size. No output
    /// was produced and the input is untouched.
    BelowMinSize,
}

/// Result of the locked end-of-file check.
enum Locked {
    /// EOF confirmed: the sink is closed and the input truncated.
    Done,

    /// The writer appended in the race window; `usize` bytes are in the
    /// buffer and the sink is handed back for the loop to continue.
    More(usize, Box<dyn LogSink>),
}

/// Drain the input into the output sink, truncating the input on a
/// confirmed end of stream.
pub fn run(req: &Rotation) -> Result<Outcome> {
    let mut input = OpenOptions::new()
        .read(true)
        .write(req.truncate)
        .open(&req.input)
        .map_err(|source| RotateError::Open {
            path: req.input.clone(),
            source,
        })?;

    if let Some(min) = req.min_size {
        let len = input
            .metadata()
            .map_err(|source| RotateError::Stat {
                path: req.input.clone(),
                source,
            })?
            .len();
        if len < min {
            debug!(
                input = %req.input.display(),
                len,
                min,
                "input below minimum size, not rotating"
            );
            return Ok(Outcome::BelowMinSize);
        }
    }

    let mut digests = if req.meta { Some(DigestSet::new()) } else { None };

    let out_file = File::create(&req.output).map_err(|source| RotateError::Create {
        path: req.output.clone(),
        source,
    })?;
    let mut sink = req.sink.wrap(out_file).map_err(|source| RotateError::Create {
        path: req.output.clone(),
        source,
    })?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        let mut n = read_chunk(&mut input, &mut buf, &req.input)?;
        if n == 0 {
            // Apparent EOF; confirm it with the writer excluded.
            flock(&input, libc::LOCK_EX).map_err(|source| RotateError::Lock {
                path: req.input.clone(),
                source,
            })?;

            let checked = locked_eof_check(req, &mut input, &mut buf, sink);
            let unlocked = flock(&input, libc::LOCK_UN);

            // A failure inside the locked section takes precedence; the
            // lock is released either way (on the error path, process exit
            // closes the descriptor and drops it).
            match checked? {
                Locked::Done => {
                    unlocked.map_err(|source| RotateError::Unlock {
                        path: req.input.clone(),
                        source,
                    })?;
                    break;
                }
                Locked::More(more, returned) => {
                    unlocked.map_err(|source| RotateError::Unlock {
                        path: req.input.clone(),
                        source,
                    })?;
                    n = more;
                    sink = returned;
                }
            }
        }

        if let Some(digests) = digests.as_mut() {
            digests.update(&buf[..n]);
        }

        sink.write_all(&buf[..n])
            .map_err(|source| RotateError::Write {
                path: req.output.clone(),
                source,
            })?;
        copied += n as u64;
    }

    if let Some(digests) = digests.take() {
        let record = digests.finalize(&req.input, copied);
        let path = meta_path(&req.output);
        record
            .write_to(&path)
            .map_err(|source| RotateError::Meta { path, source })?;
    }

    debug!(
        input = %req.input.display(),
        output = %req.output.display(),
        bytes = copied,
        truncated = req.truncate,
        "rotation complete"
    );

    Ok(Outcome::Rotated { bytes: copied })
}

/// The re-read and finalization performed under the exclusive lock.
///
/// Only a second zero-length read counts as end of stream; the sink is
/// closed and the input truncated before the caller releases the lock, so
/// a cooperating writer cannot append into the gap.
fn locked_eof_check(
    req: &Rotation,
    input: &mut File,
    buf: &mut [u8],
    sink: Box<dyn LogSink>,
) -> Result<Locked> {
    let n = read_chunk(input, buf, &req.input)?;
    if n > 0 {
        return Ok(Locked::More(n, sink));
    }

    sink.close().map_err(|source| RotateError::Close {
        path: req.output.clone(),
        source,
    })?;

    if req.truncate {
        input.set_len(0).map_err(|source| RotateError::Truncate {
            path: req.input.clone(),
            source,
        })?;
    }

    Ok(Locked::Done)
}

fn read_chunk(file: &mut File, buf: &mut [u8], path: &Path) -> Result<usize> {
    file.read(buf).map_err(|source| RotateError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// `<output>.meta`, appended to the full output name.
fn meta_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".meta");
    PathBuf::from(name)
}

/// Whole-file advisory lock on the input descriptor.
fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    // SAFETY: the descriptor is owned by `file` and stays open for the
    // duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
#[path = "rotate_test.rs"]
mod rotate_test;
