//! Bunyan - Output sinks
//!
//! Pluggable output destinations for the log rotator. A sink owns the
//! destination file for the duration of one rotation and is finalized
//! exactly once via [`LogSink::close`].
//!
//! # Available Sinks
//!
//! | Sink | Purpose |
//! |------|---------|
//! | [`RawSink`] | Plain pass-through file output |
//! | [`GzipSink`] | Streaming gzip container (hand-framed header/trailer) |
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Write;
//! use bunyan_sinks::{Compression, SinkKind};
//!
//! let file = File::create("bunyan.log.gz")?;
//! let mut sink = SinkKind::Gzip(Compression::default()).wrap(file)?;
//!
//! sink.write_all(b"{\"msg\":\"hello\"}\n")?;
//! sink.close()?;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::fs::File;
use std::io::{self, Write};

mod gzip;
mod raw;

pub use gzip::GzipSink;
pub use raw::RawSink;

// Callers pick a compression level without depending on flate2 themselves.
pub use flate2::Compression;

/// Write half of a sink.
///
/// This is object-safe and can be used with `Box<dyn LogSink>`. Dropping a
/// sink without calling [`close`](LogSink::close) releases the file but does
/// not finalize the output stream.
pub trait LogSink: Write + Send {
    /// Finalize any pending output and close the underlying file.
    fn close(self: Box<Self>) -> io::Result<()>;

    /// Uncompressed bytes accepted so far.
    fn bytes_written(&self) -> u64;
}

/// Output encoding, selected once from configuration at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Plain pass-through file output.
    Raw,

    /// Streaming gzip container at the given compression level.
    Gzip(Compression),
}

impl SinkKind {
    /// Wrap a destination file with this sink's encoding.
    ///
    /// For [`SinkKind::Gzip`] this writes the container header immediately,
    /// so a wrap failure can leave a partial header behind.
    pub fn wrap(&self, file: File) -> io::Result<Box<dyn LogSink>> {
        match *self {
            SinkKind::Raw => Ok(Box::new(RawSink::new(file))),
            SinkKind::Gzip(level) => Ok(Box::new(GzipSink::new(file, level)?)),
        }
    }
}

// Tests are registered in their respective modules via #[cfg(test)]
// See: raw.rs, gzip.rs
