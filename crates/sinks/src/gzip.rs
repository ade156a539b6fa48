//! Gzip sink - streaming container writer over raw DEFLATE
//!
//! Produces a standards-compliant gzip member without buffering the whole
//! payload: a fixed 10-byte header up front, a raw DEFLATE stream in the
//! middle, and an 8-byte CRC-32/length trailer at the end. The container
//! framing is written by hand; the compressor runs with no zlib wrapper so
//! the header and trailer here are the only framing in the file.

use std::fs::File;
use std::io::{self, Write};

use flate2::{Compress, Compression, FlushCompress, Status};

use crate::LogSink;

/// Compressed output is staged here and flushed to the file as it fills.
const OUT_BUF_SIZE: usize = 64 * 1024;

const GZ_OS_UNIX: u8 = 0x03;

/// Fixed member header: magic, CM=deflate, no flags, zero mtime, no extra
/// flags, unix origin.
const GZ_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, GZ_OS_UNIX];

/// Streaming gzip encoder.
///
/// The header is written exactly once on construction, before any payload;
/// the trailer exactly once in [`close`](LogSink::close), after the
/// compressor has signalled end of stream.
pub struct GzipSink {
    file: File,
    compress: Compress,
    /// Pending compressed output; `used` bytes are valid.
    buf: Vec<u8>,
    used: usize,
    /// Rolling CRC-32 over the uncompressed input.
    crc: crc32fast::Hasher,
    /// Total uncompressed bytes accepted; the trailer records this mod 2^32.
    total_in: u64,
}

impl GzipSink {
    /// Wrap a destination file, writing the container header immediately.
    pub fn new(mut file: File, level: Compression) -> io::Result<Self> {
        file.write_all(&GZ_HEADER)?;

        Ok(Self {
            file,
            // No zlib wrapper: the gzip framing above replaces it.
            compress: Compress::new(level, false),
            buf: vec![0u8; OUT_BUF_SIZE],
            used: 0,
            crc: crc32fast::Hasher::new(),
            total_in: 0,
        })
    }

    fn drain_buf(&mut self) -> io::Result<()> {
        if self.used > 0 {
            self.file.write_all(&self.buf[..self.used])?;
            self.used = 0;
        }
        Ok(())
    }
}

impl Write for GzipSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while consumed < buf.len() {
            if self.used == self.buf.len() {
                self.drain_buf()?;
            }

            let in_before = self.compress.total_in();
            let out_before = self.compress.total_out();
            self.compress
                .compress(&buf[consumed..], &mut self.buf[self.used..], FlushCompress::None)
                .map_err(io::Error::other)?;
            consumed += (self.compress.total_in() - in_before) as usize;
            self.used += (self.compress.total_out() - out_before) as usize;
        }

        self.crc.update(buf);
        self.total_in += buf.len() as u64;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_buf()?;
        self.file.flush()
    }
}

impl LogSink for GzipSink {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        // A single finish call may produce at most one buffer's worth of
        // output, so drain and re-invoke until the stream ends.
        let mut done = false;
        loop {
            self.drain_buf()?;
            if done {
                break;
            }

            let out_before = self.compress.total_out();
            let status = self
                .compress
                .compress(&[], &mut self.buf[self.used..], FlushCompress::Finish)
                .map_err(io::Error::other)?;
            self.used += (self.compress.total_out() - out_before) as usize;

            if matches!(status, Status::StreamEnd) {
                done = true;
            }
        }

        let Self {
            mut file,
            crc,
            total_in,
            ..
        } = *self;

        file.write_all(&crc.finalize().to_le_bytes())?;
        file.write_all(&(total_in as u32).to_le_bytes())?;

        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.total_in
    }
}

#[cfg(test)]
#[path = "gzip_test.rs"]
mod gzip_test;
