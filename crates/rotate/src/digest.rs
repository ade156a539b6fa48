//! Content digests and the `.meta` provenance sidecar.

use std::fmt::Write as FmtWrite;
use std::fs;
use std::io;
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

/// Streaming MD5 + SHA-256 over the bytes read from the input.
///
/// Fed pre-compression, so the digests describe the log data itself, not
/// the encoded output. Finalized once, after the copy loop has confirmed
/// end of stream.
pub struct DigestSet {
    md5: Md5,
    sha256: Sha256,
}

impl DigestSet {
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha256: Sha256::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha256.update(chunk);
    }

    pub fn finalize(self, ifile: &Path, len: u64) -> MetaRecord {
        MetaRecord {
            ifile: ifile.display().to_string(),
            len,
            md5: hex(&self.md5.finalize()),
            sha256: hex(&self.sha256.finalize()),
        }
    }
}

impl Default for DigestSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Provenance record written alongside a rotated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    /// Source filename as given on the command line.
    pub ifile: String,

    /// Total bytes copied out of the source.
    pub len: u64,

    /// MD5 of the copied bytes, lowercase hex.
    pub md5: String,

    /// SHA-256 of the copied bytes, lowercase hex.
    pub sha256: String,
}

impl MetaRecord {
    /// Render the fixed `ifile`, `len`, `md5`, `sha256` line order.
    pub fn to_text(&self) -> String {
        format!(
            "ifile={}\nlen={}\nmd5={}\nsha256={}\n",
            self.ifile, self.len, self.md5, self.sha256
        )
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_text())
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[cfg(test)]
#[path = "digest_test.rs"]
mod digest_test;
