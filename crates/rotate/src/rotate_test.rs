//! Tests for the copy-and-truncate loop

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use bunyan_sinks::{Compression, SinkKind};
use tempfile::TempDir;

use super::*;

fn request(dir: &TempDir, sink: SinkKind) -> Rotation {
    Rotation {
        input: dir.path().join("bunyan.log"),
        output: dir.path().join("out.log"),
        sink,
        min_size: None,
        truncate: true,
        meta: false,
    }
}

fn pattern(len: usize) -> Vec<u8> {
    b"{\"level\":30,\"msg\":\"tick\"}\n"
        .iter()
        .cycle()
        .take(len)
        .copied()
        .collect()
}

#[test]
fn test_plain_copy_and_truncate() {
    let dir = TempDir::new().unwrap();
    let req = request(&dir, SinkKind::Raw);
    let payload = pattern(200_000);
    fs::write(&req.input, &payload).unwrap();

    let outcome = run(&req).unwrap();

    assert_eq!(outcome, Outcome::Rotated { bytes: 200_000 });
    assert_eq!(fs::read(&req.output).unwrap(), payload);
    assert_eq!(fs::metadata(&req.input).unwrap().len(), 0);
}

#[test]
fn test_copy_only_leaves_input_untouched() {
    let dir = TempDir::new().unwrap();
    let mut req = request(&dir, SinkKind::Raw);
    req.truncate = false;
    let payload = pattern(4096);
    fs::write(&req.input, &payload).unwrap();

    run(&req).unwrap();

    assert_eq!(fs::read(&req.output).unwrap(), payload);
    assert_eq!(fs::read(&req.input).unwrap(), payload);
}

#[test]
fn test_empty_input_produces_empty_output() {
    let dir = TempDir::new().unwrap();
    let mut req = request(&dir, SinkKind::Raw);
    req.meta = true;
    fs::write(&req.input, b"").unwrap();

    let outcome = run(&req).unwrap();

    assert_eq!(outcome, Outcome::Rotated { bytes: 0 });
    assert!(fs::read(&req.output).unwrap().is_empty());

    let meta = fs::read_to_string(meta_path(&req.output)).unwrap();
    assert!(meta.contains("len=0\n"));
}

#[test]
fn test_min_size_gate_blocks_small_input() {
    let dir = TempDir::new().unwrap();
    let mut req = request(&dir, SinkKind::Raw);
    req.min_size = Some(1000);
    req.meta = true;
    let payload = pattern(999);
    fs::write(&req.input, &payload).unwrap();

    let outcome = run(&req).unwrap();

    assert_eq!(outcome, Outcome::BelowMinSize);
    assert!(!req.output.exists());
    assert!(!meta_path(&req.output).exists());
    assert_eq!(fs::read(&req.input).unwrap(), payload);
}

#[test]
fn test_min_size_gate_allows_exact_threshold() {
    let dir = TempDir::new().unwrap();
    let mut req = request(&dir, SinkKind::Raw);
    req.min_size = Some(1000);
    fs::write(&req.input, pattern(1000)).unwrap();

    let outcome = run(&req).unwrap();

    assert_eq!(outcome, Outcome::Rotated { bytes: 1000 });
    assert_eq!(fs::metadata(&req.input).unwrap().len(), 0);
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = TempDir::new().unwrap();
    let req = request(&dir, SinkKind::Raw);

    let err = run(&req).unwrap_err();
    assert!(matches!(err, RotateError::Open { .. }));
    assert!(err.to_string().contains("bunyan.log"));
}

#[test]
fn test_meta_sidecar_for_known_input() {
    let dir = TempDir::new().unwrap();
    let mut req = request(&dir, SinkKind::Raw);
    req.meta = true;
    fs::write(&req.input, b"abc").unwrap();

    run(&req).unwrap();

    let meta = fs::read_to_string(meta_path(&req.output)).unwrap();
    let expected = format!(
        "ifile={}\nlen=3\nmd5=900150983cd24fb0d6963f7d28e17f72\n\
         sha256=ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\n",
        req.input.display()
    );
    assert_eq!(meta, expected);
}

#[test]
fn test_gzip_rotation_with_digests() {
    let dir = TempDir::new().unwrap();
    let mut req = request(&dir, SinkKind::Gzip(Compression::default()));
    req.meta = true;
    let payload = pattern(200_000);
    fs::write(&req.input, &payload).unwrap();

    let outcome = run(&req).unwrap();
    assert_eq!(outcome, Outcome::Rotated { bytes: 200_000 });

    // Output is a valid gzip stream reproducing the input; the decoder
    // checks the CRC trailer as it goes.
    let compressed = fs::read(&req.output).unwrap();
    let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, payload);

    let meta = fs::read_to_string(meta_path(&req.output)).unwrap();
    assert!(meta.contains("len=200000\n"));

    assert_eq!(fs::metadata(&req.input).unwrap().len(), 0);
}

#[test]
fn test_digests_cover_uncompressed_bytes() {
    let dir = TempDir::new().unwrap();
    let mut req = request(&dir, SinkKind::Gzip(Compression::default()));
    req.meta = true;
    fs::write(&req.input, b"abc").unwrap();

    run(&req).unwrap();

    // Same digests as the raw rotation: they describe the log data, not
    // the gzip container.
    let meta = fs::read_to_string(meta_path(&req.output)).unwrap();
    assert!(meta.contains("md5=900150983cd24fb0d6963f7d28e17f72\n"));
}

/// A cooperating writer appends under the advisory lock while the rotation
/// runs. Everything it wrote must end up either in the rotated output or
/// still in the (possibly truncated) input, with the stream order intact.
#[test]
fn test_concurrent_appends_are_never_lost() {
    let dir = TempDir::new().unwrap();
    let req = request(&dir, SinkKind::Raw);

    let initial = pattern(256 * 1024);
    fs::write(&req.input, &initial).unwrap();

    let appended: Vec<Vec<u8>> = (0..50)
        .map(|i| format!("{{\"appended\":{}}}\n", i).into_bytes())
        .collect();

    let writer = {
        let input = req.input.clone();
        let lines = appended.clone();
        thread::spawn(move || {
            let mut file = OpenOptions::new().append(true).open(&input).unwrap();
            for line in &lines {
                flock(&file, libc::LOCK_EX).unwrap();
                file.write_all(line).unwrap();
                flock(&file, libc::LOCK_UN).unwrap();
                thread::sleep(Duration::from_micros(50));
            }
        })
    };

    run(&req).unwrap();
    writer.join().unwrap();

    // The rotation drained some prefix of the stream and truncated; later
    // appends landed in the fresh input. The concatenation must be exactly
    // the full write sequence.
    let mut observed = fs::read(&req.output).unwrap();
    observed.extend(fs::read(&req.input).unwrap());

    let mut expected = initial;
    for line in &appended {
        expected.extend_from_slice(line);
    }
    assert_eq!(observed, expected);
}

#[test]
fn test_meta_path_appends_suffix() {
    assert_eq!(
        meta_path(Path::new("/var/log/out.log.gz")),
        Path::new("/var/log/out.log.gz.meta")
    );
}
