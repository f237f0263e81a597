//! Gzip helpers for write payloads

use std::io::Write;

use flate2::{Compression, write::GzEncoder};

/// Gzip `payload` into `writer`
pub fn compress_into<W: Write>(writer: W, payload: &[u8]) -> std::io::Result<W> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

/// Gzip `payload` into a fresh buffer
pub fn compress(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    compress_into(Vec::with_capacity(payload.len() / 4), payload)
}
