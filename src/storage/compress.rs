//! Transparent deflate-family compression for content and chunk snapshots
//! (spec §4.4). Decompression is applied on every read path; callers never
//! see compressed bytes.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{RagError, RagResult};

pub fn compress(data: &[u8]) -> RagResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn decompress(data: &[u8]) -> RagResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| RagError::storage_with_cause(crate::error::StorageErrorKind::Other, "snapshot decompression failed", e))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let text = "the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = compress(text.as_bytes()).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, text.as_bytes());
        assert!(compressed.len() < text.len());
    }
}
