//! Stable content hashing (spec §4.1).
//!
//! The algorithm is fixed for the lifetime of a [`crate::models::Document`]
//! so hash equality stays meaningful across versions. Text is normalized
//! (line endings unified to LF) before hashing; no other canonicalization
//! is performed.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::config::HashAlgorithm;
use crate::error::RagResult;

const STREAM_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Hasher {
    algorithm: HashAlgorithm,
}

/// Incremental digest across the three supported algorithms.
enum Incremental {
    Sha256(Sha256),
    Sha1(Sha1),
    Md5(Md5),
}

impl Incremental {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Incremental::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => Incremental::Sha1(Sha1::new()),
            HashAlgorithm::Md5 => Incremental::Md5(Md5::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Incremental::Sha256(h) => h.update(chunk),
            Incremental::Sha1(h) => h.update(chunk),
            Incremental::Md5(h) => h.update(chunk),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Incremental::Sha256(h) => hex::encode(h.finalize()),
            Incremental::Sha1(h) => hex::encode(h.finalize()),
            Incremental::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Hasher { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash raw bytes, returning lowercase hex.
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut digest = Incremental::new(self.algorithm);
        digest.update(data);
        digest.finalize_hex()
    }

    /// Unify line endings to LF. This is the only normalization performed
    /// before content hashing.
    pub fn normalize_text(text: &str) -> String {
        if !text.contains('\r') {
            return text.to_string();
        }
        text.replace("\r\n", "\n").replace('\r', "\n")
    }

    /// Content hash: normalize, then hash the UTF-8 bytes.
    pub fn hash_text(&self, text: &str) -> String {
        self.hash_bytes(Self::normalize_text(text).as_bytes())
    }

    /// File hash: stream the raw bytes of the file, returning (hash, size).
    pub async fn hash_file(&self, path: &Path) -> RagResult<(String, u64)> {
        use tokio::io::AsyncReadExt;

        let mut file = tokio::fs::File::open(path).await?;
        let mut digest = Incremental::new(self.algorithm);
        let mut buf = vec![0u8; STREAM_BUF_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
            total += n as u64;
        }

        Ok((digest.finalize_hex(), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        let h = Hasher::new(HashAlgorithm::Sha256);
        assert_eq!(h.hash_bytes(b"hello"), h.hash_bytes(b"hello"));
        assert_ne!(h.hash_bytes(b"hello"), h.hash_bytes(b"world"));
    }

    #[test]
    fn normalizes_crlf_and_cr() {
        assert_eq!(Hasher::normalize_text("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn content_hash_ignores_line_ending_style() {
        let h = Hasher::new(HashAlgorithm::Sha256);
        assert_eq!(h.hash_text("a\r\nb"), h.hash_text("a\nb"));
    }

    #[test]
    fn algorithms_produce_distinct_hashes() {
        let data = b"hello world";
        let sha256 = Hasher::new(HashAlgorithm::Sha256).hash_bytes(data);
        let sha1 = Hasher::new(HashAlgorithm::Sha1).hash_bytes(data);
        let md5 = Hasher::new(HashAlgorithm::Md5).hash_bytes(data);
        assert_eq!(sha256.len(), 64);
        assert_eq!(sha1.len(), 40);
        assert_eq!(md5.len(), 32);
    }

    #[tokio::test]
    async fn hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, b"hello\n").await.unwrap();

        let h = Hasher::new(HashAlgorithm::Sha256);
        let (file_hash, size) = h.hash_file(&path).await.unwrap();
        assert_eq!(file_hash, h.hash_bytes(b"hello\n"));
        assert_eq!(size, 6);
    }
}
