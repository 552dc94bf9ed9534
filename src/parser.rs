//! Parser capability and registry (spec §4.2, §6 "Parser capability").
//!
//! Format-specific text extraction (PDF/DOCX/XLSX/...) is explicitly out of
//! scope for this crate; this module only defines the seam those extractors
//! plug into, plus the always-available UTF-8 fallback.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{RagError, RagResult};
use crate::models::Metadata;

/// Output of a successful extraction.
#[derive(Debug, Clone)]
pub struct ParserOutput {
    pub text: String,
    pub metadata: Metadata,
    pub page_count: Option<u32>,
    pub extraction_method: String,
}

/// Converts a file's bytes into normalized text. Must not mutate the input
/// and must be deterministic for identical bytes; must be safe to call
/// concurrently from multiple workers.
#[async_trait]
pub trait Parser: Send + Sync {
    /// Lowercased extensions this parser handles, e.g. `["pdf"]`.
    fn supported_extensions(&self) -> &[&str];

    async fn parse(&self, path: &Path, bytes: &[u8]) -> RagResult<ParserOutput>;
}

/// Fallback parser: treats bytes as UTF-8 text verbatim. Registered
/// separately from the extension table — it's consulted only when no
/// registered parser claims the extension.
pub struct PlainTextParser;

#[async_trait]
impl Parser for PlainTextParser {
    fn supported_extensions(&self) -> &[&str] {
        &[]
    }

    async fn parse(&self, path: &Path, bytes: &[u8]) -> RagResult<ParserOutput> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| RagError::UnsupportedFormat { path: path.to_path_buf() })?;
        Ok(ParserOutput {
            text,
            metadata: HashMap::new(),
            page_count: None,
            extraction_method: "plain_text".to_string(),
        })
    }
}

/// Maps lowercased extension to a registered [`Parser`]. Resolution is
/// case-insensitive; an unresolved extension falls back to UTF-8 decoding.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
    fallback: Arc<PlainTextParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        ParserRegistry { parsers: HashMap::new(), fallback: Arc::new(PlainTextParser) }
    }

    /// Registers `parser` for every extension it declares.
    pub fn register(&mut self, parser: Arc<dyn Parser>) {
        for ext in parser.supported_extensions() {
            self.parsers.insert(ext.to_lowercase(), Arc::clone(&parser));
        }
    }

    /// Resolve a parser for a lowercased, dot-less extension (e.g. `"pdf"`).
    pub fn resolve(&self, extension: &str) -> Option<Arc<dyn Parser>> {
        self.parsers.get(&extension.to_lowercase()).cloned()
    }

    /// Parse `bytes` read from `path`, dispatching by extension and falling
    /// back to UTF-8 decoding when no parser is registered.
    pub async fn parse_file(&self, path: &Path, bytes: &[u8]) -> RagResult<ParserOutput> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

        if let Some(parser) = self.resolve(&ext) {
            return parser.parse(path, bytes).await;
        }
        self.fallback.parse(path, bytes).await
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn falls_back_to_utf8_when_unregistered() {
        let registry = ParserRegistry::new();
        let out = registry.parse_file(&PathBuf::from("a.txt"), b"hello\n").await.unwrap();
        assert_eq!(out.text, "hello\n");
        assert_eq!(out.extraction_method, "plain_text");
    }

    #[tokio::test]
    async fn non_utf8_without_parser_is_unsupported() {
        let registry = ParserRegistry::new();
        let bytes = vec![0xff, 0xfe, 0x00, 0x01];
        let err = registry.parse_file(&PathBuf::from("a.bin"), &bytes).await.unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat { .. }));
    }

    struct UppercaseParser;

    #[async_trait]
    impl Parser for UppercaseParser {
        fn supported_extensions(&self) -> &[&str] {
            &["upper"]
        }

        async fn parse(&self, _path: &Path, bytes: &[u8]) -> RagResult<ParserOutput> {
            let text = String::from_utf8_lossy(bytes).to_uppercase();
            Ok(ParserOutput { text, metadata: HashMap::new(), page_count: None, extraction_method: "uppercase".into() })
        }
    }

    #[tokio::test]
    async fn resolves_registered_extension_case_insensitively() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(UppercaseParser));

        let out = registry.parse_file(&PathBuf::from("a.UPPER"), b"hi").await.unwrap();
        assert_eq!(out.text, "HI");
        assert_eq!(out.extraction_method, "uppercase");
    }
}
