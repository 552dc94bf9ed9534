//! Storage capability (spec §4.4): a transactional, indexed persistence
//! contract that at least one embedded and one remote backend implement.
//!
//! The core never addresses backend-specific constructs — callers depend
//! only on [`Storage`]. See [`sqlite::SqliteStorage`] for the embedded
//! backend and [`postgres::PostgresStorage`] for the remote one.

pub mod compress;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RagResult;
use crate::models::{ChangeType, Chunk, Document, Metadata, Version};

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Column to sort documents by (spec §4.4 indexing requirements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSortKey {
    UpdatedAt,
    CreatedAt,
    FilePath,
}

#[derive(Debug, Clone, Copy)]
pub struct ListOrder {
    pub key: DocumentSortKey,
    pub direction: SortOrder,
}

impl Default for ListOrder {
    fn default() -> Self {
        ListOrder { key: DocumentSortKey::UpdatedAt, direction: SortOrder::Desc }
    }
}

/// Filter predicate for `list_documents`.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub file_type: Option<String>,
    pub include_deleted: bool,
    /// Equality match over a single top-level metadata key.
    pub metadata_eq: Option<(String, serde_json::Value)>,
}

/// Inputs needed to create a brand-new document row (spec §3 CREATED path).
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub content_hash: String,
    pub metadata: Metadata,
}

/// One chunk ready to be persisted, with its (optional) decompressed text
/// already resolved — the storage layer compresses on write.
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub chunk_index: i32,
    pub content_hash: String,
    pub token_count: i32,
    pub content: Option<String>,
    pub metadata: Metadata,
}

/// Everything the atomicity contract (spec §4.4) bundles into one
/// transaction: insert the version, upsert the document, insert chunks and
/// chunk content, and optionally snapshot the full text.
#[derive(Debug, Clone)]
pub struct VersionWrite {
    /// `None` when this is the document's first version.
    pub existing_document_id: Option<Uuid>,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub metadata: Metadata,
    pub content_hash: String,
    pub file_hash: String,
    pub file_size: i64,
    pub change_type: ChangeType,
    pub chunks: Vec<PreparedChunk>,
    pub content_snapshot: Option<String>,
    /// Clears `is_deleted` on the document (set for RESTORED).
    pub clear_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct VersionCommitResult {
    pub document: Document,
    pub version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
}

/// A textual content diff source: the raw text of two versions, when both
/// were snapshotted.
#[derive(Debug, Clone)]
pub struct SnapshotPair {
    pub from_text: Option<String>,
    pub to_text: Option<String>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    // ---- documents ----
    async fn create_document(&self, doc: NewDocument) -> RagResult<Document>;
    async fn get_document_by_id(&self, id: Uuid) -> RagResult<Option<Document>>;
    async fn get_document_by_path(&self, path: &str) -> RagResult<Option<Document>>;
    async fn touch_document_metadata(&self, id: Uuid, metadata: Metadata, updated_at: DateTime<Utc>) -> RagResult<()>;
    async fn soft_delete_document(&self, id: Uuid) -> RagResult<()>;
    async fn hard_delete_document(&self, id: Uuid) -> RagResult<()>;
    async fn list_documents(
        &self,
        filter: DocumentFilter,
        order: ListOrder,
        limit: i64,
        offset: i64,
    ) -> RagResult<Vec<Document>>;
    async fn search_documents(&self, filter: DocumentFilter) -> RagResult<Vec<Document>>;

    // ---- versions ----
    async fn get_version(&self, document_id: Uuid, version_number: i64) -> RagResult<Option<Version>>;
    async fn get_latest_version(&self, document_id: Uuid) -> RagResult<Option<Version>>;
    async fn list_versions(&self, document_id: Uuid, limit: i64, offset: i64) -> RagResult<Vec<Version>>;
    async fn count_versions(&self, document_id: Uuid) -> RagResult<i64>;

    // ---- content snapshots (optional feature, gated by caller config) ----
    async fn get_content_snapshot(&self, document_id: Uuid, version_number: i64) -> RagResult<Option<String>>;
    async fn delete_content_snapshot(&self, document_id: Uuid, version_number: i64) -> RagResult<()>;

    // ---- chunks ----
    async fn get_chunks_by_version(&self, version_id: Uuid) -> RagResult<Vec<Chunk>>;
    async fn delete_chunks_by_version(&self, version_id: Uuid) -> RagResult<()>;
    async fn get_chunk_content(&self, chunk_id: Uuid) -> RagResult<Option<String>>;

    /// Atomically accept a new version: spec §4.4's four-part write
    /// (version row, document upsert, chunks + chunk content, optional
    /// snapshot) as a single transaction. Any failure rolls back all of it.
    async fn commit_version(&self, write: VersionWrite) -> RagResult<VersionCommitResult>;

    // ---- health ----
    async fn ping(&self) -> RagResult<HealthStatus>;
    fn backend_name(&self) -> &'static str;
}
