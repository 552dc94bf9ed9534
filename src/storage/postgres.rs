//! Remote storage backend (spec §6 `storage.backend = remote`).
//!
//! Unlike [`super::sqlite::SqliteStorage`], Postgres's native `UUID`,
//! `TIMESTAMPTZ`, `BOOLEAN`, and `JSONB` column types let sqlx bind and
//! decode our domain types directly — no manual string round-tripping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::error::{RagError, RagResult, StorageErrorKind};
use crate::models::{ChangeType, Chunk, Document, Metadata, Version};

use super::compress::{compress, decompress};
use super::{
    DocumentFilter, DocumentSortKey, HealthStatus, ListOrder, NewDocument, PreparedChunk, SortOrder, Storage,
    VersionCommitResult, VersionWrite,
};

#[derive(FromRow)]
struct DocumentRow {
    id: Uuid,
    file_path: String,
    file_name: String,
    file_type: String,
    file_size: i64,
    content_hash: String,
    current_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    is_deleted: bool,
    metadata: serde_json::Value,
}

impl TryFrom<DocumentRow> for Document {
    type Error = RagError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let metadata: Metadata = serde_json::from_value(row.metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt metadata jsonb", e))?;
        Ok(Document {
            id: row.id,
            file_path: row.file_path,
            file_name: row.file_name,
            file_type: row.file_type,
            file_size: row.file_size,
            content_hash: row.content_hash,
            current_version: row.current_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_deleted: row.is_deleted,
            metadata,
        })
    }
}

#[derive(FromRow)]
struct VersionRow {
    id: Uuid,
    document_id: Uuid,
    version_number: i64,
    content_hash: String,
    file_hash: String,
    file_size: i64,
    change_type: String,
    created_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

impl TryFrom<VersionRow> for Version {
    type Error = RagError;

    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        let metadata: Metadata = serde_json::from_value(row.metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt metadata jsonb", e))?;
        let change_type = ChangeType::from_str(&row.change_type)
            .ok_or_else(|| RagError::storage(StorageErrorKind::Other, "corrupt change_type"))?;
        Ok(Version {
            id: row.id,
            document_id: row.document_id,
            version_number: row.version_number,
            content_hash: row.content_hash,
            file_hash: row.file_hash,
            file_size: row.file_size,
            change_type,
            created_at: row.created_at,
            metadata,
        })
    }
}

#[derive(FromRow)]
struct ChunkRow {
    id: Uuid,
    document_id: Uuid,
    version_id: Uuid,
    chunk_index: i32,
    content_hash: String,
    token_count: i32,
    created_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

impl TryFrom<ChunkRow> for Chunk {
    type Error = RagError;

    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        let metadata: Metadata = serde_json::from_value(row.metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt metadata jsonb", e))?;
        Ok(Chunk {
            id: row.id,
            document_id: row.document_id,
            version_id: row.version_id,
            chunk_index: row.chunk_index,
            content_hash: row.content_hash,
            token_count: row.token_count,
            created_at: row.created_at,
            metadata,
        })
    }
}

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str) -> RagResult<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;

        sqlx::migrate!("./migrations/postgres").run(&pool).await.map_err(|e| {
            RagError::storage_with_cause(StorageErrorKind::Other, "postgres migration failed", e)
        })?;

        Ok(PostgresStorage { pool })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn create_document(&self, doc: NewDocument) -> RagResult<Document> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let metadata_json = serde_json::to_value(&doc.metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents
                (id, file_path, file_name, file_type, file_size, content_hash, current_version, created_at, updated_at, is_deleted, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7, FALSE, $8)
            RETURNING id, file_path, file_name, file_type, file_size, content_hash, current_version, created_at, updated_at, is_deleted, metadata
            "#,
        )
        .bind(id)
        .bind(&doc.file_path)
        .bind(&doc.file_name)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(&doc.content_hash)
        .bind(now)
        .bind(&metadata_json)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_document_by_id(&self, id: Uuid) -> RagResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_document_by_path(&self, path: &str) -> RagResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE file_path = $1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn touch_document_metadata(&self, id: Uuid, metadata: Metadata, updated_at: DateTime<Utc>) -> RagResult<()> {
        let metadata_json = serde_json::to_value(&metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;
        sqlx::query("UPDATE documents SET metadata = $1, updated_at = $2 WHERE id = $3")
            .bind(&metadata_json)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_delete_document(&self, id: Uuid) -> RagResult<()> {
        sqlx::query("UPDATE documents SET is_deleted = TRUE, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn hard_delete_document(&self, id: Uuid) -> RagResult<()> {
        sqlx::query("DELETE FROM documents WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn list_documents(
        &self,
        filter: DocumentFilter,
        order: ListOrder,
        limit: i64,
        offset: i64,
    ) -> RagResult<Vec<Document>> {
        let order_col = match order.key {
            DocumentSortKey::UpdatedAt => "updated_at",
            DocumentSortKey::CreatedAt => "created_at",
            DocumentSortKey::FilePath => "file_path",
        };
        let direction = match order.direction {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let mut sql = String::from("SELECT * FROM documents WHERE ($1::text IS NULL OR file_type = $1)");
        if !filter.include_deleted {
            sql.push_str(" AND is_deleted = FALSE");
        }
        sql.push_str(&format!(" ORDER BY {order_col} {direction} LIMIT $2 OFFSET $3"));

        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(&filter.file_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn search_documents(&self, filter: DocumentFilter) -> RagResult<Vec<Document>> {
        let docs = self.list_documents(filter.clone(), ListOrder::default(), i64::MAX, 0).await?;
        Ok(match &filter.metadata_eq {
            None => docs,
            Some((key, value)) => docs.into_iter().filter(|d| d.metadata.get(key) == Some(value)).collect(),
        })
    }

    async fn get_version(&self, document_id: Uuid, version_number: i64) -> RagResult<Option<Version>> {
        let row = sqlx::query_as::<_, VersionRow>("SELECT * FROM versions WHERE document_id = $1 AND version_number = $2")
            .bind(document_id)
            .bind(version_number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_latest_version(&self, document_id: Uuid) -> RagResult<Option<Version>> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM versions WHERE document_id = $1 ORDER BY version_number DESC LIMIT 1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_versions(&self, document_id: Uuid, limit: i64, offset: i64) -> RagResult<Vec<Version>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM versions WHERE document_id = $1 ORDER BY version_number DESC LIMIT $2 OFFSET $3",
        )
        .bind(document_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_versions(&self, document_id: Uuid) -> RagResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM versions WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn get_content_snapshot(&self, document_id: Uuid, version_number: i64) -> RagResult<Option<String>> {
        let row = sqlx::query("SELECT compressed_content FROM content_snapshots WHERE document_id = $1 AND version_number = $2")
            .bind(document_id)
            .bind(version_number)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let compressed: Vec<u8> = row.try_get("compressed_content")?;
                let bytes = decompress(&compressed)?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt snapshot utf8", e))?;
                Ok(Some(text))
            }
        }
    }

    async fn delete_content_snapshot(&self, document_id: Uuid, version_number: i64) -> RagResult<()> {
        sqlx::query("DELETE FROM content_snapshots WHERE document_id = $1 AND version_number = $2")
            .bind(document_id)
            .bind(version_number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_chunks_by_version(&self, version_id: Uuid) -> RagResult<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>("SELECT * FROM chunks WHERE version_id = $1 ORDER BY chunk_index ASC")
            .bind(version_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_chunks_by_version(&self, version_id: Uuid) -> RagResult<()> {
        sqlx::query("DELETE FROM chunks WHERE version_id = $1").bind(version_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_chunk_content(&self, chunk_id: Uuid) -> RagResult<Option<String>> {
        let row = sqlx::query("SELECT compressed_content FROM chunk_content WHERE chunk_id = $1")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let compressed: Vec<u8> = row.try_get("compressed_content")?;
                let bytes = decompress(&compressed)?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt chunk utf8", e))?;
                Ok(Some(text))
            }
        }
    }

    async fn commit_version(&self, write: VersionWrite) -> RagResult<VersionCommitResult> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let (document_id, version_number) = match write.existing_document_id {
            Some(id) => {
                let row: (i64,) = sqlx::query_as("SELECT current_version FROM documents WHERE id = $1")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
                (id, row.0 + 1)
            }
            None => (Uuid::new_v4(), 1),
        };

        let metadata_json = serde_json::to_value(&write.metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;

        if write.existing_document_id.is_none() {
            sqlx::query(
                r#"
                INSERT INTO documents
                    (id, file_path, file_name, file_type, file_size, content_hash, current_version, created_at, updated_at, is_deleted, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, FALSE, $9)
                "#,
            )
            .bind(document_id)
            .bind(&write.file_path)
            .bind(&write.file_name)
            .bind(&write.file_type)
            .bind(write.file_size)
            .bind(&write.content_hash)
            .bind(version_number)
            .bind(now)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        } else {
            let sql = if write.clear_deleted {
                "UPDATE documents SET content_hash = $1, file_size = $2, current_version = $3, updated_at = $4, metadata = $5, is_deleted = FALSE WHERE id = $6"
            } else {
                "UPDATE documents SET content_hash = $1, file_size = $2, current_version = $3, updated_at = $4, metadata = $5 WHERE id = $6"
            };
            sqlx::query(sql)
                .bind(&write.content_hash)
                .bind(write.file_size)
                .bind(version_number)
                .bind(now)
                .bind(&metadata_json)
                .bind(document_id)
                .execute(&mut *tx)
                .await?;
        }

        let version_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO versions (id, document_id, version_number, content_hash, file_hash, file_size, change_type, created_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(version_id)
        .bind(document_id)
        .bind(version_number)
        .bind(&write.content_hash)
        .bind(&write.file_hash)
        .bind(write.file_size)
        .bind(write.change_type.as_str())
        .bind(now)
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await?;

        for chunk in &write.chunks {
            let chunk_id = Uuid::new_v4();
            let chunk_metadata_json = serde_json::to_value(&chunk.metadata)
                .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, version_id, chunk_index, content_hash, token_count, created_at, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(chunk_id)
            .bind(document_id)
            .bind(version_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content_hash)
            .bind(chunk.token_count)
            .bind(now)
            .bind(&chunk_metadata_json)
            .execute(&mut *tx)
            .await?;

            if let Some(content) = &chunk.content {
                let compressed = compress(content.as_bytes())?;
                sqlx::query("INSERT INTO chunk_content (chunk_id, compressed_content) VALUES ($1, $2)")
                    .bind(chunk_id)
                    .bind(compressed)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if let Some(snapshot) = &write.content_snapshot {
            let compressed = compress(snapshot.as_bytes())?;
            sqlx::query("INSERT INTO content_snapshots (document_id, version_number, compressed_content) VALUES ($1, $2, $3)")
                .bind(document_id)
                .bind(version_number)
                .bind(compressed)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let document = self
            .get_document_by_id(document_id)
            .await?
            .ok_or_else(|| RagError::storage(StorageErrorKind::Other, "document vanished after commit"))?;
        let version = self
            .get_version(document_id, version_number)
            .await?
            .ok_or_else(|| RagError::storage(StorageErrorKind::Other, "version vanished after commit"))?;

        Ok(VersionCommitResult { document, version })
    }

    async fn ping(&self) -> RagResult<HealthStatus> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(HealthStatus { healthy: true })
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
