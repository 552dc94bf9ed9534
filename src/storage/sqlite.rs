//! Embedded storage backend, the default per spec §6 (`storage.backend = embedded`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{RagError, RagResult, StorageErrorKind};
use crate::models::{ChangeType, Chunk, Document, Metadata, Version};

use super::compress::{compress, decompress};
use super::{
    DocumentFilter, DocumentSortKey, HealthStatus, ListOrder, NewDocument, PreparedChunk, SortOrder, Storage,
    VersionCommitResult, VersionWrite,
};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(path: &Path) -> RagResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Connectivity, "invalid sqlite path", e))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations/sqlite").run(&pool).await.map_err(|e| {
            RagError::storage_with_cause(StorageErrorKind::Other, "sqlite migration failed", e)
        })?;

        Ok(SqliteStorage { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> RagResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations/sqlite").run(&pool).await.map_err(|e| {
            RagError::storage_with_cause(StorageErrorKind::Other, "sqlite migration failed", e)
        })?;
        Ok(SqliteStorage { pool })
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> RagResult<Document> {
    let id: String = row.try_get("id")?;
    let metadata_raw: String = row.try_get("metadata")?;
    let metadata: Metadata = serde_json::from_str(&metadata_raw)
        .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt metadata json", e))?;

    Ok(Document {
        id: Uuid::parse_str(&id).map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt id", e))?,
        file_path: row.try_get("file_path")?,
        file_name: row.try_get("file_name")?,
        file_type: row.try_get("file_type")?,
        file_size: row.try_get("file_size")?,
        content_hash: row.try_get("content_hash")?,
        current_version: row.try_get("current_version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        is_deleted: row.try_get::<i64, _>("is_deleted")? != 0,
        metadata,
    })
}

fn row_to_version(row: &sqlx::sqlite::SqliteRow) -> RagResult<Version> {
    let id: String = row.try_get("id")?;
    let document_id: String = row.try_get("document_id")?;
    let change_type_raw: String = row.try_get("change_type")?;
    let metadata_raw: String = row.try_get("metadata")?;
    let metadata: Metadata = serde_json::from_str(&metadata_raw)
        .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt metadata json", e))?;

    Ok(Version {
        id: Uuid::parse_str(&id).map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt id", e))?,
        document_id: Uuid::parse_str(&document_id)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt document_id", e))?,
        version_number: row.try_get("version_number")?,
        content_hash: row.try_get("content_hash")?,
        file_hash: row.try_get("file_hash")?,
        file_size: row.try_get("file_size")?,
        change_type: ChangeType::from_str(&change_type_raw)
            .ok_or_else(|| RagError::storage(StorageErrorKind::Other, "corrupt change_type"))?,
        created_at: row.try_get("created_at")?,
        metadata,
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> RagResult<Chunk> {
    let id: String = row.try_get("id")?;
    let document_id: String = row.try_get("document_id")?;
    let version_id: String = row.try_get("version_id")?;
    let metadata_raw: String = row.try_get("metadata")?;
    let metadata: Metadata = serde_json::from_str(&metadata_raw)
        .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt metadata json", e))?;

    Ok(Chunk {
        id: Uuid::parse_str(&id).map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt id", e))?,
        document_id: Uuid::parse_str(&document_id)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt document_id", e))?,
        version_id: Uuid::parse_str(&version_id)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "corrupt version_id", e))?,
        chunk_index: row.try_get("chunk_index")?,
        content_hash: row.try_get("content_hash")?,
        token_count: row.try_get("token_count")?,
        created_at: row.try_get("created_at")?,
        metadata,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_document(&self, doc: NewDocument) -> RagResult<Document> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&doc.metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, file_path, file_name, file_type, file_size, content_hash, current_version, created_at, updated_at, is_deleted, metadata)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, 0, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&doc.file_path)
        .bind(&doc.file_name)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(&doc.content_hash)
        .bind(now)
        .bind(now)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        self.get_document_by_id(id).await?.ok_or_else(|| RagError::storage(StorageErrorKind::Other, "document vanished after insert"))
    }

    async fn get_document_by_id(&self, id: Uuid) -> RagResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_document_by_path(&self, path: &str) -> RagResult<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE file_path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn touch_document_metadata(&self, id: Uuid, metadata: Metadata, updated_at: DateTime<Utc>) -> RagResult<()> {
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;
        sqlx::query("UPDATE documents SET metadata = ?, updated_at = ? WHERE id = ?")
            .bind(&metadata_json)
            .bind(updated_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_delete_document(&self, id: Uuid) -> RagResult<()> {
        sqlx::query("UPDATE documents SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn hard_delete_document(&self, id: Uuid) -> RagResult<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
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

        let mut sql = String::from("SELECT * FROM documents WHERE 1 = 1");
        if !filter.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if filter.file_type.is_some() {
            sql.push_str(" AND file_type = ?");
        }
        sql.push_str(&format!(" ORDER BY {order_col} {direction} LIMIT ? OFFSET ?"));

        let mut query = sqlx::query(&sql);
        if let Some(ft) = &filter.file_type {
            query = query.bind(ft);
        }
        query = query.bind(limit).bind(offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn search_documents(&self, filter: DocumentFilter) -> RagResult<Vec<Document>> {
        // Reuses the same predicate machinery as list_documents with an
        // effectively unbounded page; metadata_eq filtering happens in
        // memory since SQLite JSON querying is dialect-specific.
        let docs = self.list_documents(filter.clone(), ListOrder::default(), i64::MAX, 0).await?;
        Ok(match &filter.metadata_eq {
            None => docs,
            Some((key, value)) => docs.into_iter().filter(|d| d.metadata.get(key) == Some(value)).collect(),
        })
    }

    async fn get_version(&self, document_id: Uuid, version_number: i64) -> RagResult<Option<Version>> {
        let row = sqlx::query("SELECT * FROM versions WHERE document_id = ? AND version_number = ?")
            .bind(document_id.to_string())
            .bind(version_number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_version).transpose()
    }

    async fn get_latest_version(&self, document_id: Uuid) -> RagResult<Option<Version>> {
        let row = sqlx::query("SELECT * FROM versions WHERE document_id = ? ORDER BY version_number DESC LIMIT 1")
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_version).transpose()
    }

    async fn list_versions(&self, document_id: Uuid, limit: i64, offset: i64) -> RagResult<Vec<Version>> {
        let rows = sqlx::query("SELECT * FROM versions WHERE document_id = ? ORDER BY version_number DESC LIMIT ? OFFSET ?")
            .bind(document_id.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_version).collect()
    }

    async fn count_versions(&self, document_id: Uuid) -> RagResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM versions WHERE document_id = ?")
            .bind(document_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn get_content_snapshot(&self, document_id: Uuid, version_number: i64) -> RagResult<Option<String>> {
        let row = sqlx::query("SELECT compressed_content FROM content_snapshots WHERE document_id = ? AND version_number = ?")
            .bind(document_id.to_string())
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
        sqlx::query("DELETE FROM content_snapshots WHERE document_id = ? AND version_number = ?")
            .bind(document_id.to_string())
            .bind(version_number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_chunks_by_version(&self, version_id: Uuid) -> RagResult<Vec<Chunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE version_id = ? ORDER BY chunk_index ASC")
            .bind(version_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn delete_chunks_by_version(&self, version_id: Uuid) -> RagResult<()> {
        sqlx::query("DELETE FROM chunks WHERE version_id = ?")
            .bind(version_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_chunk_content(&self, chunk_id: Uuid) -> RagResult<Option<String>> {
        let row = sqlx::query("SELECT compressed_content FROM chunk_content WHERE chunk_id = ?")
            .bind(chunk_id.to_string())
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
                let row = sqlx::query("SELECT current_version FROM documents WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_one(&mut *tx)
                    .await?;
                let current: i64 = row.try_get("current_version")?;
                (id, current + 1)
            }
            None => (Uuid::new_v4(), 1),
        };

        let metadata_json = serde_json::to_string(&write.metadata)
            .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;

        if write.existing_document_id.is_none() {
            sqlx::query(
                r#"
                INSERT INTO documents
                    (id, file_path, file_name, file_type, file_size, content_hash, current_version, created_at, updated_at, is_deleted, metadata)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(document_id.to_string())
            .bind(&write.file_path)
            .bind(&write.file_name)
            .bind(&write.file_type)
            .bind(write.file_size)
            .bind(&write.content_hash)
            .bind(version_number)
            .bind(now)
            .bind(now)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        } else {
            let deleted_clause = if write.clear_deleted { ", is_deleted = 0" } else { "" };
            let sql = format!(
                "UPDATE documents SET content_hash = ?, file_size = ?, current_version = ?, updated_at = ?, metadata = ?{deleted_clause} WHERE id = ?"
            );
            sqlx::query(&sql)
                .bind(&write.content_hash)
                .bind(write.file_size)
                .bind(version_number)
                .bind(now)
                .bind(&metadata_json)
                .bind(document_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        let version_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO versions (id, document_id, version_number, content_hash, file_hash, file_size, change_type, created_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(version_id.to_string())
        .bind(document_id.to_string())
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
            let chunk_metadata_json = serde_json::to_string(&chunk.metadata)
                .map_err(|e| RagError::storage_with_cause(StorageErrorKind::Other, "metadata serialization failed", e))?;

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, version_id, chunk_index, content_hash, token_count, created_at, metadata)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk_id.to_string())
            .bind(document_id.to_string())
            .bind(version_id.to_string())
            .bind(chunk.chunk_index)
            .bind(&chunk.content_hash)
            .bind(chunk.token_count)
            .bind(now)
            .bind(&chunk_metadata_json)
            .execute(&mut *tx)
            .await?;

            if let Some(content) = &chunk.content {
                let compressed = compress(content.as_bytes())?;
                sqlx::query("INSERT INTO chunk_content (chunk_id, compressed_content) VALUES (?, ?)")
                    .bind(chunk_id.to_string())
                    .bind(compressed)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if let Some(snapshot) = &write.content_snapshot {
            let compressed = compress(snapshot.as_bytes())?;
            sqlx::query("INSERT INTO content_snapshots (document_id, version_number, compressed_content) VALUES (?, ?, ?)")
                .bind(document_id.to_string())
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
        "sqlite"
    }
}
