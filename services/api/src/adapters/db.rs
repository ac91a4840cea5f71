//! services/api/src/adapters/db.rs
//!
//! This module contains the PostgreSQL adapters: `PgStore` implements the
//! `DocumentStore` port and `PgUsageCounter` the `UsageCounter` port. Both use `sqlx`.
//!
//! Queries are built at runtime (`query_as::<_, Record>`) so the crate compiles without
//! a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use study_assistant_core::domain::{Artifacts, Document, ImageEncoding, PageImage, TestRecord};
use study_assistant_core::ports::{DocumentStore, PortError, PortResult, UsageCounter};
use uuid::Uuid;

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// The Document Store
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    owner: String,
    name: String,
    content: String,
    artifacts: Json<Artifacts>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn to_domain(self, images: Vec<PageImage>) -> Document {
        Document {
            id: self.id,
            owner: self.owner,
            name: self.name,
            content: self.content,
            images,
            artifacts: self.artifacts.0,
            version: self.version.max(0) as u64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct PageImageRecord {
    payload: Vec<u8>,
    encoding: String,
    width: i32,
    height: i32,
    page: i32,
}

impl PageImageRecord {
    fn to_domain(self) -> PageImage {
        PageImage {
            payload: self.payload,
            encoding: ImageEncoding::from_extension(&self.encoding),
            width: self.width.max(0) as u32,
            height: self.height.max(0) as u32,
            page: self.page.max(0) as u32,
        }
    }
}

#[derive(FromRow)]
struct SavedRecord {
    id: Uuid,
    version: i64,
}

#[derive(FromRow)]
struct TestRecordRow {
    record: Json<TestRecord>,
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgStore {
    async fn save_document(&self, document: &Document) -> PortResult<u64> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        if document.version > 0 {
            // Only the version this request loaded may be replaced.
            let saved = sqlx::query_as::<_, SavedRecord>(
                "UPDATE documents SET \
                     content = $3, \
                     artifacts = $4, \
                     version = version + 1, \
                     updated_at = now() \
                 WHERE owner = $1 AND name = $2 AND version = $5 \
                 RETURNING id, version",
            )
            .bind(&document.owner)
            .bind(&document.name)
            .bind(&document.content)
            .bind(Json(&document.artifacts))
            .bind(document.version as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| {
                PortError::Conflict(format!(
                    "Document '{}' changed while this request was running",
                    document.name
                ))
            })?;

            tx.commit().await.map_err(unexpected)?;
            return Ok(saved.version.max(0) as u64);
        }

        // A fresh upload replaces any previous record, page images included.
        let saved = sqlx::query_as::<_, SavedRecord>(
            "INSERT INTO documents (id, owner, name, content, artifacts, version) \
             VALUES ($1, $2, $3, $4, $5, 1) \
             ON CONFLICT (owner, name) DO UPDATE SET \
                 content = EXCLUDED.content, \
                 artifacts = EXCLUDED.artifacts, \
                 version = documents.version + 1, \
                 updated_at = now() \
             RETURNING id, version",
        )
        .bind(document.id)
        .bind(&document.owner)
        .bind(&document.name)
        .bind(&document.content)
        .bind(Json(&document.artifacts))
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("DELETE FROM page_images WHERE document_id = $1")
            .bind(saved.id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        for (idx, image) in document.images.iter().enumerate() {
            sqlx::query(
                "INSERT INTO page_images (document_id, idx, payload, encoding, width, height, page) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(saved.id)
            .bind(idx as i32)
            .bind(&image.payload)
            .bind(image.encoding.as_str())
            .bind(image.width as i32)
            .bind(image.height as i32)
            .bind(image.page as i32)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(saved.version.max(0) as u64)
    }

    async fn get_document(&self, owner: &str, name: &str) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, owner, name, content, artifacts, version, created_at, updated_at \
             FROM documents WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Document '{}' not found", name)),
            _ => unexpected(e),
        })?;

        let images = sqlx::query_as::<_, PageImageRecord>(
            "SELECT payload, encoding, width, height, page FROM page_images \
             WHERE document_id = $1 ORDER BY idx ASC",
        )
        .bind(record.id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain(images.into_iter().map(PageImageRecord::to_domain).collect()))
    }

    async fn list_documents(&self, owner: &str) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT name FROM documents WHERE owner = $1 ORDER BY name ASC")
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn get_page_image(&self, owner: &str, name: &str, index: usize) -> PortResult<PageImage> {
        let record = sqlx::query_as::<_, PageImageRecord>(
            "SELECT p.payload, p.encoding, p.width, p.height, p.page \
             FROM page_images p JOIN documents d ON d.id = p.document_id \
             WHERE d.owner = $1 AND d.name = $2 AND p.idx = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(index as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record
            .map(PageImageRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Image {} of '{}' not found", index, name)))
    }

    async fn append_test_record(&self, username: &str, record: &TestRecord) -> PortResult<()> {
        sqlx::query("INSERT INTO test_records (username, record) VALUES ($1, $2)")
            .bind(username)
            .bind(Json(record))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn test_history(&self, username: &str) -> PortResult<Vec<TestRecord>> {
        let rows = sqlx::query_as::<_, TestRecordRow>(
            "SELECT record FROM test_records WHERE username = $1 ORDER BY id DESC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(rows.into_iter().map(|row| row.record.0).collect())
    }
}

//=========================================================================================
// The Usage Counter
//=========================================================================================

/// A usage counter shared by every server instance that points at the same database.
#[derive(Clone)]
pub struct PgUsageCounter {
    pool: PgPool,
}

impl PgUsageCounter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageCounter for PgUsageCounter {
    async fn get(&self, key: &str) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count FROM usage_counters WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn increment(&self, key: &str) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "INSERT INTO usage_counters (key, count) VALUES ($1, 1) \
             ON CONFLICT (key) DO UPDATE SET count = usage_counters.count + 1 \
             RETURNING count",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count.max(0) as u64)
    }

    async fn increment_below(&self, key: &str, cap: u64) -> PortResult<Option<u64>> {
        // One statement: a row at the cap is neither inserted nor updated.
        let count = sqlx::query_scalar::<_, i64>(
            "INSERT INTO usage_counters (key, count) SELECT $1, 1 WHERE $2 > 0 \
             ON CONFLICT (key) DO UPDATE SET count = usage_counters.count + 1 \
             WHERE usage_counters.count < $2 \
             RETURNING count",
        )
        .bind(key)
        .bind(i64::try_from(cap).unwrap_or(i64::MAX))
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count.map(|c| c.max(0) as u64))
    }
}
