//! Postgres status store.
//!
//! The append uses a conditional `INSERT ... WHERE NOT EXISTS`, so the
//! strictly-greater sequence check and the write are a single statement; two
//! concurrent appends for the same file cannot both succeed. The
//! `(file_id, sequence)` primary key backstops the same invariant, and a
//! unique violation is reported as the same conflict error.

use crate::store::{StatusStore, StatusStoreError, StatusStoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use veriscan_core::{FileRecord, ScanStatus};

/// Row type for the file_records table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
struct FileRecordRow {
    file_id: Uuid,
    sequence: i64,
    status: String,
    detail: Option<String>,
    checksum: String,
    object_ref: String,
    file_name: String,
    retry_count: i32,
    recorded_at: DateTime<Utc>,
}

impl FileRecordRow {
    fn into_record(self) -> StatusStoreResult<FileRecord> {
        let status = ScanStatus::parse(&self.status).ok_or_else(|| {
            StatusStoreError::Database(format!(
                "file {} sequence {} has unknown status '{}'",
                self.file_id, self.sequence, self.status
            ))
        })?;
        Ok(FileRecord {
            file_id: self.file_id,
            sequence: self.sequence,
            status,
            detail: self.detail,
            checksum: self.checksum,
            object_ref: self.object_ref,
            file_name: self.file_name,
            retry_count: self.retry_count,
            recorded_at: self.recorded_at,
        })
    }
}

#[derive(Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations (creates the file_records table).
    pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }
}

fn map_db_error(file_id: Uuid, sequence: i64, err: sqlx::Error) -> StatusStoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StatusStoreError::ConcurrentWriteConflict { file_id, sequence };
        }
    }
    StatusStoreError::Database(err.to_string())
}

#[async_trait]
impl StatusStore for PgStatusStore {
    #[tracing::instrument(skip(self, record), fields(file_id = %record.file_id, sequence = record.sequence))]
    async fn put_record(&self, record: &FileRecord) -> StatusStoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO file_records
                (file_id, sequence, status, detail, checksum, object_ref, file_name, retry_count, recorded_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9
            WHERE NOT EXISTS (
                SELECT 1 FROM file_records WHERE file_id = $1 AND sequence >= $2
            )
            "#,
        )
        .bind(record.file_id)
        .bind(record.sequence)
        .bind(record.status.as_str())
        .bind(&record.detail)
        .bind(&record.checksum)
        .bind(&record.object_ref)
        .bind(&record.file_name)
        .bind(record.retry_count)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error(record.file_id, record.sequence, e))?;

        if result.rows_affected() == 0 {
            return Err(StatusStoreError::ConcurrentWriteConflict {
                file_id: record.file_id,
                sequence: record.sequence,
            });
        }

        tracing::debug!(status = %record.status, "Status record appended");
        Ok(())
    }

    async fn get_latest(&self, file_id: Uuid) -> StatusStoreResult<FileRecord> {
        let row = sqlx::query_as::<Postgres, FileRecordRow>(
            r#"
            SELECT file_id, sequence, status, detail, checksum, object_ref,
                   file_name, retry_count, recorded_at
            FROM file_records
            WHERE file_id = $1
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StatusStoreError::Database(e.to_string()))?;

        row.ok_or(StatusStoreError::NotFound(file_id))?.into_record()
    }

    async fn get_history(&self, file_id: Uuid) -> StatusStoreResult<Vec<FileRecord>> {
        let rows = sqlx::query_as::<Postgres, FileRecordRow>(
            r#"
            SELECT file_id, sequence, status, detail, checksum, object_ref,
                   file_name, retry_count, recorded_at
            FROM file_records
            WHERE file_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StatusStoreError::Database(e.to_string()))?;

        if rows.is_empty() {
            return Err(StatusStoreError::NotFound(file_id));
        }

        rows.into_iter().map(FileRecordRow::into_record).collect()
    }

    async fn list_file_ids(&self) -> StatusStoreResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT DISTINCT file_id FROM file_records")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StatusStoreError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
