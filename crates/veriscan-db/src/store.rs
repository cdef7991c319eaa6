//! Status store trait and errors.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;
use veriscan_core::FileRecord;

#[derive(Debug, Error)]
pub enum StatusStoreError {
    /// The append lost the optimistic sequence race: some record with an
    /// equal or higher sequence already exists for this file. The caller
    /// must re-read the latest record and retry (or stop, if the winner
    /// reached a terminal status).
    #[error("Concurrent write conflict for file {file_id} at sequence {sequence}")]
    ConcurrentWriteConflict { file_id: Uuid, sequence: i64 },

    #[error("No records for file {0}")]
    NotFound(Uuid),

    #[error("Status store error: {0}")]
    Database(String),
}

pub type StatusStoreResult<T> = Result<T, StatusStoreError>;

/// Append-only store of status transitions.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Append a record. Accepted only if `record.sequence` is strictly
    /// greater than every existing sequence for `record.file_id`.
    async fn put_record(&self, record: &FileRecord) -> StatusStoreResult<()>;

    /// The record with the maximal sequence for `file_id`.
    async fn get_latest(&self, file_id: Uuid) -> StatusStoreResult<FileRecord>;

    /// Full history for `file_id`, ascending by sequence. Empty history is
    /// `NotFound`.
    async fn get_history(&self, file_id: Uuid) -> StatusStoreResult<Vec<FileRecord>>;

    /// Every file id with at least one record. Used by the replication layer
    /// to enumerate work; order is unspecified.
    async fn list_file_ids(&self) -> StatusStoreResult<Vec<Uuid>>;
}
