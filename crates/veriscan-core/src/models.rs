//! Domain models: file records, scan statuses, and object-created events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of an uploaded file.
///
/// Transitions move one way: `Pending -> Scanning -> {Clean, Infected, Failed}`.
/// The terminal statuses never transition again; a repeated event for a file
/// whose latest record is terminal is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    Scanning,
    Clean,
    Infected,
    Failed,
}

impl ScanStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Clean | ScanStatus::Infected | ScanStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "PENDING",
            ScanStatus::Scanning => "SCANNING",
            ScanStatus::Clean => "CLEAN",
            ScanStatus::Infected => "INFECTED",
            ScanStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ScanStatus::Pending),
            "SCANNING" => Some(ScanStatus::Scanning),
            "CLEAN" => Some(ScanStatus::Clean),
            "INFECTED" => Some(ScanStatus::Infected),
            "FAILED" => Some(ScanStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point-in-time status for an uploaded file.
///
/// `(file_id, sequence)` is the record identity. The status store only accepts
/// a record whose sequence is strictly greater than every existing sequence
/// for that file, so the history is append-only and the max-sequence record is
/// authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub sequence: i64,
    pub status: ScanStatus,
    /// Free-text diagnostic (threat name, engine error, ...). Non-authoritative.
    pub detail: Option<String>,
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub checksum: String,
    /// Storage key of the associated raw or clean object.
    pub object_ref: String,
    /// Original filename as supplied at upload time.
    pub file_name: String,
    /// Scan-engine retries consumed so far for this upload attempt.
    pub retry_count: i32,
    pub recorded_at: DateTime<Utc>,
}

impl FileRecord {
    /// Build the initial record for a fresh upload (`Pending`, sequence 0).
    pub fn initial(file_id: Uuid, checksum: String, object_ref: String, file_name: String) -> Self {
        Self {
            file_id,
            sequence: 0,
            status: ScanStatus::Pending,
            detail: None,
            checksum,
            object_ref,
            file_name,
            retry_count: 0,
            recorded_at: Utc::now(),
        }
    }

    /// Build the successor record: same identity fields, next sequence, new status.
    pub fn advance(&self, status: ScanStatus, detail: Option<String>) -> Self {
        Self {
            file_id: self.file_id,
            sequence: self.sequence + 1,
            status,
            detail,
            checksum: self.checksum.clone(),
            object_ref: self.object_ref.clone(),
            file_name: self.file_name.clone(),
            retry_count: self.retry_count,
            recorded_at: Utc::now(),
        }
    }

    /// Like [`advance`](Self::advance) but with an updated retry counter.
    pub fn advance_with_retry(
        &self,
        status: ScanStatus,
        detail: Option<String>,
        retry_count: i32,
    ) -> Self {
        let mut next = self.advance(status, detail);
        next.retry_count = retry_count;
        next
    }
}

/// Kind of storage notification. Only object creation drives scans; other
/// kinds are accepted from the notifier and ignored by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ObjectCreated,
    ObjectRemoved,
}

/// "Object created" notification as delivered by the event notifier.
///
/// Delivery is at-least-once: duplicates and reordering across distinct
/// objects are expected, and the scan worker must tolerate both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCreatedEvent {
    /// Logical bucket/location the object lives in.
    pub bucket: String,
    /// Storage key of the raw object (`raw/{file_id}/{filename}`).
    pub key: String,
    pub event_type: EventType,
}

impl ObjectCreatedEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            event_type: EventType::ObjectCreated,
        }
    }
}
