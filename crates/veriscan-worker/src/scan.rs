//! Scan worker state machine.
//!
//! Drives one uploaded object from `PENDING` through `SCANNING` to a terminal
//! verdict. Delivery of object-created events is at-least-once and possibly
//! concurrent, so every step defends against duplicates:
//!
//! - a terminal latest record short-circuits the whole invocation;
//! - every status append goes through the optimistic sequence check, and a
//!   losing writer re-reads before retrying;
//! - promotion into the clean store is write-once per checksum.
//!
//! The worker never assumes exactly-once delivery anywhere.

use crate::error::ScanTaskError;
use crate::queue::EventHandler;
use async_trait::async_trait;
use std::sync::Arc;
use veriscan_core::{EventType, FileRecord, ObjectCreatedEvent, ScanStatus};
use veriscan_db::{StatusStore, StatusStoreError};
use veriscan_services::{ScanVerdict, Scanner};
use veriscan_storage::{clean_object_key, parse_raw_object_key, ObjectStore, StorageError};

/// What one invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The latest record was already terminal; duplicate delivery, no-op.
    AlreadyTerminal,
    /// Clean verdict: object promoted into the clean store, raw copy removed.
    Promoted,
    /// Infected verdict: raw copy removed, never promoted.
    Quarantined,
    /// Engine failure below the retry budget; status left recoverable.
    RetryScheduled { retry_count: i32 },
    /// Engine failures exhausted the budget; terminal FAILED written.
    FailedTerminal,
    /// Event was not an object-created notification.
    Ignored,
}

pub struct ScanWorker {
    status_store: Arc<dyn StatusStore>,
    raw_store: Arc<dyn ObjectStore>,
    clean_store: Arc<dyn ObjectStore>,
    scanner: Arc<dyn Scanner>,
    max_retries: i32,
}

impl ScanWorker {
    pub fn new(
        status_store: Arc<dyn StatusStore>,
        raw_store: Arc<dyn ObjectStore>,
        clean_store: Arc<dyn ObjectStore>,
        scanner: Arc<dyn Scanner>,
        max_retries: i32,
    ) -> Self {
        Self {
            status_store,
            raw_store,
            clean_store,
            scanner,
            max_retries,
        }
    }

    /// Handle one object-created event to completion.
    #[tracing::instrument(skip(self, event), fields(key = %event.key))]
    pub async fn handle_event(
        &self,
        event: &ObjectCreatedEvent,
    ) -> Result<ScanOutcome, ScanTaskError> {
        if event.event_type != EventType::ObjectCreated {
            tracing::debug!(event_type = ?event.event_type, "Ignoring non-create event");
            return Ok(ScanOutcome::Ignored);
        }

        let file_id = parse_raw_object_key(&event.key).ok_or_else(|| {
            ScanTaskError::unrecoverable(anyhow::anyhow!(
                "event key '{}' is not a raw object key",
                event.key
            ))
        })?;

        let mut latest = match self.status_store.get_latest(file_id).await {
            Ok(record) => record,
            Err(StatusStoreError::NotFound(_)) => {
                // Intake writes the initial record before the notifier ever
                // sees the object, so an unknown file cannot become known by
                // redelivering.
                return Err(ScanTaskError::unrecoverable(anyhow::anyhow!(
                    "no status record for file {}",
                    file_id
                )));
            }
            Err(e) => return Err(ScanTaskError::recoverable(e.into())),
        };

        if latest.status.is_terminal() {
            tracing::debug!(
                file_id = %file_id,
                status = %latest.status,
                "Duplicate delivery for terminal file, skipping"
            );
            return Ok(ScanOutcome::AlreadyTerminal);
        }

        let scanning = latest.advance(ScanStatus::Scanning, None);
        if !self.append_or_yield(&mut latest, scanning).await? {
            return Ok(ScanOutcome::AlreadyTerminal);
        }

        tracing::info!(file_id = %file_id, checksum = %latest.checksum, "Scanning file");

        let bytes = match self.raw_store.get(&latest.object_ref).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                // A crash between clean-store copy and the CLEAN append can
                // leave a promoted object with no raw copy; finish the
                // promotion instead of failing the file.
                let clean_key = clean_object_key(&latest.checksum);
                match self.clean_store.exists(&clean_key).await {
                    Ok(true) => {
                        tracing::warn!(
                            file_id = %file_id,
                            "Raw object gone but clean copy present, completing promotion"
                        );
                        return self.finish_promotion(&mut latest, None).await;
                    }
                    Ok(false) => {
                        return self
                            .handle_engine_failure(&mut latest, "raw object missing".to_string())
                            .await;
                    }
                    Err(e) => return Err(ScanTaskError::recoverable(e.into())),
                }
            }
            Err(e) => return Err(ScanTaskError::recoverable(e.into())),
        };

        match self.scanner.scan(&bytes).await {
            Ok(report) => match report.verdict {
                ScanVerdict::Clean => {
                    let clean_key = clean_object_key(&latest.checksum);
                    let wrote = self
                        .clean_store
                        .put_if_absent(&clean_key, bytes)
                        .await
                        .map_err(|e| ScanTaskError::recoverable(e.into()))?;
                    if !wrote {
                        tracing::debug!(
                            checksum = %latest.checksum,
                            "Clean object already present, promotion deduplicated"
                        );
                    }

                    self.raw_store
                        .delete(&latest.object_ref)
                        .await
                        .map_err(|e| ScanTaskError::recoverable(e.into()))?;

                    self.finish_promotion(&mut latest, report.signature_version)
                        .await
                }
                ScanVerdict::Infected { threat } => {
                    // Quarantine: the raw object is removed and nothing is
                    // ever promoted for this checksum.
                    self.raw_store
                        .delete(&latest.object_ref)
                        .await
                        .map_err(|e| ScanTaskError::recoverable(e.into()))?;

                    let infected = latest.advance(
                        ScanStatus::Infected,
                        Some(format!("threat detected: {}", threat)),
                    );
                    if !self.append_or_yield(&mut latest, infected).await? {
                        return Ok(ScanOutcome::AlreadyTerminal);
                    }

                    tracing::warn!(file_id = %file_id, threat = %threat, "File quarantined");
                    Ok(ScanOutcome::Quarantined)
                }
            },
            Err(scan_err) => {
                self.handle_engine_failure(&mut latest, scan_err.to_string())
                    .await
            }
        }
    }

    /// Append the CLEAN record, pointing `object_ref` at the clean object.
    async fn finish_promotion(
        &self,
        latest: &mut FileRecord,
        signature_version: Option<String>,
    ) -> Result<ScanOutcome, ScanTaskError> {
        let detail = signature_version.map(|v| format!("clean (signatures {})", v));
        let mut clean = latest.advance(ScanStatus::Clean, detail);
        clean.object_ref = clean_object_key(&latest.checksum);

        if !self.append_or_yield(latest, clean).await? {
            return Ok(ScanOutcome::AlreadyTerminal);
        }

        tracing::info!(file_id = %latest.file_id, checksum = %latest.checksum, "File promoted to clean store");
        Ok(ScanOutcome::Promoted)
    }

    /// Consume one unit of the retry budget; terminal FAILED once exhausted.
    async fn handle_engine_failure(
        &self,
        latest: &mut FileRecord,
        reason: String,
    ) -> Result<ScanOutcome, ScanTaskError> {
        let retry_count = latest.retry_count + 1;

        if retry_count < self.max_retries {
            // Leave the file recoverable; the record carries the consumed
            // budget so it survives process restarts.
            let pending = latest.advance_with_retry(
                ScanStatus::Pending,
                Some(format!("scan attempt {} failed: {}", retry_count, reason)),
                retry_count,
            );
            if !self.append_or_yield(latest, pending).await? {
                return Ok(ScanOutcome::AlreadyTerminal);
            }

            tracing::warn!(
                file_id = %latest.file_id,
                retry_count,
                max_retries = self.max_retries,
                reason = %reason,
                "Scan attempt failed, leaving recoverable"
            );
            Err(ScanTaskError::recoverable(anyhow::anyhow!(
                "scan attempt {} of {} failed: {}",
                retry_count,
                self.max_retries,
                reason
            )))
        } else {
            let failed = latest.advance_with_retry(
                ScanStatus::Failed,
                Some(format!(
                    "scan failed after {} attempts: {}",
                    retry_count, reason
                )),
                retry_count,
            );
            if !self.append_or_yield(latest, failed).await? {
                return Ok(ScanOutcome::AlreadyTerminal);
            }

            tracing::error!(
                file_id = %latest.file_id,
                retry_count,
                reason = %reason,
                "Scan retry budget exhausted, file marked FAILED"
            );
            Ok(ScanOutcome::FailedTerminal)
        }
    }

    /// Resolve a file whose event the queue abandoned at the delivery cap.
    ///
    /// Recoverable infrastructure failures (store or engine unreachable) can
    /// burn through the delivery cap without touching the scan retry budget;
    /// without this the file would sit non-terminal forever with no event
    /// left to advance it.
    pub async fn abandon_file(&self, event: &ObjectCreatedEvent) {
        let Some(file_id) = parse_raw_object_key(&event.key) else {
            return;
        };

        let mut latest = match self.status_store.get_latest(file_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    file_id = %file_id,
                    error = %e,
                    "Cannot resolve abandoned file, status unreadable"
                );
                return;
            }
        };
        if latest.status.is_terminal() {
            return;
        }

        let failed = latest.advance(
            ScanStatus::Failed,
            Some("event delivery attempts exhausted".to_string()),
        );
        match self.append_or_yield(&mut latest, failed).await {
            Ok(true) => {
                tracing::error!(
                    file_id = %file_id,
                    "Delivery attempts exhausted, file marked FAILED"
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    file_id = %file_id,
                    error = %e,
                    "Failed to mark abandoned file as FAILED"
                );
            }
        }
    }

    /// Append `next`, retrying the sequence race until the write lands or a
    /// concurrent writer reaches a terminal status.
    ///
    /// Returns `true` if `next` was written (and `latest` updated to it),
    /// `false` if a concurrent writer won with a terminal record.
    async fn append_or_yield(
        &self,
        latest: &mut FileRecord,
        mut next: FileRecord,
    ) -> Result<bool, ScanTaskError> {
        loop {
            match self.status_store.put_record(&next).await {
                Ok(()) => {
                    *latest = next;
                    return Ok(true);
                }
                Err(StatusStoreError::ConcurrentWriteConflict { .. }) => {
                    let current = self
                        .status_store
                        .get_latest(latest.file_id)
                        .await
                        .map_err(|e| ScanTaskError::recoverable(e.into()))?;

                    if current.status.is_terminal() {
                        tracing::debug!(
                            file_id = %latest.file_id,
                            status = %current.status,
                            "Lost append race to a terminal writer, yielding"
                        );
                        *latest = current;
                        return Ok(false);
                    }

                    // Re-base on the winner and try again.
                    next.sequence = current.sequence + 1;
                    *latest = current;
                }
                Err(e) => return Err(ScanTaskError::recoverable(e.into())),
            }
        }
    }
}

#[async_trait]
impl EventHandler for ScanWorker {
    async fn handle(&self, event: &ObjectCreatedEvent) -> Result<ScanOutcome, ScanTaskError> {
        self.handle_event(event).await
    }

    async fn deliveries_exhausted(&self, event: &ObjectCreatedEvent) {
        self.abandon_file(event).await;
    }
}
