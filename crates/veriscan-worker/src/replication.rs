//! Asynchronous replication of status records and clean objects to a
//! secondary region.
//!
//! Replication is pull-based and idempotent: each cycle diffs the replica
//! against the primary and copies whatever is missing. Records are copied per
//! file in sequence order so the replica never holds a record whose
//! predecessors are absent; the replica may lag the primary but is never
//! inconsistent. Raw (unscanned) objects are deliberately not replicated.
//!
//! The primary never waits on the replica: a failed cycle is logged and
//! retried on the next tick.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use veriscan_db::{StatusStore, StatusStoreError};
use veriscan_storage::ObjectStore;

const CLEAN_PREFIX: &str = "clean/";

#[derive(Clone)]
pub struct ReplicationConfig {
    pub poll_interval_secs: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
        }
    }
}

/// What one replication cycle copied.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplicationStats {
    pub records_copied: usize,
    pub objects_copied: usize,
}

pub struct ReplicationWorker {
    primary_records: Arc<dyn StatusStore>,
    replica_records: Arc<dyn StatusStore>,
    primary_clean: Arc<dyn ObjectStore>,
    replica_clean: Arc<dyn ObjectStore>,
}

/// Handle to a running replication loop.
pub struct ReplicationHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ReplicationHandle {
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl ReplicationWorker {
    pub fn new(
        primary_records: Arc<dyn StatusStore>,
        replica_records: Arc<dyn StatusStore>,
        primary_clean: Arc<dyn ObjectStore>,
        replica_clean: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            primary_records,
            replica_records,
            primary_clean,
            replica_clean,
        }
    }

    /// Run replication cycles on an interval until shutdown.
    pub fn spawn(self, config: ReplicationConfig) -> ReplicationHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let poll_interval = Duration::from_secs(config.poll_interval_secs.max(1));

        tokio::spawn(async move {
            tracing::info!(
                poll_interval_secs = poll_interval.as_secs(),
                "Replication worker started"
            );
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.replicate_once().await {
                            Ok(stats) if stats != ReplicationStats::default() => {
                                tracing::info!(
                                    records_copied = stats.records_copied,
                                    objects_copied = stats.objects_copied,
                                    "Replication cycle completed"
                                );
                            }
                            Ok(_) => {
                                tracing::debug!("Replication cycle completed, replica up to date");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Replication cycle failed");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Replication worker shutting down");
                        break;
                    }
                }
            }
        });

        ReplicationHandle { shutdown_tx }
    }

    /// One full diff-and-copy cycle.
    ///
    /// Per-file failures are logged and skipped so one bad file cannot stall
    /// replication of the rest; they surface as lag, not as an error.
    pub async fn replicate_once(&self) -> Result<ReplicationStats> {
        let mut stats = ReplicationStats::default();

        let file_ids = self
            .primary_records
            .list_file_ids()
            .await
            .context("failed to list primary file ids")?;

        for file_id in file_ids {
            match self.replicate_file_records(file_id).await {
                Ok(copied) => stats.records_copied += copied,
                Err(e) => {
                    tracing::warn!(file_id = %file_id, error = %e, "Failed to replicate records for file");
                }
            }
        }

        let clean_keys = self
            .primary_clean
            .list_keys(CLEAN_PREFIX)
            .await
            .context("failed to list primary clean objects")?;

        for key in clean_keys {
            match self.replicate_clean_object(&key).await {
                Ok(true) => stats.objects_copied += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to replicate clean object");
                }
            }
        }

        Ok(stats)
    }

    /// Copy the records the replica is missing for one file, lowest sequence
    /// first.
    async fn replicate_file_records(&self, file_id: uuid::Uuid) -> Result<usize> {
        let history = self.primary_records.get_history(file_id).await?;

        let replica_high = match self.replica_records.get_latest(file_id).await {
            Ok(record) => record.sequence,
            Err(StatusStoreError::NotFound(_)) => -1,
            Err(e) => return Err(e.into()),
        };

        let mut copied = 0;
        for record in history.iter().filter(|r| r.sequence > replica_high) {
            match self.replica_records.put_record(record).await {
                Ok(()) => copied += 1,
                Err(StatusStoreError::ConcurrentWriteConflict { .. }) => {
                    // Another replicator got there first; stop to preserve
                    // sequence order and let the next cycle re-diff.
                    tracing::debug!(
                        file_id = %file_id,
                        sequence = record.sequence,
                        "Replica already has record, deferring to next cycle"
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(copied)
    }

    async fn replicate_clean_object(&self, key: &str) -> Result<bool> {
        if self.replica_clean.exists(key).await? {
            return Ok(false);
        }
        let data = self.primary_clean.get(key).await?;
        let wrote = self.replica_clean.put_if_absent(key, data).await?;
        Ok(wrote)
    }
}
