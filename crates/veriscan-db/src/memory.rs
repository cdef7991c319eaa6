//! In-memory status store.
//!
//! The map mutex makes the sequence check and the append one critical
//! section, which is exactly the optimistic-concurrency contract the Postgres
//! implementation gets from its conditional insert.

use crate::store::{StatusStore, StatusStoreError, StatusStoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use veriscan_core::FileRecord;

#[derive(Clone, Default)]
pub struct MemoryStatusStore {
    records: Arc<Mutex<HashMap<Uuid, Vec<FileRecord>>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn put_record(&self, record: &FileRecord) -> StatusStoreResult<()> {
        let mut records = self.records.lock().unwrap();
        let history = records.entry(record.file_id).or_default();

        if let Some(last) = history.last() {
            if record.sequence <= last.sequence {
                return Err(StatusStoreError::ConcurrentWriteConflict {
                    file_id: record.file_id,
                    sequence: record.sequence,
                });
            }
        }

        history.push(record.clone());
        Ok(())
    }

    async fn get_latest(&self, file_id: Uuid) -> StatusStoreResult<FileRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&file_id)
            .and_then(|history| history.last().cloned())
            .ok_or(StatusStoreError::NotFound(file_id))
    }

    async fn get_history(&self, file_id: Uuid) -> StatusStoreResult<Vec<FileRecord>> {
        self.records
            .lock()
            .unwrap()
            .get(&file_id)
            .filter(|history| !history.is_empty())
            .cloned()
            .ok_or(StatusStoreError::NotFound(file_id))
    }

    async fn list_file_ids(&self) -> StatusStoreResult<Vec<Uuid>> {
        Ok(self.records.lock().unwrap().keys().copied().collect())
    }
}
