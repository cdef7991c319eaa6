//! Intake gateway: accepts an upload, stores the raw object, and appends the
//! initial status record.
//!
//! Ordering matters here: the raw object is written before the record, and a
//! failed record write removes the raw object again. A caller can therefore
//! never observe a stored object without a pollable status, and never a
//! status without a stored object.

use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;
use veriscan_core::{sha256_hex, AppError, EventType, FileRecord, ObjectCreatedEvent};
use veriscan_db::StatusStore;
use veriscan_storage::{raw_object_key, ObjectStore};

const RAW_BUCKET: &str = "raw";

pub struct IntakeGateway {
    raw_store: Arc<dyn ObjectStore>,
    status_store: Arc<dyn StatusStore>,
    max_file_size_bytes: usize,
    allowed_extensions: Vec<String>,
}

impl IntakeGateway {
    pub fn new(
        raw_store: Arc<dyn ObjectStore>,
        status_store: Arc<dyn StatusStore>,
        max_file_size_bytes: usize,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            raw_store,
            status_store,
            max_file_size_bytes,
            allowed_extensions,
        }
    }

    /// Accept an upload and return the id to poll plus the object-created
    /// event to hand to the notifier.
    #[tracing::instrument(skip(self, data), fields(file_name = %file_name, size = data.len()))]
    pub async fn accept_upload(
        &self,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<(Uuid, ObjectCreatedEvent), AppError> {
        self.validate(file_name, &data)?;

        let file_id = Uuid::new_v4();
        let checksum = sha256_hex(&data);
        let key = raw_object_key(file_id, file_name);

        self.raw_store
            .put(&key, data)
            .await
            .map_err(|e| AppError::UploadFailed(format!("raw store write failed: {}", e)))?;

        let record = FileRecord::initial(file_id, checksum, key.clone(), file_name.to_string());

        if let Err(e) = self.status_store.put_record(&record).await {
            // Compensate so no object exists without a pollable status.
            if let Err(del) = self.raw_store.delete(&key).await {
                tracing::warn!(key = %key, error = %del, "Failed to remove raw object after record write failure");
            }
            return Err(AppError::UploadFailed(format!(
                "status record write failed: {}",
                e
            )));
        }

        tracing::info!(file_id = %file_id, key = %key, "Upload accepted");

        let event = ObjectCreatedEvent {
            bucket: RAW_BUCKET.to_string(),
            key,
            event_type: EventType::ObjectCreated,
        };
        Ok((file_id, event))
    }

    fn validate(&self, file_name: &str, data: &[u8]) -> Result<(), AppError> {
        if file_name.trim().is_empty() {
            return Err(AppError::InvalidInput("file name is required".to_string()));
        }
        if data.is_empty() {
            return Err(AppError::InvalidInput("file is empty".to_string()));
        }
        if data.len() > self.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "file exceeds the maximum size of {} bytes",
                self.max_file_size_bytes
            )));
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(AppError::InvalidInput(format!(
                "file type '{}' is not allowed (allowed: {})",
                extension,
                self.allowed_extensions.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriscan_core::ScanStatus;
    use veriscan_db::MemoryStatusStore;
    use veriscan_storage::MemoryObjectStore;

    fn gateway() -> (IntakeGateway, Arc<MemoryObjectStore>, Arc<MemoryStatusStore>) {
        let raw_store = Arc::new(MemoryObjectStore::new());
        let status_store = Arc::new(MemoryStatusStore::new());
        let gateway = IntakeGateway::new(
            raw_store.clone(),
            status_store.clone(),
            1024,
            vec!["pdf".to_string(), "zip".to_string()],
        );
        (gateway, raw_store, status_store)
    }

    #[tokio::test]
    async fn accepted_upload_stores_object_and_pending_record() {
        let (gateway, raw_store, status_store) = gateway();

        let (file_id, event) = gateway
            .accept_upload("report.pdf", b"content".to_vec())
            .await
            .unwrap();

        assert_eq!(event.key, raw_object_key(file_id, "report.pdf"));
        assert_eq!(raw_store.get(&event.key).await.unwrap(), b"content");

        let record = status_store.get_latest(file_id).await.unwrap();
        assert_eq!(record.status, ScanStatus::Pending);
        assert_eq!(record.sequence, 0);
        assert_eq!(record.checksum, sha256_hex(b"content"));
        assert_eq!(record.file_name, "report.pdf");
    }

    #[tokio::test]
    async fn rejects_disallowed_extension() {
        let (gateway, _, _) = gateway();
        let err = gateway
            .accept_upload("malware.exe", b"content".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_missing_extension() {
        let (gateway, _, _) = gateway();
        let err = gateway
            .accept_upload("README", b"content".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_empty_body_and_name() {
        let (gateway, _, _) = gateway();
        assert!(matches!(
            gateway.accept_upload("a.pdf", Vec::new()).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
        assert!(matches!(
            gateway.accept_upload("  ", b"x".to_vec()).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_body() {
        let (gateway, _, _) = gateway();
        let err = gateway
            .accept_upload("big.zip", vec![0u8; 2048])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn storage_outage_surfaces_as_upload_failed() {
        let (gateway, raw_store, status_store) = gateway();
        raw_store.set_fail_writes(true);

        let err = gateway
            .accept_upload("report.pdf", b"content".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UploadFailed(_)));
        assert!(status_store.list_file_ids().await.unwrap().is_empty());
    }
}
