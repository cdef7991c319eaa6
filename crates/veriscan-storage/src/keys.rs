//! Shared key generation for storage backends.
//!
//! Raw objects live at `raw/{file_id}/{filename}`; clean objects at
//! `clean/{checksum}`. All backends and components use these helpers so the
//! layout stays consistent.

use uuid::Uuid;

/// Storage key for a freshly uploaded raw object.
pub fn raw_object_key(file_id: Uuid, filename: &str) -> String {
    format!("raw/{}/{}", file_id, filename)
}

/// Storage key for a promoted clean object. Keyed by content checksum, so
/// identical content is stored exactly once.
pub fn clean_object_key(checksum: &str) -> String {
    format!("clean/{}", checksum)
}

/// Extract the `file_id` from a raw object key, if the key matches the
/// `raw/{file_id}/{filename}` layout.
pub fn parse_raw_object_key(key: &str) -> Option<Uuid> {
    let mut parts = key.splitn(3, '/');
    if parts.next() != Some("raw") {
        return None;
    }
    let id = parts.next()?;
    // the filename segment must be present and non-empty
    let filename = parts.next()?;
    if filename.is_empty() {
        return None;
    }
    Uuid::parse_str(id).ok()
}
