//! Veriscan object storage
//!
//! Storage abstraction for the three object areas of the pipeline and the
//! backends that implement it.
//!
//! # Key layout
//!
//! All backends use the same key scheme, centralized in the `keys` module:
//!
//! - **Raw (pending) objects**: `raw/{file_id}/{filename}` — written by intake,
//!   owned by intake until the worker promotes or quarantines.
//! - **Clean objects**: `clean/{checksum}` — written at most once per content
//!   checksum (promotion is idempotent).
//!
//! Keys must not contain `..` or a leading `/`.

pub mod keys;
pub mod local;
pub mod memory;
pub mod traits;

pub use keys::{clean_object_key, parse_raw_object_key, raw_object_key};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use traits::{ObjectStore, StorageError, StorageResult};
