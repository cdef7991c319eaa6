//! Veriscan core library
//!
//! Shared foundation for the Veriscan pipeline: configuration, the unified
//! error type, domain models (file records, scan statuses, events), and
//! content checksums. Every other crate in the workspace depends on this one.

pub mod checksum;
pub mod config;
pub mod error;
pub mod models;

pub use checksum::sha256_hex;
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{EventType, FileRecord, ObjectCreatedEvent, ScanStatus};
