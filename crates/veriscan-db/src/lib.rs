//! Veriscan status store
//!
//! Durable, append-only record of scan status transitions, keyed by
//! `(file_id, sequence)`. The store is the single point of serialization for
//! concurrent scan invocations: an append is accepted only if its sequence is
//! strictly greater than every existing sequence for that file, so a losing
//! writer gets [`StatusStoreError::ConcurrentWriteConflict`] and must re-read.
//!
//! Two implementations: [`PgStatusStore`] (Postgres, production) and
//! [`MemoryStatusStore`] (tests and single-process deployments).

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryStatusStore;
pub use postgres::PgStatusStore;
pub use store::{StatusStore, StatusStoreError, StatusStoreResult};
