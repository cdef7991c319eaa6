//! Veriscan worker
//!
//! The scan side of the pipeline: the [`ScanWorker`] state machine that takes
//! an uploaded object from `PENDING` to a terminal verdict, the in-process
//! [`EventQueue`] that delivers object-created notifications to it
//! at-least-once, and the [`ReplicationWorker`] that copies clean objects and
//! status history to the secondary region.

pub mod error;
pub mod queue;
pub mod replication;
pub mod scan;

pub use error::ScanTaskError;
pub use queue::{EventFinishedSender, EventHandler, EventQueue, EventQueueConfig};
pub use replication::{ReplicationConfig, ReplicationHandle, ReplicationStats, ReplicationWorker};
pub use scan::{ScanOutcome, ScanWorker};
