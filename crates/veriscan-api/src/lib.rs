//! Veriscan HTTP surface
//!
//! Upload intake, poll-based status, and the wiring that starts the scan
//! worker, event queue, and replication loop alongside the server.

pub mod api_doc;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod setup;
pub mod state;
