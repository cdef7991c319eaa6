//! Shared application state injected into handlers.

use std::sync::Arc;
use veriscan_core::Config;
use veriscan_db::StatusStore;
use veriscan_worker::EventQueue;

use crate::intake::IntakeGateway;

pub struct AppState {
    pub config: Config,
    pub intake: IntakeGateway,
    pub status_store: Arc<dyn StatusStore>,
    pub event_queue: EventQueue,
}
