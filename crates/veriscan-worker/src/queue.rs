//! Event queue: worker pool, redelivery with backoff, and submission.
//!
//! Deliveries are at-least-once by construction: a handler that returns a
//! recoverable error gets the same event redelivered after an exponential
//! backoff, up to a delivery cap. Handlers must therefore be idempotent; they
//! are never told whether an invocation is a first delivery or a redelivery.
//!
//! Shutdown: [`EventQueue::shutdown`] signals the pool to stop; it does not
//! wait for in-flight deliveries. For graceful shutdown, coordinate with your
//! runtime and allow time for running handlers to finish before process exit.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use veriscan_core::ObjectCreatedEvent;

use crate::error::ScanTaskError;
use crate::scan::ScanOutcome;

/// Maximum delay in milliseconds before redelivering an event. Caps exponential
/// backoff so that high delivery counts do not produce excessively long delays.
pub const MAX_REDELIVERY_BACKOFF_MS: u64 = 300_000;

/// Backoff in milliseconds before the next delivery attempt (exponential with cap).
#[inline]
pub(crate) fn compute_redelivery_backoff_ms(attempt: u32, base_ms: u64) -> u64 {
    base_ms
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(MAX_REDELIVERY_BACKOFF_MS)
}

/// Consumer side of the queue.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ObjectCreatedEvent) -> Result<ScanOutcome, ScanTaskError>;

    /// Called once when the queue gives up on an event at the delivery cap.
    /// Handlers that track per-event state use this to resolve it; the event
    /// will not be delivered again.
    async fn deliveries_exhausted(&self, event: &ObjectCreatedEvent) {
        tracing::error!(key = %event.key, "Event abandoned at the delivery cap");
    }
}

/// Optional sender to notify when a delivery chain finishes (tests use this to
/// await pipeline completion). Carries the event key and the final outcome, or
/// `None` if the event was dropped without one.
pub type EventFinishedSender = mpsc::Sender<(String, Option<ScanOutcome>)>;

#[derive(Clone)]
pub struct EventQueueConfig {
    pub max_workers: usize,
    /// Total delivery attempts per event before it is dropped. This caps
    /// infrastructure-level redelivery; the scan retry budget is tracked
    /// separately in the status record.
    pub max_deliveries: u32,
    /// Base backoff in milliseconds for the first redelivery.
    pub retry_backoff_ms: u64,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_deliveries: 10,
            retry_backoff_ms: 1000,
        }
    }
}

struct Delivery {
    event: ObjectCreatedEvent,
    attempt: u32,
}

pub struct EventQueue {
    submit_tx: mpsc::Sender<Delivery>,
    shutdown_tx: mpsc::Sender<()>,
}

impl EventQueue {
    pub fn new(config: EventQueueConfig, handler: Arc<dyn EventHandler>) -> Self {
        Self::new_with_finished(config, handler, None)
    }

    pub fn new_with_finished(
        config: EventQueueConfig,
        handler: Arc<dyn EventHandler>,
        finished_tx: Option<EventFinishedSender>,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(1024);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let resubmit_tx = submit_tx.clone();
        tokio::spawn(async move {
            Self::worker_pool(config, handler, resubmit_tx, submit_rx, shutdown_rx, finished_tx)
                .await;
        });

        Self {
            submit_tx,
            shutdown_tx,
        }
    }

    /// Submit an event for delivery.
    #[tracing::instrument(skip(self, event), fields(key = %event.key))]
    pub async fn submit(&self, event: ObjectCreatedEvent) -> Result<()> {
        self.submit_tx
            .send(Delivery { event, attempt: 0 })
            .await
            .context("event queue is not accepting deliveries")?;
        tracing::debug!("Event submitted to queue");
        Ok(())
    }

    async fn worker_pool(
        config: EventQueueConfig,
        handler: Arc<dyn EventHandler>,
        resubmit_tx: mpsc::Sender<Delivery>,
        mut submit_rx: mpsc::Receiver<Delivery>,
        mut shutdown_rx: mpsc::Receiver<()>,
        finished_tx: Option<EventFinishedSender>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            max_deliveries = config.max_deliveries,
            "Event queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Event queue worker pool shutting down");
                    break;
                }
                delivery = submit_rx.recv() => {
                    let Some(delivery) = delivery else { break };
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };

                    let handler = handler.clone();
                    let config = config.clone();
                    let resubmit_tx = resubmit_tx.clone();
                    let finished_tx = finished_tx.clone();
                    tokio::spawn(async move {
                        Self::process_delivery(
                            delivery,
                            handler,
                            config,
                            resubmit_tx,
                            finished_tx,
                            permit,
                        )
                        .await;
                    });
                }
            }
        }

        tracing::info!("Event queue worker pool stopped");
    }

    async fn process_delivery(
        delivery: Delivery,
        handler: Arc<dyn EventHandler>,
        config: EventQueueConfig,
        resubmit_tx: mpsc::Sender<Delivery>,
        finished_tx: Option<EventFinishedSender>,
        permit: OwnedSemaphorePermit,
    ) {
        let key = delivery.event.key.clone();

        let result = handler.handle(&delivery.event).await;
        // Free the worker slot before any backoff sleep.
        drop(permit);

        match result {
            Ok(outcome) => {
                tracing::debug!(key = %key, outcome = ?outcome, "Event handled");
                if let Some(tx) = finished_tx {
                    let _ = tx.send((key, Some(outcome))).await;
                }
            }
            Err(e) if e.is_recoverable() && delivery.attempt + 1 < config.max_deliveries => {
                let backoff_ms = compute_redelivery_backoff_ms(delivery.attempt, config.retry_backoff_ms);
                tracing::warn!(
                    key = %key,
                    attempt = delivery.attempt + 1,
                    backoff_ms,
                    error = %e,
                    "Delivery failed, scheduling redelivery"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;

                let redelivery = Delivery {
                    event: delivery.event,
                    attempt: delivery.attempt + 1,
                };
                if resubmit_tx.send(redelivery).await.is_err() {
                    tracing::error!(key = %key, "Queue closed, dropping redelivery");
                    if let Some(tx) = finished_tx {
                        let _ = tx.send((key, None)).await;
                    }
                }
            }
            Err(e) if e.is_recoverable() => {
                tracing::error!(
                    key = %key,
                    attempts = delivery.attempt + 1,
                    error = %e,
                    "Event dropped after maximum deliveries"
                );
                handler.deliveries_exhausted(&delivery.event).await;
                if let Some(tx) = finished_tx {
                    let _ = tx.send((key, None)).await;
                }
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Event failed with unrecoverable error");
                if let Some(tx) = finished_tx {
                    let _ = tx.send((key, None)).await;
                }
            }
        }
    }

    /// Signals the worker pool to stop accepting deliveries and exit the main
    /// loop. Returns immediately; in-flight handlers run to completion.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating event queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for EventQueue {
    fn clone(&self) -> Self {
        Self {
            submit_tx: self.submit_tx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}
