//! Application wiring: stores, scanner, workers, and routes.

pub mod server;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use veriscan_core::Config;
use veriscan_db::{MemoryStatusStore, PgStatusStore, StatusStore};
use veriscan_services::{ClamAvScanner, Scanner, StubScanner};
use veriscan_storage::{LocalObjectStore, ObjectStore};
use veriscan_worker::{
    EventQueue, EventQueueConfig, ReplicationConfig, ReplicationHandle, ReplicationWorker,
    ScanWorker,
};

use crate::api_doc::ApiDoc;
use crate::handlers;
use crate::intake::IntakeGateway;
use crate::state::AppState;

/// Headroom over the configured file size for multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub async fn initialize_app(
    config: Config,
) -> Result<(Arc<AppState>, Option<ReplicationHandle>, Router)> {
    let raw_store: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(&config.raw_store_path)
            .await
            .context("failed to open raw object store")?,
    );
    let clean_store: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(&config.clean_store_path)
            .await
            .context("failed to open clean object store")?,
    );

    let status_store = connect_status_store(config.database_url.as_deref()).await?;

    let scanner: Arc<dyn Scanner> = if config.clamav_enabled {
        tracing::info!(
            host = %config.clamav_host,
            port = config.clamav_port,
            "Using ClamAV scan engine"
        );
        Arc::new(ClamAvScanner::with_timeout(
            config.clamav_host.clone(),
            config.clamav_port,
            config.clamav_timeout_secs,
        ))
    } else {
        tracing::warn!("CLAMAV_ENABLED is false, using the stub scanner (development only)");
        Arc::new(StubScanner::new())
    };

    let worker = Arc::new(ScanWorker::new(
        status_store.clone(),
        raw_store.clone(),
        clean_store.clone(),
        scanner,
        config.scan_max_retries,
    ));
    let event_queue = EventQueue::new(
        EventQueueConfig {
            max_workers: config.queue_max_workers,
            max_deliveries: config.queue_max_deliveries,
            ..Default::default()
        },
        worker,
    );

    let replication = if config.replication_enabled {
        Some(start_replication(&config, status_store.clone(), clean_store.clone()).await?)
    } else {
        None
    };

    let intake = IntakeGateway::new(
        raw_store,
        status_store.clone(),
        config.max_file_size_bytes,
        config.allowed_extensions.clone(),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        intake,
        status_store,
        event_queue,
    });

    let router = build_router(state.clone(), &config);
    Ok((state, replication, router))
}

async fn connect_status_store(database_url: Option<&str>) -> Result<Arc<dyn StatusStore>> {
    match database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to the status database")?;
            PgStatusStore::migrate(&pool)
                .await
                .context("status store migration failed")?;
            tracing::info!("Using Postgres status store");
            Ok(Arc::new(PgStatusStore::new(pool)))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using in-memory status store (records are lost on restart)"
            );
            Ok(Arc::new(MemoryStatusStore::new()))
        }
    }
}

async fn start_replication(
    config: &Config,
    primary_records: Arc<dyn StatusStore>,
    primary_clean: Arc<dyn ObjectStore>,
) -> Result<ReplicationHandle> {
    // validate() guarantees the path is present when replication is enabled
    let replica_path = config
        .replica_clean_store_path
        .as_deref()
        .context("replica clean store path missing")?;
    let replica_clean: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(replica_path)
            .await
            .context("failed to open replica clean store")?,
    );
    let replica_records = connect_status_store(config.replica_database_url.as_deref()).await?;

    let worker = ReplicationWorker::new(
        primary_records,
        replica_records,
        primary_clean,
        replica_clean,
    );
    Ok(worker.spawn(ReplicationConfig {
        poll_interval_secs: config.replication_poll_interval_secs,
    }))
}

fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/api/v0/files", post(handlers::upload::upload_file))
        .route(
            "/api/v0/files/{file_id}/status",
            get(handlers::status::get_file_status),
        )
        .route("/api/v0/health", get(handlers::health::health))
        .route("/api/v0/openapi.json", get(serve_openapi))
        .layer(DefaultBodyLimit::max(
            config.max_file_size_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
