//! # Switchboard Server
//!
//! HTTP evaluation API for Switchboard.

mod config;
mod recorder;
mod routes;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchboard_core::{conditions, Evaluator};
use switchboard_storage::{spawn_refresher, Database, DatabaseConfig, SnapshotCache};

use crate::config::ServerConfig;
use crate::recorder::JsonLogRecorder;
use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load()?;
    conditions::set_default_epsilon(config.eval_epsilon);

    tracing::info!("Starting Switchboard server...");

    let db = Database::connect(&DatabaseConfig::from_url(&config.database_url)).await?;
    let cache = Arc::new(SnapshotCache::new());
    // The first snapshot must load; serving an empty corpus would answer
    // every evaluation with not-found.
    let initial = cache.refresh(&db).await?;
    tracing::info!(flags = initial.len(), "initial snapshot loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = spawn_refresher(
        Arc::clone(&cache),
        db,
        config.reload_interval(),
        shutdown_rx,
    );

    let (recorder, recorder_drain) = JsonLogRecorder::spawn(config.recorder_queue_size);
    let state = AppState {
        cache,
        evaluator: Evaluator::new(),
        recorder: Arc::new(recorder),
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Switchboard server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    shutdown_tx.send(true).ok();
    refresher.await.ok();
    recorder_drain.await.ok();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c");
}
