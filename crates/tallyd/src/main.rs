use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tally_core::{AttendancePipeline, EncodingRepository, PipelineConfig};
use tracing_subscriber::EnvFilter;

mod config;
mod http;
mod mqtt;
mod sink;
mod store;

use config::Config;
use sink::SqliteEventSink;
use store::IdentityStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("tallyd starting");
    let config = Config::from_env();

    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = tokio_rusqlite::Connection::open(&config.db_path).await?;
    let store = Arc::new(IdentityStore::new(conn.clone()).await?);
    let sink = SqliteEventSink::new(conn).await?;
    tracing::info!(path = %config.db_path.display(), "database opened");

    let repository = Arc::new(EncodingRepository::new(config.encoding_dim));
    match store.list_all(config.encoding_dim).await {
        Ok(identities) => repository.load(identities),
        Err(err) => tracing::warn!(
            error = %err,
            "initial identity load failed; starting with an empty repository"
        ),
    }

    let pipeline = Arc::new(AttendancePipeline::new(
        repository.clone(),
        sink.clone(),
        PipelineConfig {
            tolerance: config.tolerance,
            cooldown: config.cooldown(),
        },
    ));

    let transport = mqtt::spawn(&config, pipeline.clone());

    spawn_reload_task(
        store.clone(),
        repository.clone(),
        config.encoding_dim,
        Duration::from_secs(config.reload_interval_secs),
    );

    let state = http::AppState {
        pipeline,
        repository,
        store,
        sink,
        transport,
        db_path: config.db_path.display().to_string(),
    };
    let http_addr = config.http_addr.clone();
    tokio::spawn(async move {
        if let Err(err) = http::serve(&http_addr, state).await {
            tracing::error!(error = %err, "http server exited");
        }
    });

    tracing::info!("tallyd ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("tallyd shutting down");

    Ok(())
}

/// Keep the in-memory repository consistent with enrollments made outside
/// this process. A failed reload keeps the previous snapshot and retries
/// at the next tick.
fn spawn_reload_task(
    store: Arc<IdentityStore>,
    repository: Arc<EncodingRepository>,
    dim: usize,
    every: Duration,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        // The first tick completes immediately; the boot load already ran.
        tick.tick().await;
        loop {
            tick.tick().await;
            match store.list_all(dim).await {
                Ok(identities) => repository.load(identities),
                Err(err) => tracing::warn!(
                    error = %err,
                    "scheduled reload failed; keeping previous snapshot"
                ),
            }
        }
    });
}
