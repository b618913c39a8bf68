//! calsync worker
//!
//! Runs the vector-index consumer and, when a cron expression is configured,
//! the periodic calendar resync until interrupted.

mod context;

use anyhow::Context as _;
use calsync_infra::{config, init_tracing};
use tracing::{info, warn};

use crate::context::WorkerContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let config = config::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => info!(error = %err, "no .env file loaded"),
    }

    let mut ctx = WorkerContext::new(config).await.context("failed to build worker context")?;
    ctx.db.health_check().context("database health check failed")?;
    ctx.start().await.context("failed to start worker")?;
    info!(
        topic = %ctx.config.broker.topic,
        group_id = %ctx.config.broker.group_id,
        scheduler = ctx.sync_scheduler.is_some(),
        "calsync worker running"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    if let Err(err) = ctx.shutdown().await {
        warn!(error = %err, "shutdown did not complete cleanly");
        return Err(err.into());
    }
    info!("calsync worker stopped");
    Ok(())
}
