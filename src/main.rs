mod config;
mod dispatch;
mod logging;
mod scheduler;
mod web;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::dispatch::HttpDispatchSink;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    logging::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ALERTSCHED_CONFIG").ok())
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = AppConfig::load(&config_path)?;

    let sink = Arc::new(HttpDispatchSink::new(config.dispatch.url.clone())?);
    let scheduler = Arc::new(Scheduler::new(config.scheduled_alert.clone(), sink).await?);
    scheduler.start().await?;

    let app = web::router(scheduler.clone());
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("status API listening on {addr}");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("status API server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    scheduler.stop().await;
    Ok(())
}
