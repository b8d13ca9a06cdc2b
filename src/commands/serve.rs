use anyhow::Result;
use std::sync::Arc;

use trailgain::api::{self, AppState};
use trailgain::config::Config;
use trailgain::workers::build_group;

use super::Runtime;

/// Run the worker group and the control surface until Ctrl-C
pub async fn serve(config: Config) -> Result<()> {
    if let Err(e) = trailgain::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed, continuing without: {}", e);
    }

    let runtime = Runtime::build(&config)?;
    let group = Arc::new(build_group(
        &config,
        &runtime.stores,
        runtime.client.clone(),
        runtime.broker.clone(),
    ));

    let accounts = runtime.pool.usernames()?.len();
    if accounts == 0 {
        tracing::warn!("Account pool is empty; every cycle will fail until an account is added");
    }

    tracing::info!(
        workers = ?group.names(),
        accounts,
        autostart = config.workers.autostart,
        "Worker group ready"
    );

    if config.workers.autostart {
        group.start();
    }

    let state = AppState::new(group.clone(), runtime.stores, runtime.pool);
    api::serve(&config.server, state, shutdown_signal()).await?;

    tracing::info!("Waiting for workers to finish their current item");
    group.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
    }
}
