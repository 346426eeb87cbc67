//! Stale-group cleanup. Waiting groups that sat around too long with no
//! heartbeat are dissolved so their members can match again. Runs on a
//! timer, before membership reads, and on demand via the reap endpoint.

use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::store::GroupStore;

pub async fn reap_once(store: &dyn GroupStore, config: &Config) -> Result<u64, AppError> {
    store
        .reap_stale(config.stale_group_age(), config.participant_idle_age())
        .await
}

/// Periodic sweep; spawned once at startup.
pub async fn run_periodic(store: Arc<dyn GroupStore>, config: Config) {
    let mut ticker = tokio::time::interval(config.reaper_interval());
    // The first tick fires immediately; skip it so startup stays quiet.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match reap_once(store.as_ref(), &config).await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "reaper dissolved stale groups"),
            Err(e) => tracing::error!(error = %e, "reaper sweep failed"),
        }
    }
}
