//! Periodic pruning of the attempt ledger.
//!
//! Deletion is purely time-bounded, so the job can run alongside live logins.

use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::login::Authenticator;

/// Spawn the cleanup loop. The first pass runs immediately.
pub fn spawn_ledger_cleanup(auth: Arc<Authenticator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(auth.config().ledger_cleanup_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match auth.cleanup_ledger().await {
                Ok(removed) => info!(removed, "attempt ledger cleanup finished"),
                Err(err) => error!("attempt ledger cleanup failed: {err}"),
            }
        }
    })
}
