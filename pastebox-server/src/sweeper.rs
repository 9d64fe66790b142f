//! Background eviction of expired documents
//!
//! Reads already ignore expired rows; the sweeper only reclaims their
//! storage. Failures are logged and retried on the next tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::DocumentStore;

/// Running sweeper task. Dropping the handle stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the task and wait for it to wind down.
    pub async fn stop(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sweep expired rows every `interval`, starting immediately.
pub fn spawn(store: DocumentStore, interval: Duration) -> SweeperHandle {
    tracing::info!(interval_secs = interval.as_secs(), "Starting expired-document sweeper");

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Swept expired documents"),
                Err(e) => tracing::warn!(error = %e, "Sweep failed"),
            }
        }
    });

    SweeperHandle { task }
}
