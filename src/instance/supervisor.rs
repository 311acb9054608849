//! Tick loop supervision.
//!
//! The tick loop runs in its own task. If that task ever ends (it only can by
//! panicking), the supervisor first marks the instance not ready so peers stop
//! syncing with it, then applies the configured [`LoopFailurePolicy`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::config::LoopFailurePolicy;
use super::scheduler::{InstanceState, SyncInstance};

impl SyncInstance {
    /// Spawns the supervised tick loop and returns the supervisor's handle.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let instance = self.clone();
        tokio::spawn(async move { instance.supervise().await })
    }

    async fn supervise(self: Arc<Self>) {
        let mut restarts: u32 = 0;
        let mut backoff = match &self.config.failure_policy {
            LoopFailurePolicy::Restart { initial_backoff, .. } => *initial_backoff,
            LoopFailurePolicy::MarkUnhealthy => Duration::ZERO,
        };

        loop {
            let worker = tokio::spawn(self.clone().run_ticks());

            match worker.await {
                Ok(()) => tracing::error!("bug: sync loop returned"),
                Err(e) if e.is_panic() => tracing::error!("bug: sync loop panicked: {}", e),
                Err(e) => {
                    tracing::info!("Sync loop cancelled: {}", e);
                    return;
                }
            }

            self.readiness.mark_unhealthy();

            let LoopFailurePolicy::Restart {
                max_backoff,
                max_restarts,
                ..
            } = &self.config.failure_policy
            else {
                self.give_up();
                return;
            };

            if max_restarts.is_some_and(|max| restarts >= max) {
                tracing::error!("Sync loop failed {} time(s), not restarting again", restarts + 1);
                self.give_up();
                return;
            }

            restarts += 1;
            let jitter = Duration::from_millis(rand::random::<u64>() % 50);
            tracing::warn!("Restarting sync loop in {:?} (restart #{})", backoff + jitter, restarts);
            tokio::time::sleep(backoff + jitter).await;
            backoff = next_backoff(backoff, *max_backoff);
        }
    }

    fn give_up(&self) {
        self.readiness.mark_unhealthy();
        self.set_state(InstanceState::Unhealthy);
        tracing::error!("Instance is unhealthy and no longer synchronizing");
    }
}

pub(super) fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
