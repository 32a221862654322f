//! Deadline polling.
//!
//! Sweeps the active gamble on an interval and executes it once its join
//! deadline plus the configured grace period has passed; the grace keeps
//! the poller from racing clients whose clocks run slightly behind.
//! Losing an execution race is a quiet outcome; anything else is logged
//! and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use tankard_core::{CoreError, GambleService, GambleState, GambleStore};

pub struct DeadlinePoller {
    store: Arc<dyn GambleStore>,
    service: Arc<GambleService>,
    interval: Duration,
    grace: chrono::Duration,
    shutdown: CancellationToken,
}

impl DeadlinePoller {
    pub fn new(
        store: Arc<dyn GambleStore>,
        service: Arc<GambleService>,
        interval: Duration,
        grace: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            service,
            interval,
            grace: chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero()),
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }
        tracing::info!("deadline poller stopped");
    }

    async fn sweep(&self) {
        let gamble = match self.store.get_active_gamble().await {
            Ok(Some(gamble)) => gamble,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "deadline sweep failed to load active gamble");
                return;
            }
        };

        if gamble.state != GambleState::Joining
            || Utc::now() < gamble.join_deadline + self.grace
        {
            return;
        }

        match self.service.execute(gamble.id).await {
            Ok(Some(result)) => {
                tracing::info!(
                    gamble_id = %gamble.id,
                    winner = ?result.winner_id,
                    total_value = result.total_value,
                    "expired gamble executed"
                );
            }
            // Someone else settled it, or it is no longer due.
            Ok(None) => {}
            Err(CoreError::GambleAlreadyExecuted) | Err(CoreError::JoinWindowOpen) => {}
            Err(e) => {
                tracing::warn!(gamble_id = %gamble.id, error = %e, "gamble execution failed");
            }
        }
    }
}
