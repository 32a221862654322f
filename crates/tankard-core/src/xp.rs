//! Asynchronous XP awards.
//!
//! Awards run on detached tasks so a client cancelling its request after
//! the domain operation succeeded cannot lose the side effect. Shutdown
//! waits for every outstanding award up to a bounded deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::ports::JobService;
use crate::{CoreError, Result};

/// Fire-and-forget XP orchestration over the job service.
pub struct XpAwarder {
    jobs: Arc<dyn JobService>,
    tracker: TaskTracker,
}

impl XpAwarder {
    pub fn new(jobs: Arc<dyn JobService>) -> Self {
        Self {
            jobs,
            tracker: TaskTracker::new(),
        }
    }

    /// Detach an award task. Failures are logged, never propagated.
    pub fn award(&self, user_id: Uuid, activity: &str, amount: i64) {
        let jobs = self.jobs.clone();
        let activity = activity.to_string();
        self.tracker.spawn(async move {
            if let Err(e) = jobs.award_xp(user_id, &activity, amount).await {
                tracing::error!(
                    user_id = %user_id,
                    activity = %activity,
                    amount,
                    error = %e,
                    "async xp award failed"
                );
            }
        });
    }

    /// Await all outstanding awards, or fail once `deadline` expires.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        self.tracker.close();
        tokio::time::timeout(deadline, self.tracker.wait())
            .await
            .map_err(|_| CoreError::ShutdownTimeout)
    }
}
