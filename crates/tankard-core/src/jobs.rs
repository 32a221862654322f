//! Job XP ledger.
//!
//! The shipped implementation keeps per-user activity totals in memory
//! and emits a `JobLevelUp` event whenever an award crosses a level
//! boundary. Level is `floor(sqrt(total / 100))`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::Event;
use crate::ports::JobService;
use crate::publisher::ResilientPublisher;
use crate::Result;

pub fn level_for_xp(total: i64) -> u32 {
    if total <= 0 {
        return 0;
    }
    ((total as f64) / 100.0).sqrt().floor() as u32
}

/// In-memory job service keyed by `(user, activity)`.
pub struct LevelingJobService {
    totals: RwLock<HashMap<(Uuid, String), i64>>,
    publisher: Arc<ResilientPublisher>,
}

impl LevelingJobService {
    pub fn new(publisher: Arc<ResilientPublisher>) -> Self {
        Self {
            totals: RwLock::new(HashMap::new()),
            publisher,
        }
    }

    pub async fn total_xp(&self, user_id: Uuid, activity: &str) -> i64 {
        self.totals
            .read()
            .await
            .get(&(user_id, activity.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobService for LevelingJobService {
    async fn award_xp(&self, user_id: Uuid, activity: &str, amount: i64) -> Result<()> {
        if amount <= 0 {
            return Ok(());
        }

        let (old_level, new_level) = {
            let mut totals = self.totals.write().await;
            let total = totals.entry((user_id, activity.to_string())).or_insert(0);
            let old_level = level_for_xp(*total);
            *total += amount;
            (old_level, level_for_xp(*total))
        };

        if new_level > old_level {
            tracing::info!(
                user_id = %user_id,
                activity,
                old_level,
                new_level,
                "job level up"
            );
            self.publisher
                .publish_with_retry(Event::job_level_up(user_id, activity, old_level, new_level));
        }
        Ok(())
    }
}
