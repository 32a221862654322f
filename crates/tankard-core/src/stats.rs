//! Stats capture: translates bus events into append-only audit rows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::{EventBus, EventHandler};
use crate::events::{Event, EventType};
use crate::ports::StatsStore;
use crate::Result;

/// One append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsEvent {
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: EventType,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Subscriber that records every event it sees as a stats row. Pure
/// translation; it never interprets domain state.
pub struct StatsRecorder {
    store: Arc<dyn StatsStore>,
}

impl StatsRecorder {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self { store }
    }

    /// Subscribe one recorder to every event type the bus carries.
    pub async fn subscribe_all(store: Arc<dyn StatsStore>, bus: &EventBus) {
        let recorder: Arc<dyn EventHandler> = Arc::new(StatsRecorder::new(store));
        for event_type in EventType::ALL {
            bus.subscribe(event_type, recorder.clone()).await;
        }
    }
}

#[async_trait]
impl EventHandler for StatsRecorder {
    fn name(&self) -> &str {
        "stats-recorder"
    }

    async fn handle(&self, event: Event, _cancel: CancellationToken) -> Result<()> {
        let row = StatsEvent {
            event_id: Uuid::new_v4(),
            user_id: event.subject_user(),
            event_type: event.event_type,
            event_data: event.payload.clone(),
            created_at: Utc::now(),
        };
        self.store.record(row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ParticipationSource;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStats {
        rows: Mutex<Vec<StatsEvent>>,
    }

    #[async_trait]
    impl StatsStore for MemoryStats {
        async fn record(&self, event: StatsEvent) -> Result<()> {
            self.rows.lock().await.push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn records_participation_with_subject_user() {
        let store = Arc::new(MemoryStats::default());
        let recorder = StatsRecorder::new(store.clone());

        let user_id = Uuid::new_v4();
        let event =
            Event::gamble_participated(Uuid::new_v4(), user_id, 2, ParticipationSource::Join);
        recorder
            .handle(event, CancellationToken::new())
            .await
            .unwrap();

        let rows = store.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, Some(user_id));
        assert_eq!(rows[0].event_type, EventType::GambleParticipated);
        assert_eq!(rows[0].event_data["lootbox_count"], 2);
    }

    #[tokio::test]
    async fn subscribe_all_covers_every_type() {
        let bus = EventBus::new();
        let store = Arc::new(MemoryStats::default());
        StatsRecorder::subscribe_all(store.clone(), &bus).await;

        for event_type in EventType::ALL {
            bus.publish(Event::sibling(
                event_type,
                Uuid::new_v4(),
                serde_json::json!({}),
            ))
            .unwrap();
        }

        // Drain the bus so every handler invocation has run.
        bus.shutdown(std::time::Duration::from_secs(5))
            .await
            .unwrap();

        let rows = store.rows.lock().await;
        assert_eq!(rows.len(), EventType::ALL.len());
    }
}
