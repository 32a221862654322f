//! Resilient, fire-and-forget event publication.
//!
//! Domain operations must never fail because an event could not be
//! delivered: publication is retried with exponential backoff on a
//! detached task, and events that exhaust their retries are appended to a
//! durable dead-letter log.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use crate::bus::EventBus;
use crate::events::Event;
use crate::{CoreError, Result};

/// A permanently undeliverable event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub failed_at: DateTime<Utc>,
    pub attempts: u32,
    pub event: Event,
}

/// Durable append-only sink for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn append(&self, record: DeadLetterRecord) -> Result<()>;
}

/// Dead letters as JSON lines in a file.
pub struct FileDeadLetter {
    path: PathBuf,
}

impl FileDeadLetter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DeadLetterSink for FileDeadLetter {
    async fn append(&self, record: DeadLetterRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| CoreError::Bus(format!("dead letter serialization: {e}")))?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CoreError::Bus(format!("dead letter open: {e}")))?;
        file.write_all(&line)
            .await
            .map_err(|e| CoreError::Bus(format!("dead letter write: {e}")))?;
        file.flush()
            .await
            .map_err(|e| CoreError::Bus(format!("dead letter flush: {e}")))?;
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryDeadLetter {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl MemoryDeadLetter {
    pub async fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetter {
    async fn append(&self, record: DeadLetterRecord) -> Result<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Retry schedule: exponential backoff from `base_delay`, doubling up to
/// `max_delay`, for at most `max_attempts` publishes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// Publishes through the bus with retries, dead-lettering on exhaustion.
pub struct ResilientPublisher {
    bus: Arc<EventBus>,
    sink: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
    tracker: TaskTracker,
}

impl ResilientPublisher {
    pub fn new(bus: Arc<EventBus>, sink: Arc<dyn DeadLetterSink>) -> Self {
        Self::with_policy(bus, sink, RetryPolicy::default())
    }

    pub fn with_policy(
        bus: Arc<EventBus>,
        sink: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            bus,
            sink,
            policy,
            tracker: TaskTracker::new(),
        }
    }

    /// Fire-and-forget publish. The retry loop runs detached from the
    /// caller, so request cancellation cannot lose the event.
    pub fn publish_with_retry(&self, event: Event) {
        let bus = self.bus.clone();
        let sink = self.sink.clone();
        let policy = self.policy.clone();

        self.tracker.spawn(async move {
            let event_type = event.event_type;
            for attempt in 1..=policy.max_attempts {
                match bus.publish(event.clone()) {
                    Ok(()) => return,
                    Err(e) if attempt == policy.max_attempts => {
                        tracing::error!(
                            event_type = ?event_type,
                            attempts = attempt,
                            error = %e,
                            "event publication exhausted retries, dead-lettering"
                        );
                    }
                    Err(e) => {
                        let delay = policy.delay_before(attempt);
                        tracing::warn!(
                            event_type = ?event_type,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "event publication failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            let record = DeadLetterRecord {
                failed_at: Utc::now(),
                attempts: policy.max_attempts,
                event,
            };
            if let Err(e) = sink.append(record).await {
                tracing::error!(event_type = ?event_type, error = %e, "dead letter append failed");
            }
        });
    }

    /// Wait for outstanding publishes up to `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        self.tracker.close();
        tokio::time::timeout(deadline, self.tracker.wait())
            .await
            .map_err(|_| CoreError::ShutdownTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::json;
    use uuid::Uuid;

    fn tiny_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::from_secs(2));
        assert_eq!(policy.delay_before(2), Duration::from_secs(4));
        assert_eq!(policy.delay_before(3), Duration::from_secs(8));
        assert_eq!(policy.delay_before(4), Duration::from_secs(16));
        assert_eq!(policy.delay_before(5), Duration::from_secs(32));
        assert_eq!(policy.delay_before(6), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn dead_letters_after_exhausted_retries() {
        let bus = EventBus::new();
        // Shutting the bus down makes every publish fail.
        bus.shutdown(Duration::from_secs(1)).await.unwrap();

        let sink = Arc::new(MemoryDeadLetter::default());
        let publisher = ResilientPublisher::with_policy(bus, sink.clone(), tiny_policy());

        let event = Event::sibling(EventType::SearchPerformed, Uuid::new_v4(), json!({}));
        publisher.publish_with_retry(event);
        publisher.shutdown(Duration::from_secs(5)).await.unwrap();

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attempts, 3);
        assert_eq!(records[0].event.event_type, EventType::SearchPerformed);
    }

    #[tokio::test]
    async fn successful_publish_leaves_no_dead_letters() {
        let bus = EventBus::new();
        let sink = Arc::new(MemoryDeadLetter::default());
        let publisher =
            ResilientPublisher::with_policy(bus.clone(), sink.clone(), tiny_policy());

        let event = Event::sibling(EventType::SearchPerformed, Uuid::new_v4(), json!({}));
        publisher.publish_with_retry(event);
        publisher.shutdown(Duration::from_secs(5)).await.unwrap();

        assert!(sink.records().await.is_empty());
        bus.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn file_sink_appends_json_lines() {
        let dir = std::env::temp_dir().join(format!("tankard-dl-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("dead_letters.jsonl");

        let sink = FileDeadLetter::new(&path);
        for _ in 0..2 {
            sink.append(DeadLetterRecord {
                failed_at: Utc::now(),
                attempts: 5,
                event: Event::sibling(EventType::ItemSold, Uuid::new_v4(), json!({})),
            })
            .await
            .unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: DeadLetterRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.attempts, 5);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
