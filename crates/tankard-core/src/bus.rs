//! In-process event fan-out.
//!
//! Publishers hand events to a bounded queue and return immediately; a
//! dispatcher task fans each event out to every handler registered for
//! its type, one spawned task per handler. Handler tasks run under the
//! bus's cancellation domain, never the publisher's.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::events::{Event, EventType};
use crate::{CoreError, Result};

/// Default bound on the publish queue.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A subscriber. Failures are logged and never affect other handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in delivery logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: Event, cancel: CancellationToken) -> Result<()>;
}

type HandlerMap = HashMap<EventType, Vec<Arc<dyn EventHandler>>>;

enum BusMessage {
    Deliver(Event),
    /// Everything queued before this marker still gets delivered.
    Drain,
}

/// The fan-out bus.
pub struct EventBus {
    tx: mpsc::Sender<BusMessage>,
    handlers: Arc<RwLock<HandlerMap>>,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity);
        let handlers: Arc<RwLock<HandlerMap>> = Arc::new(RwLock::new(HashMap::new()));
        let root = CancellationToken::new();
        let tracker = TaskTracker::new();

        let bus = Arc::new(Self {
            tx,
            handlers: handlers.clone(),
            root: root.clone(),
            tracker: tracker.clone(),
        });

        tracker.spawn(dispatch_loop(rx, handlers, root, tracker.clone()));
        bus
    }

    /// Register a handler for one event type.
    pub async fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Enqueue an event for delivery. Does not wait for handlers; fails
    /// only when the queue is full or the bus is shut down.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.tx
            .try_send(BusMessage::Deliver(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    CoreError::Bus("publish queue is full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    CoreError::Bus("bus is shut down".to_string())
                }
            })
    }

    /// Deliver everything already queued, then stop. Handlers still
    /// running when `deadline` elapses are cancelled.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        // A second shutdown finds the dispatcher gone; that is fine.
        let _ = self.tx.send(BusMessage::Drain).await;
        self.tracker.close();

        match tokio::time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.root.cancel();
                Err(CoreError::ShutdownTimeout)
            }
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<BusMessage>,
    handlers: Arc<RwLock<HandlerMap>>,
    root: CancellationToken,
    tracker: TaskTracker,
) {
    while let Some(message) = rx.recv().await {
        let event = match message {
            BusMessage::Deliver(event) => event,
            BusMessage::Drain => break,
        };

        let registered: Vec<Arc<dyn EventHandler>> = handlers
            .read()
            .await
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for handler in registered {
            let event = event.clone();
            let cancel = root.child_token();
            tracker.spawn(async move {
                let event_type = event.event_type;
                if let Err(e) = handler.handle(event, cancel).await {
                    tracing::error!(
                        handler = handler.name(),
                        event_type = ?event_type,
                        error = %e,
                        "event handler failed"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    struct Recorder {
        tx: mpsc::UnboundedSender<Event>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn handle(&self, event: Event, _cancel: CancellationToken) -> Result<()> {
            let _ = self.tx.send(event);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: Event, _cancel: CancellationToken) -> Result<()> {
            Err(CoreError::Bus("boom".to_string()))
        }
    }

    fn sold_event() -> Event {
        Event::sibling(EventType::ItemSold, Uuid::new_v4(), json!({ "price": 3 }))
    }

    #[tokio::test]
    async fn delivers_to_registered_handler() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(EventType::ItemSold, Arc::new(Recorder { tx }))
            .await;

        bus.publish(sold_event()).unwrap();

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.event_type, EventType::ItemSold);
    }

    #[tokio::test]
    async fn handler_failure_does_not_stop_others() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(EventType::ItemSold, Arc::new(Failing)).await;
        bus.subscribe(EventType::ItemSold, Arc::new(Recorder { tx }))
            .await;

        bus.publish(sold_event()).unwrap();

        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unrelated_event_types_are_not_delivered() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(EventType::ItemBought, Arc::new(Recorder { tx }))
            .await;

        bus.publish(sold_event()).unwrap();
        bus.shutdown(Duration::from_secs(5)).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events_first() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(EventType::ItemSold, Arc::new(Recorder { tx }))
            .await;

        for _ in 0..10 {
            bus.publish(sold_event()).unwrap();
        }
        bus.shutdown(Duration::from_secs(5)).await.unwrap();

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 10);
    }

    #[tokio::test]
    async fn publish_after_shutdown_fails() {
        let bus = EventBus::new();
        bus.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(bus.publish(sold_event()).is_err());
    }
}
