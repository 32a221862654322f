//! Shared harness for engine integration tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use tankard_core::ports::DroppedItem;
use tankard_core::{
    CoreError, EngineConfig, EventBus, GambleService, InventorySlot, Item, JobService,
    LootboxOpener, QualityLevel, RandomSource, ResilientPublisher, SequenceSource, StatsRecorder,
    StatsStore, User, XpAwarder,
};
use tankard_db::MemoryStore;

pub const PLATFORM: &str = "discord";
pub const LOOTBOX: &str = "lootbox_tier1";
pub const LOOTBOX_ID: i64 = 10;
pub const PRIZE_ID: i64 = 20;

/// Scripted loot opener: each `open` call pops the next prepared batch.
pub struct ScriptedLoot {
    batches: std::sync::Mutex<VecDeque<Vec<DroppedItem>>>,
}

impl ScriptedLoot {
    pub fn new(batches: impl IntoIterator<Item = Vec<DroppedItem>>) -> Self {
        Self {
            batches: std::sync::Mutex::new(batches.into_iter().collect()),
        }
    }
}

impl LootboxOpener for ScriptedLoot {
    fn open(
        &self,
        _lootbox_name: &str,
        _quantity: i64,
        _input_quality: QualityLevel,
    ) -> tankard_core::Result<Vec<DroppedItem>> {
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::Loot("script exhausted".to_string()))
    }
}

/// Opener that fails for every call.
pub struct BrokenLoot;

impl LootboxOpener for BrokenLoot {
    fn open(
        &self,
        lootbox_name: &str,
        _quantity: i64,
        _input_quality: QualityLevel,
    ) -> tankard_core::Result<Vec<DroppedItem>> {
        Err(CoreError::Loot(format!("no table for {lootbox_name}")))
    }
}

/// Records XP awards instead of levelling anything.
#[derive(Default)]
pub struct RecordingJobs {
    pub awards: Mutex<Vec<(Uuid, i64)>>,
}

#[async_trait]
impl JobService for RecordingJobs {
    async fn award_xp(&self, user_id: Uuid, _activity: &str, amount: i64) -> tankard_core::Result<()> {
        self.awards.lock().await.push((user_id, amount));
        Ok(())
    }
}

pub fn prize_drop(quantity: i64, value: i64) -> DroppedItem {
    DroppedItem {
        item_id: PRIZE_ID,
        item_name: "golden_chalice".to_string(),
        quantity,
        value,
        quality: QualityLevel::Common,
    }
}

pub struct Backend {
    pub store: MemoryStore,
    pub bus: Arc<EventBus>,
    pub publisher: Arc<ResilientPublisher>,
    pub jobs: Arc<RecordingJobs>,
    pub xp: Arc<XpAwarder>,
    pub service: GambleService,
}

impl Backend {
    pub async fn build(loot: Arc<dyn LootboxOpener>, rng: Arc<dyn RandomSource>) -> Self {
        Self::build_with_config(loot, rng, test_config()).await
    }

    pub async fn build_with_config(
        loot: Arc<dyn LootboxOpener>,
        rng: Arc<dyn RandomSource>,
        config: EngineConfig,
    ) -> Self {
        let store = MemoryStore::new();
        let bus = EventBus::new();
        let publisher = Arc::new(ResilientPublisher::new(
            bus.clone(),
            Arc::new(tankard_core::publisher::MemoryDeadLetter::default()),
        ));
        let jobs = Arc::new(RecordingJobs::default());
        let xp = Arc::new(XpAwarder::new(jobs.clone()));

        let stats: Arc<dyn StatsStore> = Arc::new(store.clone());
        StatsRecorder::subscribe_all(stats, &bus).await;

        let service = GambleService::new(
            Arc::new(store.clone()),
            loot,
            Arc::new(tankard_core::naming::AliasNameResolver::empty()),
            Arc::new(tankard_core::progression::StaticProgression::disabled()),
            bus.clone(),
            publisher.clone(),
            xp.clone(),
            rng,
            config,
        );

        seed_catalog(&store).await;

        Self {
            store,
            bus,
            publisher,
            jobs,
            xp,
            service,
        }
    }

    /// Seed a user holding `lootboxes` tier-1 boxes of the given quality.
    pub async fn seed_player(&self, name: &str, lootboxes: i64, quality: QualityLevel) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store
            .seed_user(User {
                id: user_id,
                platform: PLATFORM.to_string(),
                platform_id: name.to_string(),
                username: name.to_string(),
            })
            .await;
        if lootboxes > 0 {
            self.store
                .seed_inventory(
                    user_id,
                    vec![InventorySlot {
                        item_id: LOOTBOX_ID,
                        quantity: lootboxes,
                        quality,
                    }],
                )
                .await;
        }
        user_id
    }

    /// Settle all detached side effects so assertions see them.
    pub async fn quiesce(&self) {
        let deadline = std::time::Duration::from_secs(5);
        self.publisher.shutdown(deadline).await.unwrap();
        self.xp.shutdown(deadline).await.unwrap();
        self.bus.shutdown(deadline).await.unwrap();
    }
}

/// Short join window, generous grace: `execute` is allowed immediately
/// while `join` still has a real window.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        join_window_secs: 2,
        execution_grace_secs: 30,
        ..Default::default()
    }
}

pub fn no_rng() -> Arc<SequenceSource> {
    Arc::new(SequenceSource::new([]))
}

/// The fixed catalog every test runs against.
pub fn catalog_items() -> Vec<Item> {
    let item = |id: i64, name: &str, value: i64, tags: &[&str], currency: bool| Item {
        id,
        internal_name: name.to_string(),
        display_name: name.to_string(),
        description: None,
        base_value: value,
        content_types: tags.iter().map(|t| t.to_string()).collect(),
        is_currency: currency,
    };
    vec![
        item(1, "money", 1, &[], true),
        item(LOOTBOX_ID, LOOTBOX, 50, &["lootbox"], false),
        item(PRIZE_ID, "golden_chalice", 100, &["trinket"], false),
        item(30, "wooden_spoon", 2, &["trinket"], false),
    ]
}

async fn seed_catalog(store: &MemoryStore) {
    for item in catalog_items() {
        store.seed_item(item).await;
    }
}
