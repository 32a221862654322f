//! Ports driven by the engine, implemented by adapters.
//!
//! Persistence is any transactional store with row-level locking and
//! compare-and-swap updates; the traits here are the whole contract the
//! core relies on.

use async_trait::async_trait;
use uuid::Uuid;

use crate::gamble::{Gamble, GambleOpenedItem, GambleResult, GambleState, Participant};
use crate::item::{Inventory, Item, User};
use crate::quality::QualityLevel;
use crate::stats::StatsEvent;
use crate::Result;

/// A single drop out of a lootbox open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedItem {
    pub item_id: i64,
    pub item_name: String,
    pub quantity: i64,
    pub value: i64,
    pub quality: QualityLevel,
}

/// The loot generator contract. CPU-only; `input_quality` biases output
/// rarity upward.
pub trait LootboxOpener: Send + Sync {
    fn open(
        &self,
        lootbox_name: &str,
        quantity: i64,
        input_quality: QualityLevel,
    ) -> Result<Vec<DroppedItem>>;
}

/// Read-side persistence operations plus transaction entry.
#[async_trait]
pub trait GambleStore: Send + Sync {
    async fn get_user_by_platform(&self, platform: &str, platform_id: &str)
        -> Result<Option<User>>;

    async fn get_item_by_id(&self, id: i64) -> Result<Option<Item>>;

    async fn get_item_by_name(&self, internal_name: &str) -> Result<Option<Item>>;

    async fn get_items_by_names(&self, internal_names: &[String]) -> Result<Vec<Item>>;

    async fn get_all_items(&self) -> Result<Vec<Item>>;

    async fn get_gamble(&self, id: Uuid) -> Result<Option<Gamble>>;

    /// The gamble in `joining` or `opening` state, if any. A unique
    /// partial constraint guarantees there is at most one.
    async fn get_active_gamble(&self) -> Result<Option<Gamble>>;

    async fn begin(&self) -> Result<Box<dyn GambleTx>>;
}

/// Mutating operations inside one transaction. Inventory reads through
/// this trait hold the user's row until commit or rollback.
#[async_trait]
pub trait GambleTx: Send {
    async fn get_inventory(&mut self, user_id: Uuid) -> Result<Inventory>;

    async fn update_inventory(&mut self, user_id: Uuid, inventory: &Inventory) -> Result<()>;

    /// Fails with [`crate::CoreError::GambleAlreadyActive`] when another
    /// non-terminal gamble exists.
    async fn create_gamble(&mut self, gamble: &Gamble) -> Result<()>;

    /// Fails with [`crate::CoreError::UserAlreadyJoined`] on a
    /// `(gamble_id, user_id)` conflict.
    async fn join_gamble(&mut self, participant: &Participant) -> Result<()>;

    /// Compare-and-swap on the state column. Returns rows affected; 0
    /// means another worker won the transition.
    async fn update_gamble_state_if_matches(
        &mut self,
        gamble_id: Uuid,
        expected: GambleState,
        new: GambleState,
    ) -> Result<u64>;

    async fn save_opened_items(&mut self, items: &[GambleOpenedItem]) -> Result<()>;

    /// Persist the result row and move the gamble to `completed`.
    async fn complete_gamble(&mut self, result: &GambleResult) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Roll back and swallow the error. Stores may have already torn the
/// transaction down (connection loss, server-side abort); the caller's
/// original error is the one worth surfacing.
pub async fn rollback_quietly(tx: Box<dyn GambleTx>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback after failed operation returned an error");
    }
}

/// Append-only stats sink.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn record(&self, event: StatsEvent) -> Result<()>;
}

/// User-facing alias resolution for item names.
pub trait NameResolver: Send + Sync {
    /// Public alias to internal name; `None` when the alias is unknown.
    fn resolve_public_name(&self, public: &str) -> Option<String>;

    fn display_name(&self, internal: &str, quality: QualityLevel) -> String;

    fn reload(&self) -> Result<()>;
}

/// Progression gates and value modifiers sourced from an external service.
pub trait ProgressionService: Send + Sync {
    fn is_node_unlocked(&self, node_key: &str, min_level: u32) -> bool;

    fn modified_value(&self, feature_key: &str, base: f64) -> f64;
}

/// Job XP sink consumed by the async awarder.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn award_xp(&self, user_id: Uuid, activity: &str, amount: i64) -> Result<()>;
}
