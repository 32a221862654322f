//! In-memory store.
//!
//! Backs the integration suites and local development. A transaction
//! takes the whole-store mutex for its lifetime, which makes every
//! transaction serializable; a snapshot taken at begin restores the
//! state on rollback. Uniqueness and compare-and-swap semantics match
//! the PostgreSQL schema.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use tankard_core::{
    CoreError, Gamble, GambleOpenedItem, GambleResult, GambleState, GambleStore, GambleTx,
    Inventory, InventorySlot, Item, Participant, StatsEvent, StatsStore, User,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    items: Vec<Item>,
    inventories: HashMap<Uuid, Inventory>,
    gambles: HashMap<Uuid, Gamble>,
    opened_items: Vec<GambleOpenedItem>,
    results: HashMap<Uuid, GambleResult>,
    stats: Vec<StatsEvent>,
}

/// Store holding everything behind one async mutex.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, user: User) {
        self.state.lock().await.users.push(user);
    }

    pub async fn seed_item(&self, item: Item) {
        self.state.lock().await.items.push(item);
    }

    pub async fn seed_inventory(&self, user_id: Uuid, slots: Vec<InventorySlot>) {
        self.state
            .lock()
            .await
            .inventories
            .insert(user_id, Inventory { user_id, slots });
    }

    pub async fn inventory_of(&self, user_id: Uuid) -> Inventory {
        self.state
            .lock()
            .await
            .inventories
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Inventory::empty(user_id))
    }

    pub async fn opened_items(&self) -> Vec<GambleOpenedItem> {
        self.state.lock().await.opened_items.clone()
    }

    pub async fn result_of(&self, gamble_id: Uuid) -> Option<GambleResult> {
        self.state.lock().await.results.get(&gamble_id).cloned()
    }

    pub async fn stats_events(&self) -> Vec<StatsEvent> {
        self.state.lock().await.stats.clone()
    }

    pub async fn gamble_state(&self, gamble_id: Uuid) -> Option<GambleState> {
        self.state
            .lock()
            .await
            .gambles
            .get(&gamble_id)
            .map(|g| g.state)
    }
}

#[async_trait]
impl GambleStore for MemoryStore {
    async fn get_user_by_platform(
        &self,
        platform: &str,
        platform_id: &str,
    ) -> tankard_core::Result<Option<User>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .iter()
            .find(|u| u.platform == platform && u.platform_id == platform_id)
            .cloned())
    }

    async fn get_item_by_id(&self, id: i64) -> tankard_core::Result<Option<Item>> {
        Ok(self
            .state
            .lock()
            .await
            .items
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn get_item_by_name(&self, internal_name: &str) -> tankard_core::Result<Option<Item>> {
        Ok(self
            .state
            .lock()
            .await
            .items
            .iter()
            .find(|i| i.internal_name == internal_name)
            .cloned())
    }

    async fn get_items_by_names(
        &self,
        internal_names: &[String],
    ) -> tankard_core::Result<Vec<Item>> {
        Ok(self
            .state
            .lock()
            .await
            .items
            .iter()
            .filter(|i| internal_names.contains(&i.internal_name))
            .cloned()
            .collect())
    }

    async fn get_all_items(&self) -> tankard_core::Result<Vec<Item>> {
        Ok(self.state.lock().await.items.clone())
    }

    async fn get_gamble(&self, id: Uuid) -> tankard_core::Result<Option<Gamble>> {
        Ok(self.state.lock().await.gambles.get(&id).cloned())
    }

    async fn get_active_gamble(&self) -> tankard_core::Result<Option<Gamble>> {
        Ok(self
            .state
            .lock()
            .await
            .gambles
            .values()
            .find(|g| g.state.is_active())
            .cloned())
    }

    async fn begin(&self) -> tankard_core::Result<Box<dyn GambleTx>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx { guard, snapshot }))
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn record(&self, event: StatsEvent) -> tankard_core::Result<()> {
        self.state.lock().await.stats.push(event);
        Ok(())
    }
}

/// Serializable transaction: owns the store lock until commit/rollback.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: MemoryState,
}

#[async_trait]
impl GambleTx for MemoryTx {
    async fn get_inventory(&mut self, user_id: Uuid) -> tankard_core::Result<Inventory> {
        Ok(self
            .guard
            .inventories
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Inventory::empty(user_id)))
    }

    async fn update_inventory(
        &mut self,
        user_id: Uuid,
        inventory: &Inventory,
    ) -> tankard_core::Result<()> {
        self.guard.inventories.insert(user_id, inventory.clone());
        Ok(())
    }

    async fn create_gamble(&mut self, gamble: &Gamble) -> tankard_core::Result<()> {
        if self.guard.gambles.values().any(|g| g.state.is_active()) {
            return Err(CoreError::GambleAlreadyActive);
        }
        let mut stored = gamble.clone();
        stored.participants = Vec::new();
        self.guard.gambles.insert(stored.id, stored);
        Ok(())
    }

    async fn join_gamble(&mut self, participant: &Participant) -> tankard_core::Result<()> {
        let gamble = self
            .guard
            .gambles
            .get_mut(&participant.gamble_id)
            .ok_or(CoreError::GambleNotFound(participant.gamble_id))?;
        if gamble
            .participants
            .iter()
            .any(|p| p.user_id == participant.user_id)
        {
            return Err(CoreError::UserAlreadyJoined);
        }
        gamble.participants.push(participant.clone());
        Ok(())
    }

    async fn update_gamble_state_if_matches(
        &mut self,
        gamble_id: Uuid,
        expected: GambleState,
        new: GambleState,
    ) -> tankard_core::Result<u64> {
        match self.guard.gambles.get_mut(&gamble_id) {
            Some(gamble) if gamble.state == expected => {
                gamble.state = new;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn save_opened_items(&mut self, items: &[GambleOpenedItem]) -> tankard_core::Result<()> {
        self.guard.opened_items.extend_from_slice(items);
        Ok(())
    }

    async fn complete_gamble(&mut self, result: &GambleResult) -> tankard_core::Result<()> {
        if self.guard.results.contains_key(&result.gamble_id) {
            return Err(CoreError::Storage(
                "gamble result already recorded".to_string(),
            ));
        }
        let gamble = self
            .guard
            .gambles
            .get_mut(&result.gamble_id)
            .ok_or(CoreError::GambleNotFound(result.gamble_id))?;
        gamble.state = GambleState::Completed;
        self.guard.results.insert(result.gamble_id, result.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> tankard_core::Result<()> {
        // Mutations were applied in place; dropping the guard publishes
        // them.
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> tankard_core::Result<()> {
        let MemoryTx {
            mut guard,
            snapshot,
        } = *self;
        *guard = snapshot;
        Ok(())
    }
}
