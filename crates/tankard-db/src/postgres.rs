//! PostgreSQL adapters for the core persistence ports.
//!
//! Concurrency guarantees live in the schema: a partial unique index
//! allows one gamble in a non-terminal state, participants are unique on
//! `(gamble_id, user_id)`, and execution ownership is taken with a
//! compare-and-swap update on the state column. Inventory reads inside a
//! transaction lock the owning rows.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use tankard_core::{
    CoreError, Gamble, GambleOpenedItem, GambleResult, GambleState, GambleStore, GambleTx,
    Inventory, Item, LootboxBet, Participant, StatsEvent, StatsStore, User,
};

use crate::error::is_unique_violation;
use crate::models::{
    rows_to_inventory, BetRow, GambleRow, InventorySlotRow, ItemRow, OpenedItemRow,
    ParticipantRow, UserRow,
};
use crate::DbError;

/// Store over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_participants(&self, gamble_id: Uuid) -> Result<Vec<Participant>, DbError> {
        let participant_rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT gamble_id, user_id, username
            FROM gamble_participants
            WHERE gamble_id = $1
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(gamble_id)
        .fetch_all(&self.pool)
        .await?;

        let bet_rows = sqlx::query_as::<_, BetRow>(
            r#"
            SELECT user_id, item_name, quantity, quality
            FROM gamble_bets
            WHERE gamble_id = $1
            ORDER BY user_id, bet_index
            "#,
        )
        .bind(gamble_id)
        .fetch_all(&self.pool)
        .await?;

        let mut bets_by_user: std::collections::HashMap<Uuid, Vec<LootboxBet>> =
            std::collections::HashMap::new();
        for row in bet_rows {
            let user_id = row.user_id;
            bets_by_user
                .entry(user_id)
                .or_default()
                .push(row.into_bet()?);
        }

        Ok(participant_rows
            .into_iter()
            .map(|row| Participant {
                gamble_id: row.gamble_id,
                user_id: row.user_id,
                username: row.username,
                bets: bets_by_user.remove(&row.user_id).unwrap_or_default(),
            })
            .collect())
    }

    async fn load_gamble(&self, row: GambleRow) -> Result<Gamble, DbError> {
        let participants = self.load_participants(row.id).await?;
        row.into_gamble(participants)
    }

    /// Audit view: every drop recorded during a gamble's execution.
    pub async fn get_opened_items(
        &self,
        gamble_id: Uuid,
    ) -> Result<Vec<GambleOpenedItem>, DbError> {
        let rows = sqlx::query_as::<_, OpenedItemRow>(
            r#"
            SELECT gamble_id, user_id, item_id, quantity, value, quality
            FROM gamble_opened_items
            WHERE gamble_id = $1
            ORDER BY user_id, item_id
            "#,
        )
        .bind(gamble_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OpenedItemRow::into_opened).collect()
    }
}

#[async_trait]
impl GambleStore for PgStore {
    async fn get_user_by_platform(
        &self,
        platform: &str,
        platform_id: &str,
    ) -> tankard_core::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, platform, platform_id, username FROM users WHERE platform = $1 AND platform_id = $2",
        )
        .bind(platform)
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(row.map(User::from))
    }

    async fn get_item_by_id(&self, id: i64) -> tankard_core::Result<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.map(Item::from))
    }

    async fn get_item_by_name(&self, internal_name: &str) -> tankard_core::Result<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE internal_name = $1")
            .bind(internal_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.map(Item::from))
    }

    async fn get_items_by_names(
        &self,
        internal_names: &[String],
    ) -> tankard_core::Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT * FROM items WHERE internal_name = ANY($1)",
        )
        .bind(internal_names)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn get_all_items(&self) -> tankard_core::Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>("SELECT * FROM items ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn get_gamble(&self, id: Uuid) -> tankard_core::Result<Option<Gamble>> {
        let row = sqlx::query_as::<_, GambleRow>("SELECT * FROM gambles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;

        match row {
            Some(row) => Ok(Some(self.load_gamble(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_active_gamble(&self) -> tankard_core::Result<Option<Gamble>> {
        let row = sqlx::query_as::<_, GambleRow>(
            "SELECT * FROM gambles WHERE state IN ('joining', 'opening') LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        match row {
            Some(row) => Ok(Some(self.load_gamble(row).await?)),
            None => Ok(None),
        }
    }

    async fn begin(&self) -> tankard_core::Result<Box<dyn GambleTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(Box::new(PgGambleTx { tx }))
    }
}

#[async_trait]
impl StatsStore for PgStore {
    async fn record(&self, event: StatsEvent) -> tankard_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stats_events (event_id, user_id, event_type, event_data, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.event_id)
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(&event.event_data)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }
}

/// One transaction over the gamble tables.
pub struct PgGambleTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl GambleTx for PgGambleTx {
    async fn get_inventory(&mut self, user_id: Uuid) -> tankard_core::Result<Inventory> {
        let rows = sqlx::query_as::<_, InventorySlotRow>(
            r#"
            SELECT item_id, quantity, quality
            FROM inventory_slots
            WHERE user_id = $1
            ORDER BY slot_index
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(DbError::from)?;

        Ok(rows_to_inventory(user_id, rows)?)
    }

    async fn update_inventory(
        &mut self,
        user_id: Uuid,
        inventory: &Inventory,
    ) -> tankard_core::Result<()> {
        sqlx::query("DELETE FROM inventory_slots WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        for (slot_index, slot) in inventory.slots.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO inventory_slots (user_id, slot_index, item_id, quantity, quality)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(user_id)
            .bind(slot_index as i32)
            .bind(slot.item_id)
            .bind(slot.quantity)
            .bind(slot.quality.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;
        }
        Ok(())
    }

    async fn create_gamble(&mut self, gamble: &Gamble) -> tankard_core::Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO gambles (id, initiator_id, state, created_at, join_deadline)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(gamble.id)
        .bind(gamble.initiator_id)
        .bind(gamble.state.as_str())
        .bind(gamble.created_at)
        .bind(gamble.join_deadline)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            // The one-active-gamble partial index tripped.
            Err(e) if is_unique_violation(&e) => Err(CoreError::GambleAlreadyActive),
            Err(e) => Err(DbError::from(e).into()),
        }
    }

    async fn join_gamble(&mut self, participant: &Participant) -> tankard_core::Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO gamble_participants (gamble_id, user_id, username, joined_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(participant.gamble_id)
        .bind(participant.user_id)
        .bind(&participant.username)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(CoreError::UserAlreadyJoined),
            Err(e) => return Err(DbError::from(e).into()),
        }

        for (bet_index, bet) in participant.bets.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO gamble_bets (gamble_id, user_id, bet_index, item_name, quantity, quality)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(participant.gamble_id)
            .bind(participant.user_id)
            .bind(bet_index as i32)
            .bind(&bet.item_name)
            .bind(bet.quantity)
            .bind(bet.quality.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;
        }
        Ok(())
    }

    async fn update_gamble_state_if_matches(
        &mut self,
        gamble_id: Uuid,
        expected: GambleState,
        new: GambleState,
    ) -> tankard_core::Result<u64> {
        let result = sqlx::query("UPDATE gambles SET state = $3 WHERE id = $1 AND state = $2")
            .bind(gamble_id)
            .bind(expected.as_str())
            .bind(new.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;
        Ok(result.rows_affected())
    }

    async fn save_opened_items(&mut self, items: &[GambleOpenedItem]) -> tankard_core::Result<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO gamble_opened_items (gamble_id, user_id, item_id, quantity, value, quality)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.gamble_id)
            .bind(item.user_id)
            .bind(item.item_id)
            .bind(item.quantity)
            .bind(item.value)
            .bind(item.quality.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;
        }
        Ok(())
    }

    async fn complete_gamble(&mut self, result: &GambleResult) -> tankard_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gamble_results (gamble_id, winner_id, total_value, created_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(result.gamble_id)
        .bind(result.winner_id)
        .bind(result.total_value)
        .execute(&mut *self.tx)
        .await
        .map_err(DbError::from)?;

        sqlx::query("UPDATE gambles SET state = $2 WHERE id = $1")
            .bind(result.gamble_id)
            .bind(GambleState::Completed.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> tankard_core::Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()).into())
    }

    async fn rollback(self: Box<Self>) -> tankard_core::Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()).into())
    }
}
