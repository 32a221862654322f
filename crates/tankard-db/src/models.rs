//! Row models and their domain conversions.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use tankard_core::{
    Gamble, GambleOpenedItem, GambleState, Inventory, InventorySlot, Item, LootboxBet,
    Participant, QualityLevel, User,
};

use crate::DbError;

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub platform: String,
    pub platform_id: String,
    pub username: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            platform: row.platform,
            platform_id: row.platform_id,
            username: row.username,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub internal_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub base_value: i64,
    pub content_types: Vec<String>,
    pub is_currency: bool,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            internal_name: row.internal_name,
            display_name: row.display_name,
            description: row.description,
            base_value: row.base_value,
            content_types: row.content_types,
            is_currency: row.is_currency,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct InventorySlotRow {
    pub item_id: i64,
    pub quantity: i64,
    pub quality: String,
}

impl InventorySlotRow {
    pub fn into_slot(self) -> Result<InventorySlot, DbError> {
        Ok(InventorySlot {
            item_id: self.item_id,
            quantity: self.quantity,
            quality: parse_quality(&self.quality)?,
        })
    }
}

pub fn rows_to_inventory(
    user_id: Uuid,
    rows: Vec<InventorySlotRow>,
) -> Result<Inventory, DbError> {
    let slots = rows
        .into_iter()
        .map(InventorySlotRow::into_slot)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Inventory { user_id, slots })
}

#[derive(Debug, FromRow)]
pub struct GambleRow {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub join_deadline: DateTime<Utc>,
}

impl GambleRow {
    pub fn into_gamble(self, participants: Vec<Participant>) -> Result<Gamble, DbError> {
        Ok(Gamble {
            id: self.id,
            initiator_id: self.initiator_id,
            state: parse_state(&self.state)?,
            created_at: self.created_at,
            join_deadline: self.join_deadline,
            participants,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ParticipantRow {
    pub gamble_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, FromRow)]
pub struct BetRow {
    pub user_id: Uuid,
    pub item_name: String,
    pub quantity: i64,
    pub quality: String,
}

impl BetRow {
    pub fn into_bet(self) -> Result<LootboxBet, DbError> {
        Ok(LootboxBet {
            item_name: self.item_name,
            quantity: self.quantity,
            quality: parse_quality(&self.quality)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct OpenedItemRow {
    pub gamble_id: Uuid,
    pub user_id: Uuid,
    pub item_id: i64,
    pub quantity: i64,
    pub value: i64,
    pub quality: String,
}

impl OpenedItemRow {
    pub fn into_opened(self) -> Result<GambleOpenedItem, DbError> {
        Ok(GambleOpenedItem {
            gamble_id: self.gamble_id,
            user_id: self.user_id,
            item_id: self.item_id,
            quantity: self.quantity,
            value: self.value,
            quality: parse_quality(&self.quality)?,
        })
    }
}

pub fn parse_quality(raw: &str) -> Result<QualityLevel, DbError> {
    raw.parse()
        .map_err(|e: String| DbError::Corrupt(format!("quality column: {e}")))
}

pub fn parse_state(raw: &str) -> Result<GambleState, DbError> {
    raw.parse()
        .map_err(|e: String| DbError::Corrupt(format!("state column: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_quality_is_reported() {
        assert!(matches!(parse_quality("shiny"), Err(DbError::Corrupt(_))));
        assert_eq!(parse_quality("epic").unwrap(), QualityLevel::Epic);
    }

    #[test]
    fn slot_rows_convert() {
        let inventory = rows_to_inventory(
            Uuid::new_v4(),
            vec![InventorySlotRow {
                item_id: 3,
                quantity: 4,
                quality: "rare".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(inventory.slots.len(), 1);
        assert_eq!(inventory.slots[0].quality, QualityLevel::Rare);
    }
}
