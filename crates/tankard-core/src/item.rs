//! Item catalog records and user inventories.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quality::QualityLevel;

/// A catalog item. Seeded once, read-only inside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    /// Stable internal identifier, e.g. `lootbox_tier1`.
    pub internal_name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Nonnegative base value used for drop scoring.
    pub base_value: i64,
    /// Content-type tags, e.g. `["weapon", "metal"]`.
    #[serde(default)]
    pub content_types: Vec<String>,
    /// Currency items invert value semantics in the loot generator.
    #[serde(default)]
    pub is_currency: bool,
}

impl Item {
    pub fn has_type(&self, tag: &str) -> bool {
        self.content_types.iter().any(|t| t == tag)
    }
}

/// A registered player, keyed by chat platform identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub platform: String,
    pub platform_id: String,
    pub username: String,
}

/// One stack of a user's inventory. A slot never mixes quality levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub item_id: i64,
    pub quantity: i64,
    pub quality: QualityLevel,
}

/// Why a consume attempt failed; the engine attaches the item name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotShortage {
    Missing,
    Short { available: i64 },
}

/// An ordered sequence of slots owned by one user. Mutated only inside a
/// transaction that holds the user's row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub user_id: Uuid,
    pub slots: Vec<InventorySlot>,
}

impl Inventory {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            slots: Vec::new(),
        }
    }

    pub fn quantity_of(&self, item_id: i64) -> i64 {
        self.slots
            .iter()
            .filter(|s| s.item_id == item_id)
            .map(|s| s.quantity)
            .sum()
    }

    /// Remove `quantity` units of an item from its first matching slot,
    /// returning the slot's quality. Empty slots are dropped.
    pub fn consume(
        &mut self,
        item_id: i64,
        quantity: i64,
    ) -> std::result::Result<QualityLevel, SlotShortage> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.item_id == item_id)
            .ok_or(SlotShortage::Missing)?;

        let slot = &mut self.slots[idx];
        if slot.quantity < quantity {
            return Err(SlotShortage::Short {
                available: slot.quantity,
            });
        }

        let quality = slot.quality;
        slot.quantity -= quantity;
        if slot.quantity == 0 {
            self.slots.remove(idx);
        }
        Ok(quality)
    }

    /// Add units of an item, merging into the first slot with the same
    /// item and quality, otherwise appending a new slot.
    pub fn deposit(&mut self, item_id: i64, quantity: i64, quality: QualityLevel) {
        if quantity <= 0 {
            return;
        }
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.item_id == item_id && s.quality == quality)
        {
            slot.quantity += quantity;
            return;
        }
        self.slots.push(InventorySlot {
            item_id,
            quantity,
            quality,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(slots: Vec<InventorySlot>) -> Inventory {
        Inventory {
            user_id: Uuid::new_v4(),
            slots,
        }
    }

    #[test]
    fn consume_decrements_and_reports_quality() {
        let mut inventory = inv(vec![InventorySlot {
            item_id: 7,
            quantity: 5,
            quality: QualityLevel::Rare,
        }]);

        let quality = inventory.consume(7, 2).unwrap();
        assert_eq!(quality, QualityLevel::Rare);
        assert_eq!(inventory.quantity_of(7), 3);
    }

    #[test]
    fn consume_removes_emptied_slots() {
        let mut inventory = inv(vec![InventorySlot {
            item_id: 7,
            quantity: 2,
            quality: QualityLevel::Common,
        }]);

        inventory.consume(7, 2).unwrap();
        assert!(inventory.slots.is_empty());
    }

    #[test]
    fn consume_missing_item() {
        let mut inventory = inv(vec![]);
        assert_eq!(inventory.consume(1, 1), Err(SlotShortage::Missing));
    }

    #[test]
    fn consume_short_slot_is_untouched() {
        let mut inventory = inv(vec![InventorySlot {
            item_id: 7,
            quantity: 1,
            quality: QualityLevel::Common,
        }]);

        assert_eq!(
            inventory.consume(7, 3),
            Err(SlotShortage::Short { available: 1 })
        );
        assert_eq!(inventory.quantity_of(7), 1);
    }

    #[test]
    fn deposit_merges_same_quality_only() {
        let mut inventory = inv(vec![InventorySlot {
            item_id: 7,
            quantity: 1,
            quality: QualityLevel::Common,
        }]);

        inventory.deposit(7, 2, QualityLevel::Common);
        inventory.deposit(7, 1, QualityLevel::Epic);

        assert_eq!(inventory.slots.len(), 2);
        assert_eq!(inventory.slots[0].quantity, 3);
        assert_eq!(inventory.slots[1].quality, QualityLevel::Epic);
    }
}
