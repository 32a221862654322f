//! Loot table configuration.
//!
//! A versioned JSON document declaring weighted item pools and the
//! lootboxes that draw from them. The constraints mirrored by
//! `configs/schemas/loot_tables.schema.json` are enforced here at load;
//! any violation is fatal.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::LootError;

pub const SUPPORTED_VERSION: &str = "2.0";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LootTablesConfig {
    pub version: String,
    pub pools: HashMap<String, PoolConfig>,
    pub lootboxes: HashMap<String, LootboxConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    pub items: Vec<PoolEntryConfig>,
}

/// One weighted pool line: exactly one of `item_name` or `item_type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolEntryConfig {
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    pub weight: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LootboxConfig {
    pub item_drop_rate: f64,
    pub fixed_money: MoneyRange,
    pub pools: Vec<PoolRefConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoneyRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolRefConfig {
    pub pool_name: String,
    pub weight: i64,
}

impl LootTablesConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LootError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LootError::Io(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, LootError> {
        let config: LootTablesConfig =
            serde_json::from_str(content).map_err(|e| LootError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LootError> {
        if self.version != SUPPORTED_VERSION {
            return Err(LootError::Schema(format!(
                "unsupported loot table version {:?}, expected {SUPPORTED_VERSION:?}",
                self.version
            )));
        }

        for (pool_name, pool) in &self.pools {
            if pool.items.is_empty() {
                return Err(LootError::EmptyPool(pool_name.clone()));
            }
            for entry in &pool.items {
                match (&entry.item_name, &entry.item_type) {
                    (Some(_), None) | (None, Some(_)) => {}
                    _ => {
                        return Err(LootError::Schema(format!(
                            "pool {pool_name:?}: entries need exactly one of item_name or item_type"
                        )))
                    }
                }
                if entry.weight <= 0 {
                    return Err(LootError::Schema(format!(
                        "pool {pool_name:?}: weights must be positive"
                    )));
                }
            }
        }

        for (box_name, lootbox) in &self.lootboxes {
            if !(0.0..=1.0).contains(&lootbox.item_drop_rate) {
                return Err(LootError::Schema(format!(
                    "lootbox {box_name:?}: item_drop_rate must be within [0, 1]"
                )));
            }
            if lootbox.fixed_money.min < 0 || lootbox.fixed_money.max < lootbox.fixed_money.min {
                return Err(LootError::Schema(format!(
                    "lootbox {box_name:?}: fixed_money range is invalid"
                )));
            }
            if lootbox.pools.is_empty() {
                return Err(LootError::Schema(format!(
                    "lootbox {box_name:?}: needs at least one pool reference"
                )));
            }
            for pool_ref in &lootbox.pools {
                if pool_ref.weight <= 0 {
                    return Err(LootError::Schema(format!(
                        "lootbox {box_name:?}: pool weights must be positive"
                    )));
                }
                if !self.pools.contains_key(&pool_ref.pool_name) {
                    return Err(LootError::UnknownPool {
                        lootbox: box_name.clone(),
                        pool: pool_ref.pool_name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "version": "2.0",
            "pools": {
                "weapons": {
                    "items": [
                        { "item_name": "rusty_sword", "weight": 80 },
                        { "item_type": "metal", "weight": 20 }
                    ]
                }
            },
            "lootboxes": {
                "lootbox_tier1": {
                    "item_drop_rate": 0.7,
                    "fixed_money": { "min": 5, "max": 20 },
                    "pools": [ { "pool_name": "weapons", "weight": 100 } ]
                }
            }
        }"#
    }

    #[test]
    fn parses_valid_config() {
        let config = LootTablesConfig::from_str(valid_json()).unwrap();
        assert_eq!(config.pools.len(), 1);
        assert_eq!(config.lootboxes.len(), 1);
    }

    #[test]
    fn rejects_wrong_version() {
        let json = valid_json().replace("2.0", "1.0");
        assert!(matches!(
            LootTablesConfig::from_str(&json),
            Err(LootError::Schema(_))
        ));
    }

    #[test]
    fn rejects_undefined_pool_reference() {
        let json = valid_json().replace("\"pool_name\": \"weapons\"", "\"pool_name\": \"armor\"");
        assert!(matches!(
            LootTablesConfig::from_str(&json),
            Err(LootError::UnknownPool { .. })
        ));
    }

    #[test]
    fn rejects_empty_pool() {
        let json = r#"{
            "version": "2.0",
            "pools": { "weapons": { "items": [] } },
            "lootboxes": {}
        }"#;
        assert!(matches!(
            LootTablesConfig::from_str(json),
            Err(LootError::EmptyPool(_))
        ));
    }

    #[test]
    fn rejects_entry_with_both_name_and_type() {
        let json = r#"{
            "version": "2.0",
            "pools": {
                "weapons": {
                    "items": [ { "item_name": "a", "item_type": "b", "weight": 1 } ]
                }
            },
            "lootboxes": {}
        }"#;
        assert!(matches!(
            LootTablesConfig::from_str(json),
            Err(LootError::Schema(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_drop_rate() {
        let json = valid_json().replace("0.7", "1.7");
        assert!(matches!(
            LootTablesConfig::from_str(&json),
            Err(LootError::Schema(_))
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let json = valid_json().replace("\"version\"", "\"bogus\": 1, \"version\"");
        assert!(matches!(
            LootTablesConfig::from_str(&json),
            Err(LootError::Parse(_))
        ));
    }
}
