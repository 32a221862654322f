//! Runtime expansion of the loot config.
//!
//! Built once at startup from the config plus the item catalog, read-only
//! afterwards: every pool becomes a cumulative-weight table over concrete
//! catalog items, and every lootbox carries a cumulative table over its
//! pools. Selection is a uniform draw plus binary search.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tankard_core::Item;

use crate::config::LootTablesConfig;
use crate::LootError;

#[derive(Debug, Clone)]
pub struct FlattenedEntry {
    pub cumulative_weight: i64,
    pub item: Arc<Item>,
}

#[derive(Debug, Clone)]
pub struct FlattenedPool {
    pub name: String,
    pub total_weight: i64,
    /// Ascending in cumulative weight.
    pub entries: Vec<FlattenedEntry>,
}

impl FlattenedPool {
    pub fn pick(&self, u: f64) -> &Arc<Item> {
        let target = u * self.total_weight as f64;
        let idx = self
            .entries
            .partition_point(|e| (e.cumulative_weight as f64) <= target);
        let idx = idx.min(self.entries.len() - 1);
        &self.entries[idx].item
    }
}

#[derive(Debug, Clone)]
struct PoolRef {
    cumulative_weight: i64,
    pool_index: usize,
}

#[derive(Debug, Clone)]
pub struct FlattenedLootbox {
    pub name: String,
    pub item_drop_rate: f64,
    pub money_min: i64,
    pub money_max: i64,
    total_pool_weight: i64,
    pool_refs: Vec<PoolRef>,
}

/// The immutable loot runtime shared by all workers.
#[derive(Debug, Clone)]
pub struct LootRuntime {
    pools: Vec<FlattenedPool>,
    lootboxes: HashMap<String, FlattenedLootbox>,
    money_item: Arc<Item>,
}

impl LootRuntime {
    /// Expand `config` against the item catalog. Undefined references
    /// and empty expansions are fatal; catalog items no pool ever drops
    /// (currency aside) only warn.
    pub fn build(config: &LootTablesConfig, catalog: &[Item]) -> Result<Self, LootError> {
        let items: Vec<Arc<Item>> = catalog.iter().cloned().map(Arc::new).collect();

        let by_name: HashMap<&str, &Arc<Item>> = items
            .iter()
            .map(|item| (item.internal_name.as_str(), item))
            .collect();

        let money_item = items
            .iter()
            .filter(|item| item.is_currency)
            .min_by_key(|item| item.id)
            .cloned()
            .ok_or(LootError::MissingCurrencyItem)?;

        let mut pool_names: Vec<&String> = config.pools.keys().collect();
        pool_names.sort();

        let mut pools = Vec::with_capacity(pool_names.len());
        let mut pool_index: HashMap<&str, usize> = HashMap::new();
        let mut referenced: HashSet<i64> = HashSet::new();

        for pool_name in pool_names {
            let pool_config = &config.pools[pool_name];
            let mut cumulative = 0i64;
            let mut entries = Vec::new();

            for entry in &pool_config.items {
                let expanded: Vec<&Arc<Item>> = if let Some(name) = &entry.item_name {
                    let item = by_name.get(name.as_str()).ok_or_else(|| {
                        LootError::UnresolvedEntry {
                            pool: pool_name.clone(),
                            entry: name.clone(),
                        }
                    })?;
                    vec![item]
                } else if let Some(tag) = &entry.item_type {
                    let tagged: Vec<&Arc<Item>> =
                        items.iter().filter(|item| item.has_type(tag)).collect();
                    if tagged.is_empty() {
                        return Err(LootError::UnresolvedEntry {
                            pool: pool_name.clone(),
                            entry: format!("type:{tag}"),
                        });
                    }
                    tagged
                } else {
                    // Unreachable past config validation.
                    return Err(LootError::Schema(format!(
                        "pool {pool_name:?}: entry without item_name or item_type"
                    )));
                };

                for item in expanded {
                    cumulative += entry.weight;
                    referenced.insert(item.id);
                    entries.push(FlattenedEntry {
                        cumulative_weight: cumulative,
                        item: (*item).clone(),
                    });
                }
            }

            pool_index.insert(pool_name.as_str(), pools.len());
            pools.push(FlattenedPool {
                name: pool_name.clone(),
                total_weight: cumulative,
                entries,
            });
        }

        for item in &items {
            if !item.is_currency && !referenced.contains(&item.id) {
                tracing::warn!(
                    item = %item.internal_name,
                    item_id = item.id,
                    "catalog item is not referenced by any loot pool"
                );
            }
        }

        let mut lootboxes = HashMap::with_capacity(config.lootboxes.len());
        for (box_name, box_config) in &config.lootboxes {
            let mut cumulative = 0i64;
            let mut pool_refs = Vec::with_capacity(box_config.pools.len());
            for pool_ref in &box_config.pools {
                cumulative += pool_ref.weight;
                pool_refs.push(PoolRef {
                    cumulative_weight: cumulative,
                    pool_index: pool_index[pool_ref.pool_name.as_str()],
                });
            }
            lootboxes.insert(
                box_name.clone(),
                FlattenedLootbox {
                    name: box_name.clone(),
                    item_drop_rate: box_config.item_drop_rate,
                    money_min: box_config.fixed_money.min,
                    money_max: box_config.fixed_money.max,
                    total_pool_weight: cumulative,
                    pool_refs,
                },
            );
        }

        Ok(Self {
            pools,
            lootboxes,
            money_item,
        })
    }

    pub fn lootbox(&self, name: &str) -> Option<&FlattenedLootbox> {
        self.lootboxes.get(name)
    }

    pub fn money_item(&self) -> &Arc<Item> {
        &self.money_item
    }

    pub fn pick_pool(&self, lootbox: &FlattenedLootbox, u: f64) -> &FlattenedPool {
        let target = u * lootbox.total_pool_weight as f64;
        let idx = lootbox
            .pool_refs
            .partition_point(|r| (r.cumulative_weight as f64) <= target);
        let idx = idx.min(lootbox.pool_refs.len() - 1);
        &self.pools[lootbox.pool_refs[idx].pool_index]
    }
}
