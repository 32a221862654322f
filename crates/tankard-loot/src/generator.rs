//! The lootbox generator.
//!
//! Per open: a gatekeeper roll decides item-or-money, a weighted pool
//! draw picks a pool, a weighted entry draw picks the item. Drops are
//! aggregated per distinct item so the whole batch shares one quality
//! roll per item, keeping result lines readable.

use std::collections::HashMap;
use std::sync::Arc;

use tankard_core::ports::{DroppedItem, LootboxOpener, ProgressionService};
use tankard_core::rng::RandomSource;
use tankard_core::{CoreError, Item, QualityLevel};

use crate::config::LootTablesConfig;
use crate::flatten::LootRuntime;
use crate::LootError;

/// Progression node gating the critical upgrade roll.
const CRIT_UPGRADE_NODE: &str = "feature_gamble";
const CRIT_UPGRADE_MIN_LEVEL: u32 = 1;
const CRIT_UPGRADE_CHANCE: f64 = 0.01;

/// Quality thresholds walked best-first; the first `r <= threshold + bonus`
/// wins, and a roll past `Junk` lands on `Cursed`.
const QUALITY_THRESHOLDS: [(QualityLevel, f64); 7] = [
    (QualityLevel::Legendary, 0.01),
    (QualityLevel::Epic, 0.05),
    (QualityLevel::Rare, 0.15),
    (QualityLevel::Uncommon, 0.30),
    (QualityLevel::Common, 0.70),
    (QualityLevel::Poor, 0.85),
    (QualityLevel::Junk, 0.95),
];

/// Upward threshold shift per tier of input quality above `Common`.
const INPUT_QUALITY_BONUS_STEP: f64 = 0.03;

/// Weighted random generator over the flattened loot runtime.
pub struct LootGenerator {
    runtime: LootRuntime,
    rng: Arc<dyn RandomSource>,
    progression: Arc<dyn ProgressionService>,
}

impl LootGenerator {
    pub fn new(
        config: &LootTablesConfig,
        catalog: &[Item],
        rng: Arc<dyn RandomSource>,
        progression: Arc<dyn ProgressionService>,
    ) -> Result<Self, LootError> {
        Ok(Self {
            runtime: LootRuntime::build(config, catalog)?,
            rng,
            progression,
        })
    }

    /// One quality roll for an aggregated drop line.
    fn roll_quality(&self, input_quality: QualityLevel) -> QualityLevel {
        let r = self.rng.next_f64();
        let bonus = INPUT_QUALITY_BONUS_STEP * input_quality.distance_from_common() as f64;

        for (tier, threshold) in QUALITY_THRESHOLDS {
            if r <= threshold + bonus {
                return self.maybe_crit_upgrade(tier);
            }
        }
        self.maybe_crit_upgrade(QualityLevel::Cursed)
    }

    fn maybe_crit_upgrade(&self, tier: QualityLevel) -> QualityLevel {
        if !self
            .progression
            .is_node_unlocked(CRIT_UPGRADE_NODE, CRIT_UPGRADE_MIN_LEVEL)
        {
            return tier;
        }
        if self.rng.next_f64() < CRIT_UPGRADE_CHANCE {
            tier.promote()
        } else {
            tier
        }
    }

    /// Consolation money for one failed gatekeeper roll. The jitter span
    /// widens as the drop rate falls, so boxes that rarely pay items pay
    /// fair money instead. Never less than 1.
    fn consolation_money(&self, min: i64, max: i64, item_drop_rate: f64) -> i64 {
        let u = self.rng.next_f64();
        let span = (max - min) as f64 * (1.0 + (1.0 - item_drop_rate));
        let amount = (min as f64 + u * span).floor() as i64;
        amount.max(1)
    }
}

impl LootboxOpener for LootGenerator {
    fn open(
        &self,
        lootbox_name: &str,
        quantity: i64,
        input_quality: QualityLevel,
    ) -> Result<Vec<DroppedItem>, CoreError> {
        let lootbox = self
            .runtime
            .lootbox(lootbox_name)
            .ok_or_else(|| CoreError::Loot(format!("unknown lootbox: {lootbox_name}")))?;

        // Aggregation keyed by item, preserving first-drop order.
        let mut order: Vec<Arc<Item>> = Vec::new();
        let mut counts: HashMap<i64, i64> = HashMap::new();
        let mut money_total: i64 = 0;

        for _ in 0..quantity {
            let gatekeeper = self.rng.next_f64();
            if gatekeeper >= lootbox.item_drop_rate {
                money_total += self.consolation_money(
                    lootbox.money_min,
                    lootbox.money_max,
                    lootbox.item_drop_rate,
                );
                continue;
            }

            let pool = self.runtime.pick_pool(lootbox, self.rng.next_f64());
            let item = pool.pick(self.rng.next_f64());

            let count = counts.entry(item.id).or_insert(0);
            if *count == 0 {
                order.push(item.clone());
            }
            *count += 1;
        }

        let mut drops = Vec::with_capacity(order.len() + 1);
        for item in order {
            let count = counts[&item.id];
            let quality = self.roll_quality(input_quality);

            if item.is_currency {
                // Currency inverts the semantics: the multiplier amplifies
                // the amount, and the stack itself stays common.
                let amplified = ((count as f64) * quality.multiplier()).floor().max(1.0) as i64;
                drops.push(DroppedItem {
                    item_id: item.id,
                    item_name: item.internal_name.clone(),
                    quantity: amplified,
                    value: item.base_value,
                    quality: QualityLevel::Common,
                });
            } else {
                let mut value = ((item.base_value as f64) * quality.multiplier()).floor() as i64;
                if item.base_value > 0 {
                    value = value.max(1);
                }
                drops.push(DroppedItem {
                    item_id: item.id,
                    item_name: item.internal_name.clone(),
                    quantity: count,
                    value,
                    quality,
                });
            }
        }

        if money_total > 0 {
            let money = self.runtime.money_item();
            drops.push(DroppedItem {
                item_id: money.id,
                item_name: money.internal_name.clone(),
                quantity: money_total,
                value: money.base_value,
                quality: QualityLevel::Common,
            });
        }

        Ok(drops)
    }
}
