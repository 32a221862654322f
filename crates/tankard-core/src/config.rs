//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Tunables for the gamble engine. All fields have production defaults so
/// a partial TOML table is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long the lobby accepts joiners after `start`.
    #[serde(default = "default_join_window_secs")]
    pub join_window_secs: u64,
    /// Clock-skew allowance when deciding whether the deadline passed.
    #[serde(default = "default_execution_grace_secs")]
    pub execution_grace_secs: u64,
    /// Upper bound on a single bet's quantity.
    #[serde(default = "default_max_transaction_quantity")]
    pub max_transaction_quantity: i64,
    /// Internal-name prefix identifying wagerable items.
    #[serde(default = "default_lootbox_prefix")]
    pub lootbox_prefix: String,
    /// A loser this close to the winner is a near miss.
    #[serde(default = "default_near_miss_ratio")]
    pub near_miss_ratio: f64,
    /// Scoring at or below this share of the mean is a critical failure.
    #[serde(default = "default_crit_fail_ratio")]
    pub crit_fail_ratio: f64,
    /// XP awarded per lootbox wagered once a gamble completes.
    #[serde(default = "default_xp_per_lootbox")]
    pub xp_per_lootbox: i64,
}

fn default_join_window_secs() -> u64 {
    60
}

fn default_execution_grace_secs() -> u64 {
    5
}

fn default_max_transaction_quantity() -> i64 {
    100
}

fn default_lootbox_prefix() -> String {
    "lootbox_".to_string()
}

fn default_near_miss_ratio() -> f64 {
    0.95
}

fn default_crit_fail_ratio() -> f64 {
    0.20
}

fn default_xp_per_lootbox() -> i64 {
    25
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            join_window_secs: default_join_window_secs(),
            execution_grace_secs: default_execution_grace_secs(),
            max_transaction_quantity: default_max_transaction_quantity(),
            lootbox_prefix: default_lootbox_prefix(),
            near_miss_ratio: default_near_miss_ratio(),
            crit_fail_ratio: default_crit_fail_ratio(),
            xp_per_lootbox: default_xp_per_lootbox(),
        }
    }
}

impl EngineConfig {
    pub fn join_window(&self) -> Duration {
        Duration::from_secs(self.join_window_secs)
    }

    pub fn execution_grace(&self) -> Duration {
        Duration::from_secs(self.execution_grace_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_transaction_quantity <= 0 {
            return Err(CoreError::Config(
                "max_transaction_quantity must be positive".to_string(),
            ));
        }
        if self.lootbox_prefix.is_empty() {
            return Err(CoreError::Config(
                "lootbox_prefix must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.near_miss_ratio) {
            return Err(CoreError::Config(
                "near_miss_ratio must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.crit_fail_ratio) {
            return Err(CoreError::Config(
                "crit_fail_ratio must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
