//! Static progression adapter.
//!
//! Production deployments point this at whatever progression service the
//! platform runs; the shipped implementation reads unlocked node levels
//! and per-feature multipliers from configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ports::ProgressionService;

/// Node key gating the loot generator's critical upgrade.
pub const NODE_FEATURE_GAMBLE: &str = "feature_gamble";
/// Feature key the gamble engine consults when scoring drops.
pub const FEATURE_GAMBLE_WIN_BONUS: &str = "gamble_win_bonus";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// node key -> unlocked level
    #[serde(default)]
    pub nodes: HashMap<String, u32>,
    /// feature key -> value multiplier
    #[serde(default)]
    pub modifiers: HashMap<String, f64>,
}

/// Config-backed progression: a node is unlocked when its configured
/// level meets the requested minimum; unknown features pass values
/// through unchanged.
pub struct StaticProgression {
    config: ProgressionConfig,
}

impl StaticProgression {
    pub fn new(config: ProgressionConfig) -> Self {
        Self { config }
    }

    /// Everything locked, nothing modified.
    pub fn disabled() -> Self {
        Self::new(ProgressionConfig::default())
    }
}

impl ProgressionService for StaticProgression {
    fn is_node_unlocked(&self, node_key: &str, min_level: u32) -> bool {
        self.config
            .nodes
            .get(node_key)
            .is_some_and(|level| *level >= min_level)
    }

    fn modified_value(&self, feature_key: &str, base: f64) -> f64 {
        match self.config.modifiers.get(feature_key) {
            Some(multiplier) => base * multiplier,
            None => base,
        }
    }
}
