//! Rarity tiers carried by inventory stacks, bets, and drops.

use serde::{Deserialize, Serialize};

/// Rarity tier of an item stack. The derived ordering is the domain
/// ordering: `Cursed` is the worst outcome, `Legendary` the best.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Cursed,
    Junk,
    Poor,
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl QualityLevel {
    /// All tiers in ascending order.
    pub const ALL: [QualityLevel; 8] = [
        QualityLevel::Cursed,
        QualityLevel::Junk,
        QualityLevel::Poor,
        QualityLevel::Common,
        QualityLevel::Uncommon,
        QualityLevel::Rare,
        QualityLevel::Epic,
        QualityLevel::Legendary,
    ];

    /// Signed tier distance from `Common`: +1 per tier above, -1 per tier below.
    pub fn distance_from_common(self) -> i32 {
        self as i32 - QualityLevel::Common as i32
    }

    /// Value multiplier, geometric in the distance from `Common`.
    pub fn multiplier(self) -> f64 {
        let d = self.distance_from_common();
        if d >= 0 {
            2f64.powi(d)
        } else {
            0.5f64.powi(-d)
        }
    }

    /// The next tier up. `Legendary` has nowhere to go.
    pub fn promote(self) -> QualityLevel {
        match self {
            QualityLevel::Cursed => QualityLevel::Junk,
            QualityLevel::Junk => QualityLevel::Poor,
            QualityLevel::Poor => QualityLevel::Common,
            QualityLevel::Common => QualityLevel::Uncommon,
            QualityLevel::Uncommon => QualityLevel::Rare,
            QualityLevel::Rare => QualityLevel::Epic,
            QualityLevel::Epic | QualityLevel::Legendary => QualityLevel::Legendary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityLevel::Cursed => "cursed",
            QualityLevel::Junk => "junk",
            QualityLevel::Poor => "poor",
            QualityLevel::Common => "common",
            QualityLevel::Uncommon => "uncommon",
            QualityLevel::Rare => "rare",
            QualityLevel::Epic => "epic",
            QualityLevel::Legendary => "legendary",
        }
    }
}

impl std::str::FromStr for QualityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cursed" => Ok(QualityLevel::Cursed),
            "junk" => Ok(QualityLevel::Junk),
            "poor" => Ok(QualityLevel::Poor),
            "common" => Ok(QualityLevel::Common),
            "uncommon" => Ok(QualityLevel::Uncommon),
            "rare" => Ok(QualityLevel::Rare),
            "epic" => Ok(QualityLevel::Epic),
            "legendary" => Ok(QualityLevel::Legendary),
            other => Err(format!("unknown quality level: {other}")),
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
