//! The winner-takes-all wager aggregate and its lifecycle types.

pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quality::QualityLevel;

pub use engine::{BetRequest, GambleService};

/// Lifecycle of a gamble. `Refunded` is reserved for timeout handling;
/// no current path emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GambleState {
    Joining,
    Opening,
    Completed,
    Refunded,
}

impl GambleState {
    pub fn as_str(self) -> &'static str {
        match self {
            GambleState::Joining => "joining",
            GambleState::Opening => "opening",
            GambleState::Completed => "completed",
            GambleState::Refunded => "refunded",
        }
    }

    /// Non-terminal states; at most one gamble system-wide may be in one.
    pub fn is_active(self) -> bool {
        matches!(self, GambleState::Joining | GambleState::Opening)
    }
}

impl std::str::FromStr for GambleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joining" => Ok(GambleState::Joining),
            "opening" => Ok(GambleState::Opening),
            "completed" => Ok(GambleState::Completed),
            "refunded" => Ok(GambleState::Refunded),
            other => Err(format!("unknown gamble state: {other}")),
        }
    }
}

/// One wagered stack. Quality is captured from the consumed inventory
/// slot at bet time and carried through to the lootbox roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootboxBet {
    pub item_name: String,
    pub quantity: i64,
    pub quality: QualityLevel,
}

/// A user's stake in a gamble. Immutable once joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub gamble_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub bets: Vec<LootboxBet>,
}

impl Participant {
    pub fn lootbox_count(&self) -> i64 {
        self.bets.iter().map(|b| b.quantity).sum()
    }
}

/// The wager aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gamble {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub state: GambleState,
    pub created_at: DateTime<Utc>,
    pub join_deadline: DateTime<Utc>,
    /// In join order.
    pub participants: Vec<Participant>,
}

/// A per-participant, per-drop audit record written during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GambleOpenedItem {
    pub gamble_id: Uuid,
    pub user_id: Uuid,
    pub item_id: i64,
    pub quantity: i64,
    pub value: i64,
    pub quality: QualityLevel,
}

/// Outcome of a completed gamble. Produced exactly once, atomically with
/// the transition to `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GambleResult {
    pub gamble_id: Uuid,
    /// Empty when the gamble had no participants.
    pub winner_id: Option<Uuid>,
    pub total_value: i64,
    pub items: Vec<GambleOpenedItem>,
}

/// Per-participant flags reported on the completion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantOutcome {
    pub user_id: Uuid,
    pub score: i64,
    pub lootbox_count: i64,
    pub is_winner: bool,
    pub is_near_miss: bool,
    pub is_crit_fail: bool,
    pub is_tie_break_lost: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(GambleState::Joining.is_active());
        assert!(GambleState::Opening.is_active());
        assert!(!GambleState::Completed.is_active());
        assert!(!GambleState::Refunded.is_active());
    }

    #[test]
    fn state_round_trips() {
        for state in [
            GambleState::Joining,
            GambleState::Opening,
            GambleState::Completed,
            GambleState::Refunded,
        ] {
            assert_eq!(state.as_str().parse::<GambleState>().unwrap(), state);
        }
    }

    #[test]
    fn lootbox_count_sums_bets() {
        let participant = Participant {
            gamble_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: "ana".to_string(),
            bets: vec![
                LootboxBet {
                    item_name: "lootbox_tier1".to_string(),
                    quantity: 2,
                    quality: QualityLevel::Common,
                },
                LootboxBet {
                    item_name: "lootbox_tier2".to_string(),
                    quantity: 3,
                    quality: QualityLevel::Rare,
                },
            ],
        };
        assert_eq!(participant.lootbox_count(), 5);
    }
}
