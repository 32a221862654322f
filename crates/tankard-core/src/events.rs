//! Domain events delivered through the fan-out bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::gamble::{Gamble, GambleResult, ParticipantOutcome};

pub const SCHEMA_V1: &str = "1.0";
pub const SCHEMA_V2: &str = "2.0";

/// Every event type the bus carries. Gamble lifecycle events originate in
/// the engine; the siblings are produced by other subsystems and consumed
/// here by the stats recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    GambleStarted,
    GambleParticipated,
    GambleCompleted,
    ItemUpgraded,
    ItemDisassembled,
    SlotsCompleted,
    SearchPerformed,
    JobLevelUp,
    JobXpCritical,
    ItemSold,
    ItemBought,
    PredictionParticipated,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::GambleStarted => "gamble_started",
            EventType::GambleParticipated => "gamble_participated",
            EventType::GambleCompleted => "gamble_completed",
            EventType::ItemUpgraded => "item_upgraded",
            EventType::ItemDisassembled => "item_disassembled",
            EventType::SlotsCompleted => "slots_completed",
            EventType::SearchPerformed => "search_performed",
            EventType::JobLevelUp => "job_level_up",
            EventType::JobXpCritical => "job_xp_critical",
            EventType::ItemSold => "item_sold",
            EventType::ItemBought => "item_bought",
            EventType::PredictionParticipated => "prediction_participated",
        }
    }

    pub const ALL: [EventType; 12] = [
        EventType::GambleStarted,
        EventType::GambleParticipated,
        EventType::GambleCompleted,
        EventType::ItemUpgraded,
        EventType::ItemDisassembled,
        EventType::SlotsCompleted,
        EventType::SearchPerformed,
        EventType::JobLevelUp,
        EventType::JobXpCritical,
        EventType::ItemSold,
        EventType::ItemBought,
        EventType::PredictionParticipated,
    ];
}

/// The fan-out payload envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub schema_version: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

/// How a participant entered the gamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationSource {
    Start,
    Join,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GambleParticipatedPayload {
    pub gamble_id: Uuid,
    pub user_id: Uuid,
    pub lootbox_count: i64,
    pub source: ParticipationSource,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GambleCompletedPayload {
    pub gamble_id: Uuid,
    pub winner_id: Option<Uuid>,
    pub total_value: i64,
    pub participant_count: usize,
    pub participants: Vec<ParticipantOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLevelUpPayload {
    pub user_id: Uuid,
    pub activity: String,
    pub old_level: u32,
    pub new_level: u32,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            schema_version: SCHEMA_V1.to_string(),
            event_type,
            payload,
        }
    }

    pub fn gamble_started(gamble: &Gamble) -> Self {
        Self::new(
            EventType::GambleStarted,
            serde_json::to_value(gamble).unwrap_or(serde_json::Value::Null),
        )
    }

    pub fn gamble_participated(
        gamble_id: Uuid,
        user_id: Uuid,
        lootbox_count: i64,
        source: ParticipationSource,
    ) -> Self {
        let payload = GambleParticipatedPayload {
            gamble_id,
            user_id,
            lootbox_count,
            source,
            timestamp: Utc::now(),
        };
        Self::new(
            EventType::GambleParticipated,
            serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        )
    }

    /// Completion carries the v2 payload with per-participant outcome flags.
    pub fn gamble_completed(result: &GambleResult, outcomes: Vec<ParticipantOutcome>) -> Self {
        let payload = GambleCompletedPayload {
            gamble_id: result.gamble_id,
            winner_id: result.winner_id,
            total_value: result.total_value,
            participant_count: outcomes.len(),
            participants: outcomes,
        };
        Self {
            schema_version: SCHEMA_V2.to_string(),
            event_type: EventType::GambleCompleted,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn job_level_up(user_id: Uuid, activity: &str, old_level: u32, new_level: u32) -> Self {
        let payload = JobLevelUpPayload {
            user_id,
            activity: activity.to_string(),
            old_level,
            new_level,
            timestamp: Utc::now(),
        };
        Self::new(
            EventType::JobLevelUp,
            serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        )
    }

    /// Sibling-subsystem event with an ad-hoc payload.
    pub fn sibling(event_type: EventType, user_id: Uuid, data: serde_json::Value) -> Self {
        Self::new(event_type, json!({ "user_id": user_id, "data": data }))
    }

    /// The user this event is about, when the payload names one.
    pub fn subject_user(&self) -> Option<Uuid> {
        let field = match self.event_type {
            EventType::GambleStarted => "initiator_id",
            EventType::GambleCompleted => "winner_id",
            _ => "user_id",
        };
        self.payload
            .get(field)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}
