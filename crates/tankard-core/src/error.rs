//! Core error types for the Tankard backend.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types. The first block is the domain taxonomy surfaced to
/// command adapters; the rest is infrastructure.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("a gamble is already active")]
    GambleAlreadyActive,

    #[error("gamble not found: {0}")]
    GambleNotFound(Uuid),

    #[error("gamble is not in joining state")]
    NotInJoiningState,

    #[error("join deadline has passed")]
    JoinDeadlinePassed,

    #[error("user already joined this gamble")]
    UserAlreadyJoined,

    #[error("user not found: {platform}/{platform_id}")]
    UserNotFound { platform: String, platform_id: String },

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("item is not a lootbox: {0}")]
    NotALootbox(String),

    #[error("insufficient quantity of {item}: have {have}, need {need}")]
    InsufficientQuantity { item: String, have: i64, need: i64 },

    #[error("bet quantity must be positive")]
    BetQuantityMustBePositive,

    #[error("at least one lootbox is required")]
    AtLeastOneLootboxRequired,

    #[error("bet quantity exceeds the limit of {0}")]
    QuantityTooHigh(i64),

    #[error("gamble was already executed by another worker")]
    GambleAlreadyExecuted,

    #[error("join window is still open")]
    JoinWindowOpen,

    #[error("loot error: {0}")]
    Loot(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("event bus error: {0}")]
    Bus(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("shutdown deadline elapsed")]
    ShutdownTimeout,
}

impl CoreError {
    /// Whether this error is a concurrency loss rather than a caller
    /// mistake. Adapters render these as "somebody beat you to it".
    pub fn is_concurrency_loss(&self) -> bool {
        matches!(
            self,
            CoreError::GambleAlreadyActive
                | CoreError::UserAlreadyJoined
                | CoreError::GambleAlreadyExecuted
        )
    }
}
