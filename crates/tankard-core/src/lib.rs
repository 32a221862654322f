//! Tankard Game Backend Core
//!
//! The gambling engine of a multi-tenant chat-bot game: winner-takes-all
//! wagers over lootbox bets, the loot generation contract they settle
//! against, and the resilient event fan-out that stats and progression
//! consumers subscribe to.

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod gamble;
pub mod item;
pub mod jobs;
pub mod naming;
pub mod ports;
pub mod progression;
pub mod publisher;
pub mod quality;
pub mod rng;
pub mod stats;
pub mod xp;

pub use bus::{EventBus, EventHandler};
pub use config::EngineConfig;
pub use error::{CoreError, Result};
pub use events::{Event, EventType, ParticipationSource};
pub use gamble::{
    BetRequest, Gamble, GambleOpenedItem, GambleResult, GambleService, GambleState, LootboxBet,
    Participant, ParticipantOutcome,
};
pub use item::{Inventory, InventorySlot, Item, User};
pub use ports::{
    DroppedItem, GambleStore, GambleTx, JobService, LootboxOpener, NameResolver,
    ProgressionService, StatsStore,
};
pub use publisher::{DeadLetterSink, FileDeadLetter, ResilientPublisher, RetryPolicy};
pub use quality::QualityLevel;
pub use rng::{OsRandomSource, RandomSource, SequenceSource};
pub use stats::{StatsEvent, StatsRecorder};
pub use xp::XpAwarder;
