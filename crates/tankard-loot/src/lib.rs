//! Tankard loot generation.
//!
//! Consumes the item catalog and a declarative loot table config at
//! startup, flattens them into cumulative-weight tables, and serves
//! weighted lootbox opens with rarity amplification.

pub mod config;
pub mod flatten;
pub mod generator;

use thiserror::Error;

pub use config::{LootTablesConfig, LootboxConfig, MoneyRange, PoolConfig, PoolEntryConfig};
pub use flatten::{FlattenedLootbox, FlattenedPool, LootRuntime};
pub use generator::LootGenerator;

/// Loot subsystem errors. Everything here is fatal at load time; runtime
/// open failures surface as [`tankard_core::CoreError::Loot`].
#[derive(Error, Debug)]
pub enum LootError {
    #[error("loot config io error: {0}")]
    Io(String),

    #[error("loot config parse error: {0}")]
    Parse(String),

    #[error("loot config schema violation: {0}")]
    Schema(String),

    #[error("lootbox {lootbox:?} references undefined pool {pool:?}")]
    UnknownPool { lootbox: String, pool: String },

    #[error("pool {0:?} has no items")]
    EmptyPool(String),

    #[error("pool {pool:?} entry {entry:?} matches no catalog item")]
    UnresolvedEntry { pool: String, entry: String },

    #[error("item catalog has no currency item for money drops")]
    MissingCurrencyItem,
}

impl From<LootError> for tankard_core::CoreError {
    fn from(err: LootError) -> Self {
        tankard_core::CoreError::Loot(err.to_string())
    }
}
