//! Tankard persistence layer.
//!
//! PostgreSQL adapters for the core store ports, plus an in-memory store
//! with the same uniqueness and compare-and-swap semantics for tests and
//! local development.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;

pub use error::{DbError, Result};
pub use memory::MemoryStore;
pub use pool::{create_pool, DbConfig};
pub use postgres::PgStore;
