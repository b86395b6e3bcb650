//! Movement ledger storage boundary.
//!
//! Write side: `LedgerStore` opens units of work (`LedgerTransaction`) that append
//! a movement and move the product/location aggregates together. Read side:
//! `MovementQuery` and `StockReader`. Implementations: in-memory (tests/dev) and
//! Postgres.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::{InMemoryLedgerStore, InMemoryLedgerTransaction};
pub use postgres::PostgresLedgerStore;
pub use query::{MovementFilter, MovementPage, MovementQuery, MovementView, Pagination, StockReader};
pub use r#trait::{LedgerStore, LedgerTransaction, ProductCatalog, StoreError};
