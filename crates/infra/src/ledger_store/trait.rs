use std::sync::Arc;

use thiserror::Error;

use stockledger_core::{ProductId, TenantId};
use stockledger_inventory::{LocationInventoryRecord, Movement};

/// Ledger storage operation error.
///
/// These are **infrastructure errors** (storage, concurrency, integrity) as opposed
/// to domain errors (validation, unknown references).
///
/// ## Error Categories
///
/// - **Conflict**: Concurrent writers collided (unique/serialization/deadlock); retryable by the caller
/// - **Constraint**: A storage integrity rule rejected the write
/// - **Backend**: Connection, pool or driver failure
/// - **Decode**: A stored row could not be mapped back into a domain value
/// - **TransactionClosed**: The unit of work was already committed or rolled back
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("failed to decode stored row: {0}")]
    Decode(String),

    #[error("transaction already finished")]
    TransactionClosed,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Append-only movement ledger plus the two derived aggregates, written through
/// explicit units of work.
///
/// ## Design Principles
///
/// - **No storage assumptions**: Works with the in-memory implementation (tests/dev)
///   and the Postgres backend (production)
/// - **Append-only**: The contract offers no way to change or remove a movement
/// - **Atomic deltas**: Aggregates are moved by signed deltas inside the storage
///   engine, never by read-modify-write in application code
///
/// ## Unit of Work
///
/// `begin()` opens a transaction. Everything written through it becomes visible
/// together on `commit()`, or not at all on `rollback()`. Dropping an unfinished
/// transaction is equivalent to a rollback.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        (**self).begin().await
    }
}

/// One open unit of work against the ledger.
///
/// Implementations must:
/// - make no write visible to other readers before `commit()`
/// - apply `increment_stock` / `upsert_location` as atomic deltas
/// - return the post-write aggregate values
/// - reject any call after `commit()` / `rollback()` with `StoreError::TransactionClosed`
#[async_trait::async_trait]
pub trait LedgerTransaction: Send {
    /// Append one movement (insert only).
    async fn append_movement(&mut self, movement: &Movement) -> Result<(), StoreError>;

    /// Add `delta` to the product's global counter, creating it at zero first if
    /// absent. Returns the new value.
    async fn increment_stock(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, StoreError>;

    /// Read the product's global counter as seen by this transaction (zero if absent).
    async fn stock_level(&mut self, tenant_id: TenantId, product_id: ProductId) -> Result<i64, StoreError>;

    /// Absent: create with `quantity = delta`, `reserved_qty = 0`.
    /// Present: `quantity += delta`. Returns the record after the write.
    async fn upsert_location(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        location: &str,
        delta: i64,
    ) -> Result<LocationInventoryRecord, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Product catalog lookup (the catalog itself is owned elsewhere).
#[async_trait::async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn exists(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<C> ProductCatalog for Arc<C>
where
    C: ProductCatalog + ?Sized,
{
    async fn exists(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, StoreError> {
        (**self).exists(tenant_id, product_id).await
    }
}
