//! Movement recording pipeline (application-level orchestration).
//!
//! `MovementRecorder` is the only writer of stock. Every movement goes through the
//! same pipeline:
//!
//! ```text
//! RecordMovement
//!   ↓
//! 1. Validate request shape (type, product, quantity, locations)   → Validation
//!   ↓
//! 2. Check the product exists for the tenant                        → NotFound
//!   ↓
//! 3. Resolve effects through the movement type policy
//!   ↓
//! 4. One unit of work:
//!      append movement
//!      current_stock += global delta        (skipped when zero)
//!      upsert touched location records      (sorted by location)
//!   ↓
//! 5. Commit                                                         → Consistency on any failure
//! ```
//!
//! Steps 1 and 2 never write. Once the unit of work starts, any failure rolls the
//! whole movement back. There is no retry and no idempotency key: a caller that
//! retries after an ambiguous failure may record the movement twice.
//!
//! This module contains no IO itself; it composes the storage traits.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use stockledger_core::{ActorId, DomainError, MovementId, TenantId};
use stockledger_inventory::{LocationInventoryRecord, Movement, RecordMovement, RecordedMovement, StockSnapshot};

use crate::ledger_store::{LedgerStore, LedgerTransaction, ProductCatalog, StoreError};

/// Failure of `record_movement` (and of the read paths built on the same stores).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request was rejected before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The product (or another required record) does not exist for the tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// The unit of work failed and was rolled back; nothing was recorded.
    #[error("movement was not recorded: {0}")]
    Consistency(#[source] StoreError),

    /// A read-only lookup failed.
    #[error("storage read failed: {0}")]
    Storage(#[source] StoreError),
}

impl LedgerError {
    /// Write collided with a concurrent writer; retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Consistency(e) if e.is_conflict())
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::NotFound(msg) => LedgerError::NotFound(msg),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        LedgerError::Storage(value)
    }
}

/// Transaction coordinator for stock movements.
///
/// ## Generic Parameters
///
/// - `S`: ledger storage (must implement `LedgerStore`)
/// - `C`: product catalog (must implement `ProductCatalog`)
///
/// Both are injected, so tests run against `InMemoryLedgerStore` or a
/// failure-injecting wrapper and production runs against Postgres.
#[derive(Debug, Clone)]
pub struct MovementRecorder<S, C> {
    store: S,
    catalog: C,
}

impl<S, C> MovementRecorder<S, C> {
    pub fn new(store: S, catalog: C) -> Self {
        Self { store, catalog }
    }
}

impl<S, C> MovementRecorder<S, C>
where
    S: LedgerStore,
    C: ProductCatalog,
{
    /// Record one movement and update both aggregates atomically.
    ///
    /// `recorded_by` is the acting identity from the request context.
    ///
    /// Returns the persisted movement plus the committed `current_stock` and the
    /// location records this movement touched.
    #[instrument(
        skip(self, request),
        fields(
            tenant_id = %tenant_id,
            movement_type = %request.movement_type,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn record_movement(
        &self,
        tenant_id: TenantId,
        recorded_by: Option<ActorId>,
        request: RecordMovement,
    ) -> Result<RecordedMovement, LedgerError> {
        // 1) Validate (no writes)
        let validated = request.validate().map_err(|e| {
            warn!(error = %e, "movement rejected");
            LedgerError::from(e)
        })?;

        // 2) Product must exist for this tenant (no writes)
        let product_id = validated.product_id;
        let exists = self
            .catalog
            .exists(tenant_id, product_id)
            .await
            .map_err(LedgerError::Storage)?;
        if !exists {
            warn!(product_id = %product_id, "movement for unknown product");
            return Err(LedgerError::NotFound(format!("product {product_id}")));
        }

        // 3) Stamp the movement (effects were resolved during validation)
        let movement = validated.into_movement(MovementId::new(), tenant_id, recorded_by, Utc::now());

        // 4) Unit of work
        let mut tx = self.store.begin().await.map_err(LedgerError::Consistency)?;
        let stock = match apply_movement(&mut tx, &movement).await {
            Ok(stock) => stock,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; transaction dropped");
                }
                warn!(error = %e, movement_id = %movement.id, "movement rolled back");
                return Err(LedgerError::Consistency(e));
            }
        };

        // 5) Commit
        tx.commit().await.map_err(|e| {
            warn!(error = %e, movement_id = %movement.id, "commit failed");
            LedgerError::Consistency(e)
        })?;

        info!(
            movement_id = %movement.id,
            product_id = %movement.product_id,
            current_stock = stock.current_stock,
            locations = stock.locations.len(),
            "movement recorded"
        );

        Ok(RecordedMovement { movement, stock })
    }
}

/// Writes of one movement inside an open transaction.
async fn apply_movement(tx: &mut Box<dyn LedgerTransaction>, movement: &Movement) -> Result<StockSnapshot, StoreError> {
    let tenant_id = movement.tenant_id;
    let product_id = movement.product_id;
    let effects = movement.effects();

    tx.append_movement(movement).await?;

    let current_stock = if effects.global_delta != 0 {
        tx.increment_stock(tenant_id, product_id, effects.global_delta).await?
    } else {
        tx.stock_level(tenant_id, product_id).await?
    };

    let mut touched: Vec<(&str, i64)> = Vec::with_capacity(2);
    if let (Some(delta), Some(location)) = (effects.to_location_delta, movement.to_location.as_deref()) {
        touched.push((location, delta));
    }
    if let (Some(delta), Some(location)) = (effects.from_location_delta, movement.from_location.as_deref()) {
        touched.push((location, delta));
    }
    // Lock location rows in a stable order across writers.
    touched.sort_by(|a, b| a.0.cmp(b.0));

    let mut locations: Vec<LocationInventoryRecord> = Vec::with_capacity(touched.len());
    for (location, delta) in touched {
        locations.push(tx.upsert_location(tenant_id, product_id, location, delta).await?);
    }

    Ok(StockSnapshot {
        current_stock,
        locations,
    })
}
