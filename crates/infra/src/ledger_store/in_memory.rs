use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use stockledger_core::{DomainError, ProductId, TenantId};
use stockledger_inventory::{LocationInventoryRecord, Movement, ProductStock};

use super::query::{MovementFilter, MovementPage, MovementQuery, MovementView, Pagination, StockReader};
use super::r#trait::{LedgerStore, LedgerTransaction, StoreError};
use crate::directory::InMemoryDirectory;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StockKey {
    tenant_id: TenantId,
    product_id: ProductId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LocationKey {
    tenant_id: TenantId,
    product_id: ProductId,
    location: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Commit order.
    movements: Vec<Movement>,
    stock: HashMap<StockKey, i64>,
    locations: HashMap<LocationKey, LocationInventoryRecord>,
}

/// Inverse of one write, replayed newest-first on rollback.
#[derive(Debug)]
enum Undo {
    AppendedMovement,
    Stock { key: StockKey, previous: Option<i64> },
    Location {
        key: LocationKey,
        previous: Option<LocationInventoryRecord>,
    },
}

/// In-memory movement ledger with product and location aggregates.
///
/// Transactions are serialized: `begin()` holds the store lock until the
/// transaction finishes, so concurrent writers queue instead of interleaving.
/// Writes land immediately under the lock and are undone on rollback/drop.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    directory: Arc<InMemoryDirectory>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_directory(Arc::new(InMemoryDirectory::new()))
    }

    /// Share a directory so history listings can show product/supplier/staff names.
    pub fn with_directory(directory: Arc<InMemoryDirectory>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            directory,
        }
    }

    pub fn directory(&self) -> &Arc<InMemoryDirectory> {
        &self.directory
    }

    /// Set the reserved quantity of a location record.
    ///
    /// Stand-in for the reservation subsystem (which owns `reserved_qty`) in tests
    /// and dev. Creates the record at quantity zero if it does not exist yet.
    pub async fn seed_reservation(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        location: &str,
        reserved_qty: i64,
    ) -> Result<LocationInventoryRecord, StoreError> {
        let mut state = self.state.lock().await;
        let key = LocationKey {
            tenant_id,
            product_id,
            location: location.to_string(),
        };
        let mut record = match state.locations.get(&key) {
            Some(existing) => existing.clone(),
            None => LocationInventoryRecord::opened_with(tenant_id, product_id, location, 0).map_err(overflow)?,
        };
        record.set_reserved(reserved_qty).map_err(overflow)?;
        state.locations.insert(key, record.clone());
        Ok(record)
    }

    fn view(&self, movement: &Movement) -> Result<MovementView, StoreError> {
        let tenant_id = movement.tenant_id;
        let product = self.directory.product(tenant_id, movement.product_id)?;
        let supplier_name = match movement.supplier_id {
            Some(id) => self.directory.supplier_name(tenant_id, id)?,
            None => None,
        };
        let recorded_by_name = match movement.recorded_by {
            Some(id) => self.directory.staff_name(tenant_id, id)?,
            None => None,
        };
        let delivered_by_name = match movement.delivered_by {
            Some(id) => self.directory.staff_name(tenant_id, id)?,
            None => None,
        };

        Ok(MovementView {
            movement: movement.clone(),
            product_name: product.as_ref().map(|p| p.name.clone()),
            product_unit: product.and_then(|p| p.unit),
            supplier_name,
            recorded_by_name,
            delivered_by_name,
        })
    }
}

/// Arithmetic on a location record left the `i64` range.
fn overflow(err: DomainError) -> StoreError {
    StoreError::Constraint(err.to_string())
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryLedgerTransaction {
            state: Some(guard),
            undo: Vec::new(),
        }))
    }
}

/// Open unit of work on an [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemoryLedgerTransaction {
    state: Option<OwnedMutexGuard<LedgerState>>,
    undo: Vec<Undo>,
}

impl InMemoryLedgerTransaction {
    fn state_mut(&mut self) -> Result<&mut LedgerState, StoreError> {
        self.state.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }

    fn revert(&mut self) {
        let Some(state) = self.state.as_deref_mut() else {
            return;
        };
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::AppendedMovement => {
                    state.movements.pop();
                }
                Undo::Stock { key, previous } => match previous {
                    Some(value) => {
                        state.stock.insert(key, value);
                    }
                    None => {
                        state.stock.remove(&key);
                    }
                },
                Undo::Location { key, previous } => match previous {
                    Some(record) => {
                        state.locations.insert(key, record);
                    }
                    None => {
                        state.locations.remove(&key);
                    }
                },
            }
        }
    }
}

impl Drop for InMemoryLedgerTransaction {
    fn drop(&mut self) {
        // Unfinished transaction: discard its writes before releasing the lock.
        self.revert();
    }
}

#[async_trait::async_trait]
impl LedgerTransaction for InMemoryLedgerTransaction {
    async fn append_movement(&mut self, movement: &Movement) -> Result<(), StoreError> {
        let state = self.state_mut()?;
        if state.movements.iter().any(|m| m.id == movement.id) {
            return Err(StoreError::Conflict(format!(
                "movement {} already recorded",
                movement.id
            )));
        }
        state.movements.push(movement.clone());
        self.undo.push(Undo::AppendedMovement);
        Ok(())
    }

    async fn increment_stock(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let key = StockKey {
            tenant_id,
            product_id,
        };
        let state = self.state_mut()?;
        let previous = state.stock.get(&key).copied();
        let next = previous
            .unwrap_or(0)
            .checked_add(delta)
            .ok_or_else(|| StoreError::Constraint(format!("current_stock overflow for product {product_id}")))?;
        state.stock.insert(key, next);
        self.undo.push(Undo::Stock { key, previous });
        Ok(next)
    }

    async fn stock_level(&mut self, tenant_id: TenantId, product_id: ProductId) -> Result<i64, StoreError> {
        let key = StockKey {
            tenant_id,
            product_id,
        };
        Ok(self.state_mut()?.stock.get(&key).copied().unwrap_or(0))
    }

    async fn upsert_location(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        location: &str,
        delta: i64,
    ) -> Result<LocationInventoryRecord, StoreError> {
        let key = LocationKey {
            tenant_id,
            product_id,
            location: location.to_string(),
        };
        let state = self.state_mut()?;
        let previous = state.locations.get(&key).cloned();
        let record = match &previous {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.apply_delta(delta).map_err(overflow)?;
                updated
            }
            None => LocationInventoryRecord::opened_with(tenant_id, product_id, location, delta).map_err(overflow)?,
        };
        state.locations.insert(key.clone(), record.clone());
        self.undo.push(Undo::Location { key, previous });
        Ok(record)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.state.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        self.undo.clear();
        self.state = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if self.state.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        self.revert();
        self.state = None;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MovementQuery for InMemoryLedgerStore {
    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let mut matching: Vec<Movement> = {
            let state = self.state.lock().await;
            state
                .movements
                .iter()
                .filter(|m| m.tenant_id == tenant_id && filter.matches(m))
                .cloned()
                .collect()
        };

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let items = matching
            .iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .map(|m| self.view(m))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MovementPage {
            items,
            total,
            has_more: pagination.has_more(total),
        })
    }

    async fn product_history(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.product_id == product_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl StockReader for InMemoryLedgerStore {
    async fn product_stock(&self, tenant_id: TenantId, product_id: ProductId) -> Result<ProductStock, StoreError> {
        let state = self.state.lock().await;
        let key = StockKey {
            tenant_id,
            product_id,
        };
        let current = state.stock.get(&key).copied().unwrap_or(0);
        Ok(ProductStock::new(tenant_id, product_id, current))
    }

    async fn location_records(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<LocationInventoryRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut records: Vec<LocationInventoryRecord> = state
            .locations
            .values()
            .filter(|r| r.tenant_id() == tenant_id && r.product_id() == product_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.location().cmp(b.location()));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use stockledger_core::MovementId;
    use stockledger_inventory::MovementType;

    use super::*;

    fn purchase(tenant_id: TenantId, product_id: ProductId, quantity: i64) -> Movement {
        Movement {
            id: MovementId::new(),
            tenant_id,
            movement_type: MovementType::Purchase,
            product_id,
            quantity,
            from_location: None,
            to_location: Some("A".to_string()),
            supplier_id: None,
            recorded_by: None,
            delivered_by: None,
            cost: None,
            notes: None,
            reference_type: None,
            reference_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryLedgerStore::new();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new();

        let mut tx = store.begin().await.unwrap();
        tx.append_movement(&purchase(tenant_id, product_id, 4)).await.unwrap();
        assert_eq!(tx.increment_stock(tenant_id, product_id, 4).await.unwrap(), 4);
        let rec = tx.upsert_location(tenant_id, product_id, "A", 4).await.unwrap();
        assert_eq!(rec.quantity(), 4);
        tx.commit().await.unwrap();
        drop(tx);

        assert_eq!(store.product_stock(tenant_id, product_id).await.unwrap().current_stock, 4);
        assert_eq!(store.location_records(tenant_id, product_id).await.unwrap().len(), 1);
        assert_eq!(store.product_history(tenant_id, product_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_every_write() {
        let store = InMemoryLedgerStore::new();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new();

        let mut tx = store.begin().await.unwrap();
        tx.append_movement(&purchase(tenant_id, product_id, 4)).await.unwrap();
        tx.increment_stock(tenant_id, product_id, 4).await.unwrap();
        tx.upsert_location(tenant_id, product_id, "A", 4).await.unwrap();
        tx.rollback().await.unwrap();
        drop(tx);

        assert_eq!(store.product_stock(tenant_id, product_id).await.unwrap().current_stock, 0);
        assert!(store.location_records(tenant_id, product_id).await.unwrap().is_empty());
        assert!(store.product_history(tenant_id, product_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropping_an_open_transaction_rolls_back() {
        let store = InMemoryLedgerStore::new();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.increment_stock(tenant_id, product_id, 9).await.unwrap();
        }

        assert_eq!(store.product_stock(tenant_id, product_id).await.unwrap().current_stock, 0);
    }

    #[tokio::test]
    async fn rollback_restores_previous_values_not_zero() {
        let store = InMemoryLedgerStore::new();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new();

        let mut tx = store.begin().await.unwrap();
        tx.increment_stock(tenant_id, product_id, 10).await.unwrap();
        tx.upsert_location(tenant_id, product_id, "A", 10).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        tx.increment_stock(tenant_id, product_id, -3).await.unwrap();
        tx.upsert_location(tenant_id, product_id, "A", -3).await.unwrap();
        tx.rollback().await.unwrap();
        drop(tx);

        assert_eq!(store.product_stock(tenant_id, product_id).await.unwrap().current_stock, 10);
        let records = store.location_records(tenant_id, product_id).await.unwrap();
        assert_eq!(records[0].quantity(), 10);
    }

    #[tokio::test]
    async fn finished_transaction_rejects_further_calls() {
        let store = InMemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();

        let err = tx
            .increment_stock(TenantId::new(), ProductId::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TransactionClosed));
        assert!(matches!(tx.commit().await, Err(StoreError::TransactionClosed)));
    }

    #[tokio::test]
    async fn duplicate_movement_id_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let m = purchase(TenantId::new(), ProductId::new(), 1);

        let mut tx = store.begin().await.unwrap();
        tx.append_movement(&m).await.unwrap();
        let err = tx.append_movement(&m).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn reservation_keeps_available_derived() {
        let store = InMemoryLedgerStore::new();
        let tenant_id = TenantId::new();
        let product_id = ProductId::new();

        store.seed_reservation(tenant_id, product_id, "A", 2).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let rec = tx.upsert_location(tenant_id, product_id, "A", 5).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(rec.quantity(), 5);
        assert_eq!(rec.reserved_qty(), 2);
        assert_eq!(rec.available_qty(), 3);
    }

    #[tokio::test]
    async fn history_is_tenant_isolated() {
        let store = InMemoryLedgerStore::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let product_id = ProductId::new();

        let mut tx = store.begin().await.unwrap();
        tx.append_movement(&purchase(t1, product_id, 1)).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let page = store
            .list_movements(t2, MovementFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }
}
