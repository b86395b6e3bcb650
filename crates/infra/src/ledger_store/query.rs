//! Read side of the ledger: movement history and current aggregates.
//!
//! All queries are tenant-scoped and read-only. History listings are paginated
//! and ordered newest first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, TenantId};
use stockledger_inventory::{LocationInventoryRecord, Movement, MovementType, ProductStock, StockSnapshot};

use super::r#trait::StoreError;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const DEFAULT_MAX_PAGE_LIMIT: u32 = 1000;

/// Pagination parameters for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of movements to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Limit defaults to 50 and is clamped to `1..=max_limit`.
    pub fn new(limit: Option<u32>, offset: Option<u32>, max_limit: u32) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, max_limit.max(1)),
            offset: offset.unwrap_or(0),
        }
    }

    /// `true` when rows exist beyond this page.
    pub fn has_more(&self, total: u64) -> bool {
        u64::from(self.offset) + u64::from(self.limit) < total
    }
}

/// Filter criteria for history queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub movement_type: Option<MovementType>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &Movement) -> bool {
        self.product_id.is_none_or(|p| p == movement.product_id)
            && self.movement_type.is_none_or(|t| t == movement.movement_type)
    }
}

/// A movement joined with display-only names from the directories.
///
/// Names are `None` when the referenced record is unknown; they never affect
/// stock semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementView {
    #[serde(flatten)]
    pub movement: Movement,
    pub product_name: Option<String>,
    pub product_unit: Option<String>,
    pub supplier_name: Option<String>,
    pub recorded_by_name: Option<String>,
    pub delivered_by_name: Option<String>,
}

/// Paginated history result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementPage {
    pub items: Vec<MovementView>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    pub has_more: bool,
}

/// Movement history queries.
#[async_trait::async_trait]
pub trait MovementQuery: Send + Sync {
    /// Movements matching `filter`, newest first (ties broken by id, newest first).
    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;

    /// Every movement of one product in commit order (oldest first).
    async fn product_history(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Movement>, StoreError>;
}

/// Current aggregate reads.
#[async_trait::async_trait]
pub trait StockReader: Send + Sync {
    /// Global counter; zero when the product has never moved.
    async fn product_stock(&self, tenant_id: TenantId, product_id: ProductId) -> Result<ProductStock, StoreError>;

    /// Every location record of the product, ordered by location name.
    async fn location_records(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<LocationInventoryRecord>, StoreError>;

    /// Global counter plus every location record of the product.
    ///
    /// Two separate reads; a concurrent commit may land between them.
    async fn stock_snapshot(&self, tenant_id: TenantId, product_id: ProductId) -> Result<StockSnapshot, StoreError> {
        let stock = self.product_stock(tenant_id, product_id).await?;
        let locations = self.location_records(tenant_id, product_id).await?;
        Ok(StockSnapshot {
            current_stock: stock.current_stock,
            locations,
        })
    }
}

#[async_trait::async_trait]
impl<Q> MovementQuery for Arc<Q>
where
    Q: MovementQuery + ?Sized,
{
    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).list_movements(tenant_id, filter, pagination).await
    }

    async fn product_history(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        (**self).product_history(tenant_id, product_id).await
    }
}

#[async_trait::async_trait]
impl<R> StockReader for Arc<R>
where
    R: StockReader + ?Sized,
{
    async fn product_stock(&self, tenant_id: TenantId, product_id: ProductId) -> Result<ProductStock, StoreError> {
        (**self).product_stock(tenant_id, product_id).await
    }

    async fn location_records(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<LocationInventoryRecord>, StoreError> {
        (**self).location_records(tenant_id, product_id).await
    }
}
