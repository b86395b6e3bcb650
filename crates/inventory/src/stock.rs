use serde::Serialize;

use stockledger_core::{DomainError, DomainResult, ProductId, TenantId};

use crate::movement::Movement;

/// Global stock counter of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub current_stock: i64,
}

impl ProductStock {
    pub fn new(tenant_id: TenantId, product_id: ProductId, current_stock: i64) -> Self {
        Self {
            tenant_id,
            product_id,
            current_stock,
        }
    }
}

/// Stock of one product at one location.
///
/// `available_qty` is derived (`quantity - reserved_qty`) and recomputed on every
/// change, so it can never drift from the other two fields. `reserved_qty` belongs
/// to the reservation subsystem; the ledger only ever moves `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationInventoryRecord {
    tenant_id: TenantId,
    product_id: ProductId,
    location: String,
    quantity: i64,
    reserved_qty: i64,
    available_qty: i64,
}

impl LocationInventoryRecord {
    /// Fails when `quantity - reserved_qty` does not fit in an `i64`.
    pub fn new(
        tenant_id: TenantId,
        product_id: ProductId,
        location: impl Into<String>,
        quantity: i64,
        reserved_qty: i64,
    ) -> DomainResult<Self> {
        let location = location.into();
        let available_qty = available(&location, quantity, reserved_qty)?;
        Ok(Self {
            tenant_id,
            product_id,
            location,
            quantity,
            reserved_qty,
            available_qty,
        })
    }

    /// First touch of a location: quantity is the delta, nothing reserved yet.
    pub fn opened_with(
        tenant_id: TenantId,
        product_id: ProductId,
        location: impl Into<String>,
        delta: i64,
    ) -> DomainResult<Self> {
        Self::new(tenant_id, product_id, location, delta, 0)
    }

    /// Move `quantity` by `delta`. On overflow the record is left unchanged.
    pub fn apply_delta(&mut self, delta: i64) -> DomainResult<()> {
        let quantity = self.quantity.checked_add(delta).ok_or_else(|| {
            DomainError::validation(format!("quantity overflow at location {}", self.location))
        })?;
        self.available_qty = available(&self.location, quantity, self.reserved_qty)?;
        self.quantity = quantity;
        Ok(())
    }

    pub fn set_reserved(&mut self, reserved_qty: i64) -> DomainResult<()> {
        self.available_qty = available(&self.location, self.quantity, reserved_qty)?;
        self.reserved_qty = reserved_qty;
        Ok(())
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved_qty(&self) -> i64 {
        self.reserved_qty
    }

    pub fn available_qty(&self) -> i64 {
        self.available_qty
    }
}

fn available(location: &str, quantity: i64, reserved_qty: i64) -> DomainResult<i64> {
    quantity
        .checked_sub(reserved_qty)
        .ok_or_else(|| DomainError::validation(format!("available quantity overflow at location {location}")))
}

/// Current aggregates of one product: global counter plus every location record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockSnapshot {
    pub current_stock: i64,
    pub locations: Vec<LocationInventoryRecord>,
}

/// Result of a committed movement: the movement plus the aggregate values it produced.
///
/// `locations` only lists the records this movement touched (zero, one or two).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedMovement {
    pub movement: Movement,
    pub stock: StockSnapshot,
}
