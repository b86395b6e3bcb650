//! Postgres-backed movement ledger.
//!
//! Movements, the product counter and the location records live in one database,
//! so a unit of work is a single SQL transaction. Aggregate changes are written as
//! `INSERT .. ON CONFLICT DO UPDATE SET x = x + EXCLUDED.x`, which makes the row
//! lock and the addition one statement: concurrent writers serialize on the row
//! and never lose an update.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate movement id |
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transactions collided |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Lock cycle between writers |
//! | Database (other integrity) | `23xxx` | `Constraint` | FK/check violation, append-only trigger |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | RowNotFound | N/A | `Backend` | Unexpected row not found |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use stockledger_core::{ActorId, MovementId, ProductId, SupplierId, TenantId};
use stockledger_inventory::{LocationInventoryRecord, Movement, MovementType, ProductStock};

use super::query::{MovementFilter, MovementPage, MovementQuery, MovementView, Pagination, StockReader};
use super::r#trait::{LedgerStore, LedgerTransaction, ProductCatalog, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// Postgres-backed movement ledger.
///
/// ## Tenant Isolation
///
/// Every query includes `tenant_id` in the WHERE clause (or in the conflict key).
///
/// ## Lock Order
///
/// A unit of work touches rows in this order: movement insert, product counter,
/// then location rows sorted by name (the coordinator sorts them). Writers that
/// follow the same order cannot deadlock each other.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables, indexes and the append-only trigger if missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or rename a catalog product (dev/test seeding; the catalog is owned elsewhere).
    pub async fn register_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        name: &str,
        unit: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (tenant_id, id, name, unit)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, id) DO UPDATE SET name = EXCLUDED.name, unit = EXCLUDED.unit
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(name)
        .bind(unit)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_product", e))?;
        Ok(())
    }

    pub async fn register_supplier(&self, tenant_id: TenantId, supplier_id: SupplierId, name: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO suppliers (tenant_id, id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(supplier_id.as_uuid())
        .bind(name)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_supplier", e))?;
        Ok(())
    }

    pub async fn register_staff(&self, tenant_id: TenantId, actor_id: ActorId, name: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO staff (tenant_id, id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(actor_id.as_uuid())
        .bind(name)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_staff", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgLedgerTransaction { tx: Some(tx) }))
    }
}

/// Open SQL transaction. Dropping it unfinished rolls back (sqlx semantics).
pub struct PgLedgerTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerTransaction {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait::async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    #[instrument(
        skip(self, movement),
        fields(
            tenant_id = %movement.tenant_id,
            product_id = %movement.product_id,
            movement_id = %movement.id
        ),
        err
    )]
    async fn append_movement(&mut self, movement: &Movement) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id,
                tenant_id,
                movement_type,
                product_id,
                quantity,
                from_location,
                to_location,
                supplier_id,
                recorded_by,
                delivered_by,
                cost,
                notes,
                reference_type,
                reference_id,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.tenant_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.product_id.as_uuid())
        .bind(movement.quantity)
        .bind(movement.from_location.as_deref())
        .bind(movement.to_location.as_deref())
        .bind(movement.supplier_id.map(uuid::Uuid::from))
        .bind(movement.recorded_by.map(uuid::Uuid::from))
        .bind(movement.delivered_by.map(uuid::Uuid::from))
        .bind(movement.cost)
        .bind(movement.notes.as_deref())
        .bind(movement.reference_type.as_deref())
        .bind(movement.reference_id.as_deref())
        .bind(movement.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id), err)]
    async fn increment_stock(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"
            INSERT INTO product_stock (tenant_id, product_id, current_stock, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (tenant_id, product_id)
            DO UPDATE SET
                current_stock = product_stock.current_stock + EXCLUDED.current_stock,
                updated_at = now()
            RETURNING current_stock
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(delta)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("increment_stock", e))?;

        row.try_get("current_stock")
            .map_err(|e| StoreError::Decode(format!("current_stock: {e}")))
    }

    async fn stock_level(&mut self, tenant_id: TenantId, product_id: ProductId) -> Result<i64, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"
            SELECT current_stock
            FROM product_stock
            WHERE tenant_id = $1 AND product_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("stock_level", e))?;

        match row {
            Some(row) => row
                .try_get("current_stock")
                .map_err(|e| StoreError::Decode(format!("current_stock: {e}"))),
            None => Ok(0),
        }
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, product_id = %product_id, location = %location),
        err
    )]
    async fn upsert_location(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
        location: &str,
        delta: i64,
    ) -> Result<LocationInventoryRecord, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"
            INSERT INTO location_inventory (tenant_id, product_id, location, quantity, reserved_qty, updated_at)
            VALUES ($1, $2, $3, $4, 0, now())
            ON CONFLICT (tenant_id, product_id, location)
            DO UPDATE SET
                quantity = location_inventory.quantity + EXCLUDED.quantity,
                updated_at = now()
            RETURNING tenant_id, product_id, location, quantity, reserved_qty, available_qty
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(location)
        .bind(delta)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_location", e))?;

        let record = LocationRow::from_row(&row).map_err(|e| StoreError::Decode(format!("location row: {e}")))?;
        LocationInventoryRecord::try_from(record)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait::async_trait]
impl ProductCatalog for PostgresLedgerStore {
    async fn exists(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM products WHERE tenant_id = $1 AND id = $2
            ) AS present
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product_exists", e))?;

        row.try_get("present")
            .map_err(|e| StoreError::Decode(format!("present: {e}")))
    }
}

#[async_trait::async_trait]
impl MovementQuery for PostgresLedgerStore {
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, limit = pagination.limit, offset = pagination.offset), err)]
    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let product_param: Option<uuid::Uuid> = filter.product_id.map(uuid::Uuid::from);
        let type_param: Option<&str> = filter.movement_type.map(|t| t.as_str());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM stock_movements
            WHERE tenant_id = $1
                AND ($2::uuid IS NULL OR product_id = $2)
                AND ($3::text IS NULL OR movement_type = $3)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_param)
        .bind(type_param)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_movements", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Decode(format!("total: {e}")))?;

        let rows = sqlx::query(
            r#"
            SELECT
                m.id,
                m.tenant_id,
                m.movement_type,
                m.product_id,
                m.quantity,
                m.from_location,
                m.to_location,
                m.supplier_id,
                m.recorded_by,
                m.delivered_by,
                m.cost,
                m.notes,
                m.reference_type,
                m.reference_id,
                m.created_at,
                p.name AS product_name,
                p.unit AS product_unit,
                s.name AS supplier_name,
                rb.name AS recorded_by_name,
                db.name AS delivered_by_name
            FROM stock_movements m
            LEFT JOIN products p ON p.tenant_id = m.tenant_id AND p.id = m.product_id
            LEFT JOIN suppliers s ON s.tenant_id = m.tenant_id AND s.id = m.supplier_id
            LEFT JOIN staff rb ON rb.tenant_id = m.tenant_id AND rb.id = m.recorded_by
            LEFT JOIN staff db ON db.tenant_id = m.tenant_id AND db.id = m.delivered_by
            WHERE m.tenant_id = $1
                AND ($2::uuid IS NULL OR m.product_id = $2)
                AND ($3::text IS NULL OR m.movement_type = $3)
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_param)
        .bind(type_param)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let view = MovementViewRow::from_row(&row)
                .map_err(|e| StoreError::Decode(format!("movement row: {e}")))?;
            items.push(view.try_into()?);
        }

        let total = total.max(0) as u64;
        Ok(MovementPage {
            items,
            total,
            has_more: pagination.has_more(total),
        })
    }

    async fn product_history(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                tenant_id,
                movement_type,
                product_id,
                quantity,
                from_location,
                to_location,
                supplier_id,
                recorded_by,
                delivered_by,
                cost,
                notes,
                reference_type,
                reference_id,
                created_at
            FROM stock_movements
            WHERE tenant_id = $1 AND product_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product_history", e))?;

        rows.iter()
            .map(|row| {
                MovementRow::from_row(row)
                    .map_err(|e| StoreError::Decode(format!("movement row: {e}")))?
                    .try_into()
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl StockReader for PostgresLedgerStore {
    async fn product_stock(&self, tenant_id: TenantId, product_id: ProductId) -> Result<ProductStock, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT current_stock
            FROM product_stock
            WHERE tenant_id = $1 AND product_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product_stock", e))?;

        let current = match row {
            Some(row) => row
                .try_get("current_stock")
                .map_err(|e| StoreError::Decode(format!("current_stock: {e}")))?,
            None => 0,
        };
        Ok(ProductStock::new(tenant_id, product_id, current))
    }

    async fn location_records(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<LocationInventoryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, product_id, location, quantity, reserved_qty, available_qty
            FROM location_inventory
            WHERE tenant_id = $1 AND product_id = $2
            ORDER BY location ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("location_records", e))?;

        rows.iter()
            .map(|row| {
                LocationRow::from_row(row)
                    .map_err(|e| StoreError::Decode(format!("location row: {e}")))
                    .and_then(LocationInventoryRecord::try_from)
            })
            .collect()
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some(code) if code.starts_with("23") => StoreError::Constraint(msg),
                // numeric_value_out_of_range: counter or cost overflow
                Some("22003") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        sqlx::Error::RowNotFound => StoreError::Backend(format!("unexpected row not found in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct MovementRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    movement_type: String,
    product_id: uuid::Uuid,
    quantity: i64,
    from_location: Option<String>,
    to_location: Option<String>,
    supplier_id: Option<uuid::Uuid>,
    recorded_by: Option<uuid::Uuid>,
    delivered_by: Option<uuid::Uuid>,
    cost: Option<Decimal>,
    notes: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            movement_type: row.try_get("movement_type")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            from_location: row.try_get("from_location")?,
            to_location: row.try_get("to_location")?,
            supplier_id: row.try_get("supplier_id")?,
            recorded_by: row.try_get("recorded_by")?,
            delivered_by: row.try_get("delivered_by")?,
            cost: row.try_get("cost")?,
            notes: row.try_get("notes")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type: MovementType = row
            .movement_type
            .parse()
            .map_err(|e| StoreError::Decode(format!("movement_type: {e}")))?;

        Ok(Movement {
            id: MovementId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            movement_type,
            product_id: ProductId::from_uuid(row.product_id),
            quantity: row.quantity,
            from_location: row.from_location,
            to_location: row.to_location,
            supplier_id: row.supplier_id.map(SupplierId::from_uuid),
            recorded_by: row.recorded_by.map(ActorId::from_uuid),
            delivered_by: row.delivered_by.map(ActorId::from_uuid),
            cost: row.cost,
            notes: row.notes,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct MovementViewRow {
    movement: MovementRow,
    product_name: Option<String>,
    product_unit: Option<String>,
    supplier_name: Option<String>,
    recorded_by_name: Option<String>,
    delivered_by_name: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for MovementViewRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementViewRow {
            movement: MovementRow::from_row(row)?,
            product_name: row.try_get("product_name")?,
            product_unit: row.try_get("product_unit")?,
            supplier_name: row.try_get("supplier_name")?,
            recorded_by_name: row.try_get("recorded_by_name")?,
            delivered_by_name: row.try_get("delivered_by_name")?,
        })
    }
}

impl TryFrom<MovementViewRow> for MovementView {
    type Error = StoreError;

    fn try_from(row: MovementViewRow) -> Result<Self, Self::Error> {
        Ok(MovementView {
            movement: row.movement.try_into()?,
            product_name: row.product_name,
            product_unit: row.product_unit,
            supplier_name: row.supplier_name,
            recorded_by_name: row.recorded_by_name,
            delivered_by_name: row.delivered_by_name,
        })
    }
}

#[derive(Debug)]
struct LocationRow {
    tenant_id: uuid::Uuid,
    product_id: uuid::Uuid,
    location: String,
    quantity: i64,
    reserved_qty: i64,
    available_qty: i64,
}

impl<'r> FromRow<'r, PgRow> for LocationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LocationRow {
            tenant_id: row.try_get("tenant_id")?,
            product_id: row.try_get("product_id")?,
            location: row.try_get("location")?,
            quantity: row.try_get("quantity")?,
            reserved_qty: row.try_get("reserved_qty")?,
            available_qty: row.try_get("available_qty")?,
        })
    }
}

impl TryFrom<LocationRow> for LocationInventoryRecord {
    type Error = StoreError;

    /// The generated `available_qty` column must agree with the domain derivation.
    fn try_from(row: LocationRow) -> Result<Self, Self::Error> {
        let stored_available = row.available_qty;
        let record = LocationInventoryRecord::new(
            TenantId::from_uuid(row.tenant_id),
            ProductId::from_uuid(row.product_id),
            row.location,
            row.quantity,
            row.reserved_qty,
        )
        .map_err(|e| StoreError::Decode(format!("location row: {e}")))?;

        if record.available_qty() != stored_available {
            return Err(StoreError::Decode(format!(
                "location {}: stored available_qty {} != quantity - reserved_qty {}",
                record.location(),
                stored_available,
                record.available_qty()
            )));
        }
        Ok(record)
    }
}
