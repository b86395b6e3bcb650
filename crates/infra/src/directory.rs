//! In-memory tenant directories: products, suppliers and staff.
//!
//! The ledger does not own these records. It only needs to know whether a
//! product exists (before recording a movement) and which names to show next to
//! a movement in history listings. Intended for tests/dev; the Postgres backend
//! reads the same facts from its own tables.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, ProductId, SupplierId, TenantId};

use crate::ledger_store::{ProductCatalog, StoreError};

/// Catalog facts the ledger shows next to movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub name: String,
    pub unit: Option<String>,
}

/// Tenant-isolated map; every key is paired with its tenant.
#[derive(Debug)]
struct TenantTable<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> Default for TenantTable<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> TenantTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn get(&self, tenant_id: TenantId, key: K) -> Result<Option<V>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("directory lock poisoned".to_string()))?;
        Ok(map.get(&(tenant_id, key)).cloned())
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("directory lock poisoned".to_string()))?;
        map.insert((tenant_id, key), value);
        Ok(())
    }
}

/// In-memory product catalog plus supplier/staff name lookups.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    products: TenantTable<ProductId, ProductEntry>,
    suppliers: TenantTable<SupplierId, String>,
    staff: TenantTable<ActorId, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        name: impl Into<String>,
        unit: Option<String>,
    ) -> Result<(), StoreError> {
        self.products.upsert(
            tenant_id,
            product_id,
            ProductEntry {
                name: name.into(),
                unit,
            },
        )
    }

    pub fn register_supplier(
        &self,
        tenant_id: TenantId,
        supplier_id: SupplierId,
        name: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.suppliers.upsert(tenant_id, supplier_id, name.into())
    }

    pub fn register_staff(&self, tenant_id: TenantId, actor_id: ActorId, name: impl Into<String>) -> Result<(), StoreError> {
        self.staff.upsert(tenant_id, actor_id, name.into())
    }

    pub fn product(&self, tenant_id: TenantId, product_id: ProductId) -> Result<Option<ProductEntry>, StoreError> {
        self.products.get(tenant_id, product_id)
    }

    pub fn supplier_name(&self, tenant_id: TenantId, supplier_id: SupplierId) -> Result<Option<String>, StoreError> {
        self.suppliers.get(tenant_id, supplier_id)
    }

    pub fn staff_name(&self, tenant_id: TenantId, actor_id: ActorId) -> Result<Option<String>, StoreError> {
        self.staff.get(tenant_id, actor_id)
    }
}

#[async_trait::async_trait]
impl ProductCatalog for InMemoryDirectory {
    async fn exists(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, StoreError> {
        Ok(self.product(tenant_id, product_id)?.is_some())
    }
}
