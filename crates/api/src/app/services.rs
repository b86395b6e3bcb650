use std::sync::Arc;

use stockledger_core::{ActorId, ProductId, TenantId};
use stockledger_infra::{
    ConsistencyReport, InMemoryDirectory, LedgerConfig, LedgerError, MovementRecorder, StorageBackend,
    audit_product,
    ledger_store::{
        InMemoryLedgerStore, MovementFilter, MovementPage, MovementQuery, Pagination, PostgresLedgerStore, StockReader,
        StoreError,
    },
};
use stockledger_inventory::{RecordMovement, RecordedMovement, StockSnapshot};

type InMemoryRecorder = MovementRecorder<InMemoryLedgerStore, Arc<InMemoryDirectory>>;
type PersistentRecorder = MovementRecorder<PostgresLedgerStore, PostgresLedgerStore>;

/// Ledger wiring shared by every handler.
#[derive(Clone)]
pub enum AppServices {
    InMemory {
        recorder: InMemoryRecorder,
        store: InMemoryLedgerStore,
        query_max_limit: u32,
    },
    Persistent {
        recorder: PersistentRecorder,
        store: PostgresLedgerStore,
        query_max_limit: u32,
    },
}

impl AppServices {
    /// In-memory ledger over `directory` (dev/test).
    ///
    /// Only products registered in `directory` can move; the HTTP surface has no
    /// catalog endpoint, so callers seed it before serving.
    pub fn in_memory(directory: Arc<InMemoryDirectory>, query_max_limit: u32) -> Self {
        let store = InMemoryLedgerStore::with_directory(directory.clone());
        AppServices::InMemory {
            recorder: MovementRecorder::new(store.clone(), directory),
            store,
            query_max_limit,
        }
    }

    pub fn persistent(store: PostgresLedgerStore, query_max_limit: u32) -> Self {
        AppServices::Persistent {
            recorder: MovementRecorder::new(store.clone(), store.clone()),
            store,
            query_max_limit,
        }
    }

    pub fn pagination(&self, limit: Option<u32>, offset: Option<u32>) -> Pagination {
        let max = match self {
            AppServices::InMemory { query_max_limit, .. } => *query_max_limit,
            AppServices::Persistent { query_max_limit, .. } => *query_max_limit,
        };
        Pagination::new(limit, offset, max)
    }

    pub async fn record_movement(
        &self,
        tenant_id: TenantId,
        recorded_by: Option<ActorId>,
        request: RecordMovement,
    ) -> Result<RecordedMovement, LedgerError> {
        match self {
            AppServices::InMemory { recorder, .. } => recorder.record_movement(tenant_id, recorded_by, request).await,
            AppServices::Persistent { recorder, .. } => {
                recorder.record_movement(tenant_id, recorded_by, request).await
            }
        }
    }

    pub async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        let page = match self {
            AppServices::InMemory { store, .. } => store.list_movements(tenant_id, filter, pagination).await?,
            AppServices::Persistent { store, .. } => store.list_movements(tenant_id, filter, pagination).await?,
        };
        Ok(page)
    }

    pub async fn stock_snapshot(&self, tenant_id: TenantId, product_id: ProductId) -> Result<StockSnapshot, LedgerError> {
        let snapshot = match self {
            AppServices::InMemory { store, .. } => store.stock_snapshot(tenant_id, product_id).await?,
            AppServices::Persistent { store, .. } => store.stock_snapshot(tenant_id, product_id).await?,
        };
        Ok(snapshot)
    }

    pub async fn audit(&self, tenant_id: TenantId, product_id: ProductId) -> Result<ConsistencyReport, LedgerError> {
        match self {
            AppServices::InMemory { store, .. } => audit_product(store, tenant_id, product_id).await,
            AppServices::Persistent { store, .. } => audit_product(store, tenant_id, product_id).await,
        }
    }
}

/// Wire the backend selected by `config`.
pub async fn build_services(config: &LedgerConfig) -> Result<AppServices, StoreError> {
    match &config.storage {
        StorageBackend::InMemory => {
            tracing::warn!(
                "in-memory ledger: product catalog starts empty and nothing persists across restarts"
            );
            Ok(AppServices::in_memory(
                Arc::new(InMemoryDirectory::new()),
                config.query_max_limit,
            ))
        }
        StorageBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresLedgerStore::connect(database_url, *max_connections).await?;
            store.migrate().await?;
            tracing::info!(max_connections = *max_connections, "connected to postgres ledger");
            Ok(AppServices::persistent(store, config.query_max_limit))
        }
    }
}
