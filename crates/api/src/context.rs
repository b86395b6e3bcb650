use stockledger_core::{ActorId, TenantId};

/// Tenant context for a request.
///
/// This is immutable and must be present for all ledger routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Acting identity for a request, when the identity layer supplied one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ActorContext {
    actor_id: Option<ActorId>,
}

impl ActorContext {
    pub fn new(actor_id: Option<ActorId>) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> Option<ActorId> {
        self.actor_id
    }
}
