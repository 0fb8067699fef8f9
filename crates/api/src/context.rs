use invista_core::{TenantId, UserId};

/// Tenant (company) context for a request.
///
/// This is immutable and must be present for all stock routes.
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

/// Principal context for a request (authenticated user + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<String>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<String>) -> Self {
        Self { user_id, roles }
    }

    /// The actor recorded on every movement written by this request.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}
