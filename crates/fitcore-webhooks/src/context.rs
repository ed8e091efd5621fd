//! Request context supplied by the platform's authentication layer.

use uuid::Uuid;

/// Authenticated tenant identity for an admin API request.
///
/// The platform's auth middleware (out of scope for this crate) validates
/// the caller and inserts this as an axum request extension before the
/// webhook routes run.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    /// The acting staff user, when known.
    pub actor_id: Option<Uuid>,
    /// Whether the caller may mutate subscriptions and retry deliveries.
    pub is_admin: bool,
}

impl TenantContext {
    /// Context for an administrator of the given tenant.
    pub fn admin(tenant_id: Uuid, actor_id: Option<Uuid>) -> Self {
        Self {
            tenant_id,
            actor_id,
            is_admin: true,
        }
    }

    /// Context for a read-only caller of the given tenant.
    pub fn read_only(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            is_admin: false,
        }
    }
}
