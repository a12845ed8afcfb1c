//! External collaborator traits: organization hierarchy, user store, role
//! store.
//!
//! The engine only consumes these through narrow interfaces; organization
//! CRUD, user identity, and role management live elsewhere. In-memory
//! implementations back the test suites.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{OrgId, RoleId, RoleRef, UserId};

/// Read access to the tenant's organization tree.
#[async_trait::async_trait]
pub trait OrganizationHierarchyProvider: Send + Sync {
    /// Whether the organization exists in the tenant.
    async fn organization_exists(&self, tenant_id: Uuid, organization_id: OrgId) -> Result<bool>;

    /// All current descendants of the organization, the organization itself
    /// excluded, in a stable order.
    async fn descendant_ids(&self, tenant_id: Uuid, organization_id: OrgId) -> Result<Vec<OrgId>>;
}

/// Existence oracle over the tenant user store.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Whether the user exists in the tenant.
    async fn user_exists(&self, tenant_id: Uuid, user_id: UserId) -> Result<bool>;
}

/// Resolution of internal roles.
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Resolve a role id. Returns `None` for unknown roles; roles managed by
    /// an external role-sharing feature resolve with `internal == false`.
    async fn resolve_internal_role(
        &self,
        tenant_id: Uuid,
        role_id: RoleId,
    ) -> Result<Option<RoleRef>>;
}

// ============================================================================
// In-Memory Implementations (for testing)
// ============================================================================

/// In-memory organization tree keyed by parent links.
#[derive(Debug, Default)]
pub struct InMemoryHierarchy {
    // (tenant, org) -> parent org
    parents: Arc<RwLock<HashMap<(Uuid, OrgId), Option<OrgId>>>>,
}

impl InMemoryHierarchy {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add an organization with an optional parent.
    pub async fn add_organization(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        parent_id: Option<OrgId>,
    ) {
        let mut parents = self.parents.write().await;
        parents.insert((tenant_id, organization_id), parent_id);
    }
}

#[async_trait::async_trait]
impl OrganizationHierarchyProvider for InMemoryHierarchy {
    async fn organization_exists(&self, tenant_id: Uuid, organization_id: OrgId) -> Result<bool> {
        let parents = self.parents.read().await;
        Ok(parents.contains_key(&(tenant_id, organization_id)))
    }

    async fn descendant_ids(&self, tenant_id: Uuid, organization_id: OrgId) -> Result<Vec<OrgId>> {
        let parents = self.parents.read().await;

        // Walk the tree over parent links; orgs with no entry have no
        // children by construction.
        let mut result = Vec::new();
        let mut frontier = vec![organization_id];
        while let Some(current) = frontier.pop() {
            let mut children: Vec<OrgId> = parents
                .iter()
                .filter(|((tenant, _), parent)| *tenant == tenant_id && **parent == Some(current))
                .map(|((_, org), _)| *org)
                .collect();
            children.sort_by_key(|o| o.into_inner());
            for child in children {
                result.push(child);
                frontier.push(child);
            }
        }
        Ok(result)
    }
}

/// In-memory user existence store.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, Vec<UserId>>>>,
}

impl InMemoryUserStore {
    /// Create an empty user store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a user in the tenant.
    pub async fn add_user(&self, tenant_id: Uuid, user_id: UserId) {
        let mut users = self.users.write().await;
        users.entry(tenant_id).or_default().push(user_id);
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn user_exists(&self, tenant_id: Uuid, user_id: UserId) -> Result<bool> {
        let users = self.users.read().await;
        Ok(users
            .get(&tenant_id)
            .is_some_and(|list| list.contains(&user_id)))
    }
}

/// In-memory role store.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    roles: Arc<RwLock<HashMap<(Uuid, RoleId), RoleRef>>>,
}

impl InMemoryRoleStore {
    /// Create an empty role store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register an internal role.
    pub async fn add_internal_role(&self, tenant_id: Uuid, role_id: RoleId, name: &str) {
        let mut roles = self.roles.write().await;
        roles.insert(
            (tenant_id, role_id),
            RoleRef {
                id: role_id,
                name: name.to_string(),
                internal: true,
            },
        );
    }

    /// Register an externally managed role, which mapping calls must reject.
    pub async fn add_shared_role(&self, tenant_id: Uuid, role_id: RoleId, name: &str) {
        let mut roles = self.roles.write().await;
        roles.insert(
            (tenant_id, role_id),
            RoleRef {
                id: role_id,
                name: name.to_string(),
                internal: false,
            },
        );
    }
}

#[async_trait::async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn resolve_internal_role(
        &self,
        tenant_id: Uuid,
        role_id: RoleId,
    ) -> Result<Option<RoleRef>> {
        let roles = self.roles.read().await;
        Ok(roles.get(&(tenant_id, role_id)).cloned())
    }
}
