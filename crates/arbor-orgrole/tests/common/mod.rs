//! Common test utilities for arbor-orgrole integration tests.
//!
//! All tests run against the in-memory stores for isolation and speed; the
//! context wires one reconciler per test with two tenants for isolation
//! checks.

use std::sync::Arc;

use uuid::Uuid;

use arbor_orgrole::directory::{InMemoryHierarchy, InMemoryRoleStore, InMemoryUserStore};
use arbor_orgrole::events::InMemoryNotifier;
use arbor_orgrole::services::{GrantValidator, MappingReconciler};
use arbor_orgrole::store::InMemoryMappingStore;
use arbor_orgrole::types::{
    GrantRequest, OrgId, OrganizationUserRoleMapping, PatchOp, PatchPath, RoleId, UserId,
};

/// The in-memory stores backing one test.
#[derive(Clone)]
pub struct TestStores {
    pub mappings: Arc<InMemoryMappingStore>,
    pub hierarchy: Arc<InMemoryHierarchy>,
    pub users: Arc<InMemoryUserStore>,
    pub roles: Arc<InMemoryRoleStore>,
    pub notifier: Arc<InMemoryNotifier>,
}

impl TestStores {
    pub fn new() -> Self {
        Self {
            mappings: Arc::new(InMemoryMappingStore::new()),
            hierarchy: Arc::new(InMemoryHierarchy::new()),
            users: Arc::new(InMemoryUserStore::new()),
            roles: Arc::new(InMemoryRoleStore::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
        }
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

/// Test context containing the stores, the reconciler, and two tenants.
pub struct TestContext {
    pub stores: TestStores,
    pub reconciler: MappingReconciler,
    pub tenant_a: Uuid,
    pub tenant_b: Uuid,
}

impl TestContext {
    /// Create a new isolated test context.
    pub fn new() -> Self {
        let stores = TestStores::new();
        let validator = GrantValidator::new(
            stores.hierarchy.clone(),
            stores.users.clone(),
            stores.roles.clone(),
            stores.mappings.clone(),
        );
        let reconciler = MappingReconciler::new(
            stores.mappings.clone(),
            stores.hierarchy.clone(),
            validator,
            stores.notifier.clone(),
        );
        Self {
            stores,
            reconciler,
            tenant_a: Uuid::new_v4(),
            tenant_b: Uuid::new_v4(),
        }
    }

    /// Register an organization under an optional parent.
    pub async fn org(&self, tenant: Uuid, parent: Option<OrgId>) -> OrgId {
        let org = OrgId::new();
        self.stores.hierarchy.add_organization(tenant, org, parent).await;
        org
    }

    /// Register a user in the tenant user store.
    pub async fn user(&self, tenant: Uuid) -> UserId {
        let user = UserId::new();
        self.stores.users.add_user(tenant, user).await;
        user
    }

    /// Register an internal role.
    pub async fn role(&self, tenant: Uuid, name: &str) -> RoleId {
        let role = RoleId::new();
        self.stores.roles.add_internal_role(tenant, role, name).await;
        role
    }

    /// All stored rows of a tenant.
    pub async fn rows(&self, tenant: Uuid) -> Vec<OrganizationUserRoleMapping> {
        self.stores.mappings.all_rows(tenant).await
    }

    /// Rows of a tenant materialized at one organization.
    pub async fn rows_at(&self, tenant: Uuid, org: OrgId) -> Vec<OrganizationUserRoleMapping> {
        self.rows(tenant)
            .await
            .into_iter()
            .filter(|r| r.organization_id == org)
            .collect()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Build one grant request.
pub fn grant(user_id: UserId, forced: bool, include_sub_orgs: bool) -> GrantRequest {
    GrantRequest {
        user_id,
        forced,
        include_sub_orgs,
    }
}

/// Build the two-operation patch list for a target state.
pub fn patch_ops(forced: bool, include_sub_orgs: bool) -> [PatchOp; 2] {
    [
        PatchOp {
            path: PatchPath::Forced,
            value: forced,
        },
        PatchOp {
            path: PatchPath::IncludeSubOrgs,
            value: include_sub_orgs,
        },
    ]
}
