//! Mapping storage trait and in-memory implementation.
//!
//! The durable backend lives in `arbor-db`; the in-memory store here backs
//! unit and integration tests.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{MappingFilter, MappingKey, OrgId, OrganizationUserRoleMapping, RoleId, UserId};

/// Trait for organization-user-role mapping storage backends.
///
/// All methods are tenant-scoped. Inserts are idempotent on the identity
/// 5-tuple: inserting a row whose key already exists is a no-op, which keeps
/// the self-healing cascade restore safe under concurrent writers.
#[async_trait::async_trait]
pub trait MappingStore: Send + Sync {
    /// Direct existence probe against the identity 5-tuple.
    async fn mapping_exists(&self, tenant_id: Uuid, key: &MappingKey) -> Result<bool>;

    /// Fetch every row for `(user, role)` whose `organization_id` is in
    /// `orgs`. This is the state snapshot the reconciliation planner works
    /// from.
    async fn mappings_in_orgs(
        &self,
        tenant_id: Uuid,
        user_id: UserId,
        role_id: RoleId,
        orgs: &[OrgId],
    ) -> Result<Vec<OrganizationUserRoleMapping>>;

    /// Insert a batch of rows atomically.
    async fn insert(&self, tenant_id: Uuid, rows: Vec<OrganizationUserRoleMapping>) -> Result<()>;

    /// Delete the rows identified by `keys`. Returns the number of rows
    /// removed; keys with no matching row are skipped.
    async fn delete(&self, tenant_id: Uuid, keys: &[MappingKey]) -> Result<u64>;

    /// Apply an insert set and a delete set as one atomic operation.
    ///
    /// Either both sets apply in full or neither does; a partially applied
    /// cascade must never be observable.
    async fn apply(
        &self,
        tenant_id: Uuid,
        to_insert: Vec<OrganizationUserRoleMapping>,
        to_delete: Vec<MappingKey>,
    ) -> Result<()>;

    /// Remove every row for a user across all organizations. Used when the
    /// user is deleted outright; no cascade rules apply.
    async fn delete_all_for_user(&self, tenant_id: Uuid, user_id: UserId) -> Result<u64>;

    /// Page through the rows materialized at `org` for `role`, narrowed by
    /// `filter` before paging applies.
    async fn list_by_org_role(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        role_id: RoleId,
        filter: &MappingFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<OrganizationUserRoleMapping>>;

    /// List the rows materialized at `org` for `user`.
    async fn list_by_org_user(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<OrganizationUserRoleMapping>>;
}

/// In-memory mapping store for testing.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    rows: Arc<RwLock<Vec<OrganizationUserRoleMapping>>>,
}

impl InMemoryMappingStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot every row of a tenant, in insertion order.
    pub async fn all_rows(&self, tenant_id: Uuid) -> Vec<OrganizationUserRoleMapping> {
        let rows = self.rows.read().await;
        rows.iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }

    fn matches(row: &OrganizationUserRoleMapping, tenant_id: Uuid, key: &MappingKey) -> bool {
        row.tenant_id == tenant_id && row.key() == *key
    }
}

#[async_trait::async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn mapping_exists(&self, tenant_id: Uuid, key: &MappingKey) -> Result<bool> {
        let rows = self.rows.read().await;
        Ok(rows.iter().any(|r| Self::matches(r, tenant_id, key)))
    }

    async fn mappings_in_orgs(
        &self,
        tenant_id: Uuid,
        user_id: UserId,
        role_id: RoleId,
        orgs: &[OrgId],
    ) -> Result<Vec<OrganizationUserRoleMapping>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.user_id == user_id
                    && r.role_id == role_id
                    && orgs.contains(&r.organization_id)
            })
            .cloned()
            .collect())
    }

    async fn insert(&self, tenant_id: Uuid, new: Vec<OrganizationUserRoleMapping>) -> Result<()> {
        let mut rows = self.rows.write().await;
        for row in new {
            debug_assert_eq!(row.tenant_id, tenant_id);
            let key = row.key();
            if !rows.iter().any(|r| Self::matches(r, tenant_id, &key)) {
                rows.push(row);
            }
        }
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, keys: &[MappingKey]) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| !keys.iter().any(|k| Self::matches(r, tenant_id, k)));
        Ok((before - rows.len()) as u64)
    }

    async fn apply(
        &self,
        tenant_id: Uuid,
        to_insert: Vec<OrganizationUserRoleMapping>,
        to_delete: Vec<MappingKey>,
    ) -> Result<()> {
        // One write guard covers both sets, so readers observe either the
        // old state or the fully reconciled one.
        let mut rows = self.rows.write().await;
        rows.retain(|r| !to_delete.iter().any(|k| Self::matches(r, tenant_id, k)));
        for row in to_insert {
            let key = row.key();
            if !rows.iter().any(|r| Self::matches(r, tenant_id, &key)) {
                rows.push(row);
            }
        }
        Ok(())
    }

    async fn delete_all_for_user(&self, tenant_id: Uuid, user_id: UserId) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| !(r.tenant_id == tenant_id && r.user_id == user_id));
        Ok((before - rows.len()) as u64)
    }

    async fn list_by_org_role(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        role_id: RoleId,
        filter: &MappingFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<OrganizationUserRoleMapping>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.organization_id == organization_id
                    && r.role_id == role_id
                    && filter.matches(r)
            })
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_by_org_user(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<OrganizationUserRoleMapping>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.organization_id == organization_id
                    && r.user_id == user_id
            })
            .cloned()
            .collect())
    }
}
