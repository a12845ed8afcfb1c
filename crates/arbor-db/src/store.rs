//! PostgreSQL implementations of the arbor-orgrole collaborator traits.
//!
//! Each adapter wraps a [`DbPool`] and translates between the domain types
//! and the row models in [`crate::models`].

use async_trait::async_trait;
use uuid::Uuid;

use arbor_orgrole::directory::{OrganizationHierarchyProvider, RoleStore, UserStore};
use arbor_orgrole::store::MappingStore;
use arbor_orgrole::types::{
    MappingFilter, MappingKey, OrgId, OrganizationUserRoleMapping, RoleId, RoleRef, UserId,
};
use arbor_orgrole::Result;

use crate::models::{MappingIdentity, NewMapping, OrgRole, OrgUser, OrgUserRoleMapping, Organization};
use crate::pool::DbPool;

fn to_identity(key: &MappingKey) -> MappingIdentity {
    MappingIdentity {
        organization_id: key.organization_id.into_inner(),
        user_id: key.user_id.into_inner(),
        role_id: key.role_id.into_inner(),
        assigned_level_organization_id: key.assigned_level_organization_id.into_inner(),
        forced: key.forced,
    }
}

fn to_new_mapping(row: &OrganizationUserRoleMapping) -> NewMapping {
    NewMapping {
        organization_id: row.organization_id.into_inner(),
        user_id: row.user_id.into_inner(),
        role_id: row.role_id.into_inner(),
        assigned_level_organization_id: row.assigned_level_organization_id.into_inner(),
        forced: row.forced,
    }
}

fn to_domain(row: OrgUserRoleMapping) -> OrganizationUserRoleMapping {
    OrganizationUserRoleMapping {
        tenant_id: row.tenant_id,
        organization_id: OrgId::from(row.organization_id),
        user_id: UserId::from(row.user_id),
        role_id: RoleId::from(row.role_id),
        assigned_level_organization_id: OrgId::from(row.assigned_level_organization_id),
        forced: row.forced,
        created_at: row.created_at,
    }
}

/// Mapping store backed by the `org_user_role_mappings` table.
#[derive(Clone)]
pub struct PgMappingStore {
    pool: DbPool,
}

impl PgMappingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingStore for PgMappingStore {
    async fn mapping_exists(&self, tenant_id: Uuid, key: &MappingKey) -> Result<bool> {
        let exists =
            OrgUserRoleMapping::exists(self.pool.inner(), tenant_id, &to_identity(key)).await?;
        Ok(exists)
    }

    async fn mappings_in_orgs(
        &self,
        tenant_id: Uuid,
        user_id: UserId,
        role_id: RoleId,
        orgs: &[OrgId],
    ) -> Result<Vec<OrganizationUserRoleMapping>> {
        let org_ids: Vec<Uuid> = orgs.iter().map(|o| o.into_inner()).collect();
        let rows = OrgUserRoleMapping::find_in_orgs(
            self.pool.inner(),
            tenant_id,
            user_id.into_inner(),
            role_id.into_inner(),
            &org_ids,
        )
        .await?;
        Ok(rows.into_iter().map(to_domain).collect())
    }

    async fn insert(&self, tenant_id: Uuid, rows: Vec<OrganizationUserRoleMapping>) -> Result<()> {
        let new_rows: Vec<NewMapping> = rows.iter().map(to_new_mapping).collect();
        OrgUserRoleMapping::insert_batch(self.pool.inner(), tenant_id, &new_rows).await?;
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, keys: &[MappingKey]) -> Result<u64> {
        let identities: Vec<MappingIdentity> = keys.iter().map(to_identity).collect();
        let deleted =
            OrgUserRoleMapping::delete_batch(self.pool.inner(), tenant_id, &identities).await?;
        Ok(deleted)
    }

    async fn apply(
        &self,
        tenant_id: Uuid,
        to_insert: Vec<OrganizationUserRoleMapping>,
        to_delete: Vec<MappingKey>,
    ) -> Result<()> {
        let inserts: Vec<NewMapping> = to_insert.iter().map(to_new_mapping).collect();
        let deletes: Vec<MappingIdentity> = to_delete.iter().map(to_identity).collect();
        OrgUserRoleMapping::apply_diff(self.pool.inner(), tenant_id, &inserts, &deletes).await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, tenant_id: Uuid, user_id: UserId) -> Result<u64> {
        let deleted = OrgUserRoleMapping::delete_all_for_user(
            self.pool.inner(),
            tenant_id,
            user_id.into_inner(),
        )
        .await?;
        Ok(deleted)
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
        let rows = OrgUserRoleMapping::list_by_org_role(
            self.pool.inner(),
            tenant_id,
            organization_id.into_inner(),
            role_id.into_inner(),
            filter.forced,
            filter
                .assigned_level_organization_id
                .map(OrgId::into_inner),
            offset,
            limit,
        )
        .await?;
        Ok(rows.into_iter().map(to_domain).collect())
    }

    async fn list_by_org_user(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<OrganizationUserRoleMapping>> {
        let rows = OrgUserRoleMapping::list_by_org_user(
            self.pool.inner(),
            tenant_id,
            organization_id.into_inner(),
            user_id.into_inner(),
        )
        .await?;
        Ok(rows.into_iter().map(to_domain).collect())
    }
}

/// Hierarchy provider backed by the `organizations` table.
#[derive(Clone)]
pub struct PgHierarchyProvider {
    pool: DbPool,
}

impl PgHierarchyProvider {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationHierarchyProvider for PgHierarchyProvider {
    async fn organization_exists(&self, tenant_id: Uuid, organization_id: OrgId) -> Result<bool> {
        let exists =
            Organization::exists(self.pool.inner(), tenant_id, organization_id.into_inner())
                .await?;
        Ok(exists)
    }

    async fn descendant_ids(&self, tenant_id: Uuid, organization_id: OrgId) -> Result<Vec<OrgId>> {
        let ids = Organization::descendant_ids(
            self.pool.inner(),
            tenant_id,
            organization_id.into_inner(),
        )
        .await?;
        Ok(ids.into_iter().map(OrgId::from).collect())
    }
}

/// User store backed by the `org_users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn user_exists(&self, tenant_id: Uuid, user_id: UserId) -> Result<bool> {
        let exists = OrgUser::exists(self.pool.inner(), tenant_id, user_id.into_inner()).await?;
        Ok(exists)
    }
}

/// Role store backed by the `org_roles` table.
#[derive(Clone)]
pub struct PgRoleStore {
    pool: DbPool,
}

impl PgRoleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn resolve_internal_role(
        &self,
        tenant_id: Uuid,
        role_id: RoleId,
    ) -> Result<Option<RoleRef>> {
        let role = OrgRole::find_by_id(self.pool.inner(), tenant_id, role_id.into_inner()).await?;
        Ok(role.map(|r| RoleRef {
            id: RoleId::from(r.id),
            name: r.name,
            internal: r.internal,
        }))
    }
}
