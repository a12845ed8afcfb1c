//! The mapping reconciler: add, patch, delete, and query operations over
//! organization-user-role mappings.
//!
//! Every mutating operation snapshots the grant's stored state, lets the
//! pure planner compute the diff, and applies it as one atomic store
//! operation. Writers on the same `(org, user, role)` grant are serialized
//! through a per-grant keyed mutex so that read-then-act races cannot
//! produce duplicate or orphaned rows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;
use uuid::Uuid;

use crate::directory::OrganizationHierarchyProvider;
use crate::error::Result;
use crate::events::{
    publish_event, EventNotifier, MappingEvent, RoleMappingRevoked, RoleMappingRevoking,
    RoleMappingsAssigned, RoleMappingsAssigning,
};
use crate::services::plan::{plan_add, plan_delete, plan_patch, GrantState};
use crate::services::validation::GrantValidator;
use crate::store::MappingStore;
use crate::types::{
    GrantRequest, MappingFilter, MappingKey, OrgId, PatchOp, PatchSet, RoleId, RoleRecord, UserId,
    UserRecord,
};

type GrantKey = (Uuid, OrgId, UserId, RoleId);

type LockTable = StdMutex<HashMap<GrantKey, Arc<Mutex<()>>>>;

/// Per-grant lock table serializing the read-compute-apply span of writers
/// on the same grant.
///
/// Entries are evicted when the last holder's guard drops, so the table
/// size tracks the number of grants currently being written, not the number
/// ever written.
#[derive(Default)]
struct GrantLocks {
    table: Arc<LockTable>,
}

fn lock_table(table: &LockTable) -> StdMutexGuard<'_, HashMap<GrantKey, Arc<Mutex<()>>>> {
    match table.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Exclusive hold on one grant.
///
/// On drop, removes the table entry if no other holder or waiter has a
/// clone of the mutex: the entry itself plus our own guard account for two
/// strong references, anything above that is a concurrent writer.
struct GrantGuard {
    _permit: OwnedMutexGuard<()>,
    table: Arc<LockTable>,
    key: GrantKey,
}

impl Drop for GrantGuard {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        if let Some(entry) = table.get(&self.key) {
            if Arc::strong_count(entry) == 2 {
                table.remove(&self.key);
            }
        }
    }
}

impl GrantLocks {
    async fn acquire(&self, key: GrantKey) -> GrantGuard {
        let lock = {
            let mut table = lock_table(&self.table);
            table.entry(key).or_default().clone()
        };
        let permit = lock.lock_owned().await;
        GrantGuard {
            _permit: permit,
            table: Arc::clone(&self.table),
            key,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock_table(&self.table).len()
    }
}

/// Reconciles organization-user-role mappings across the tenant's
/// organization tree.
pub struct MappingReconciler {
    store: Arc<dyn MappingStore>,
    hierarchy: Arc<dyn OrganizationHierarchyProvider>,
    validator: GrantValidator,
    notifier: Arc<dyn EventNotifier>,
    locks: GrantLocks,
}

impl MappingReconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn MappingStore>,
        hierarchy: Arc<dyn OrganizationHierarchyProvider>,
        validator: GrantValidator,
        notifier: Arc<dyn EventNotifier>,
    ) -> Self {
        Self {
            store,
            hierarchy,
            validator,
            notifier,
            locks: GrantLocks::default(),
        }
    }

    /// Add one grant per user at an organization.
    ///
    /// The whole batch validates before any write and inserts in one atomic
    /// batch; a single validation failure aborts the call with no inserts.
    /// After commit a post-assignment event fires carrying the issuing org,
    /// role, and per-user cascade flags; its failure surfaces as a server
    /// error even though the rows are already committed.
    #[instrument(skip(self, grants), fields(tenant_id = %tenant_id, organization_id = %organization_id, role_id = %role_id, grant_count = grants.len()))]
    pub async fn add_mappings(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        role_id: RoleId,
        grants: Vec<GrantRequest>,
    ) -> Result<()> {
        if grants.is_empty() {
            return Ok(());
        }

        let pre = RoleMappingsAssigning {
            organization_id,
            role_id,
            grants: grants.clone(),
        };
        if let Err(e) = publish_event(self.notifier.as_ref(), tenant_id, &pre).await {
            tracing::warn!(
                error = %e,
                event = RoleMappingsAssigning::EVENT_TYPE,
                "pre-assign event dropped"
            );
        }

        let _guards = self
            .lock_batch(tenant_id, organization_id, role_id, &grants)
            .await;

        let descendants = self
            .hierarchy
            .descendant_ids(tenant_id, organization_id)
            .await?;

        let mut to_insert = Vec::new();
        for grant in &grants {
            self.validator
                .validate(
                    tenant_id,
                    organization_id,
                    grant.user_id,
                    role_id,
                    grant.forced,
                )
                .await?;
            to_insert.extend(plan_add(
                tenant_id,
                organization_id,
                role_id,
                &descendants,
                grant,
            )?);
        }

        self.store.insert(tenant_id, to_insert).await?;

        let post = RoleMappingsAssigned {
            organization_id,
            role_id,
            grants,
        };
        publish_event(self.notifier.as_ref(), tenant_id, &post).await
    }

    /// Toggle a grant's cascade mode.
    ///
    /// Takes exactly two replace operations, one per patchable path, decodes
    /// them into the target state, and applies the minimal add/remove diff
    /// between the stored state and that target.
    #[instrument(skip(self, ops), fields(tenant_id = %tenant_id, organization_id = %organization_id, role_id = %role_id, user_id = %user_id))]
    pub async fn patch_mapping(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        role_id: RoleId,
        user_id: UserId,
        ops: &[PatchOp],
    ) -> Result<()> {
        let target = PatchSet::decode(ops)?;

        let _guard = self
            .locks
            .acquire((tenant_id, organization_id, user_id, role_id))
            .await;

        let state = self
            .snapshot(tenant_id, organization_id, user_id, role_id)
            .await?;
        let plan = plan_patch(&state, target)?;
        if plan.is_empty() {
            return Ok(());
        }
        self.store
            .apply(tenant_id, plan.to_insert, plan.to_delete)
            .await
    }

    /// Delete a single grant.
    ///
    /// The grant must be directly assigned at the organization. A forced
    /// grant revokes totally across the current subtree; a non-forced grant
    /// removes the descendants' independent rows only when
    /// `include_sub_orgs` is set.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, organization_id = %organization_id, role_id = %role_id, user_id = %user_id, include_sub_orgs))]
    pub async fn delete_mapping(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
        include_sub_orgs: bool,
    ) -> Result<()> {
        let pre = RoleMappingRevoking {
            organization_id,
            user_id,
            role_id,
            include_sub_orgs,
        };
        if let Err(e) = publish_event(self.notifier.as_ref(), tenant_id, &pre).await {
            tracing::warn!(
                error = %e,
                event = RoleMappingRevoking::EVENT_TYPE,
                "pre-revoke event dropped"
            );
        }

        let _guard = self
            .locks
            .acquire((tenant_id, organization_id, user_id, role_id))
            .await;

        let state = self
            .snapshot(tenant_id, organization_id, user_id, role_id)
            .await?;
        let plan = plan_delete(&state, include_sub_orgs)?;
        self.store
            .apply(tenant_id, Vec::new(), plan.to_delete)
            .await?;

        let post = RoleMappingRevoked {
            organization_id,
            user_id,
            role_id,
            include_sub_orgs,
        };
        publish_event(self.notifier.as_ref(), tenant_id, &post).await
    }

    /// Remove every mapping of a user across all organizations.
    ///
    /// Used when the user is deleted outright; an unconditional purge with
    /// no cascade rules. Returns the number of rows removed.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id))]
    pub async fn delete_all_mappings_of_user(
        &self,
        tenant_id: Uuid,
        user_id: UserId,
    ) -> Result<u64> {
        self.store.delete_all_for_user(tenant_id, user_id).await
    }

    /// Users holding `role` at `org`, as stored: forced and non-forced,
    /// direct and propagated, without re-deriving cascade semantics. The
    /// filter narrows over the stored projection fields before paging.
    pub async fn get_users_by_organization_and_role(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        role_id: RoleId,
        filter: &MappingFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<UserRecord>> {
        let rows = self
            .store
            .list_by_org_role(tenant_id, organization_id, role_id, filter, offset, limit)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| UserRecord {
                user_id: r.user_id,
                assigned_level_organization_id: r.assigned_level_organization_id,
                forced: r.forced,
            })
            .collect())
    }

    /// Roles held by `user` at `org`, as stored.
    pub async fn get_roles_by_organization_and_user(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<RoleRecord>> {
        let rows = self
            .store
            .list_by_org_user(tenant_id, organization_id, user_id)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| RoleRecord {
                role_id: r.role_id,
                assigned_level_organization_id: r.assigned_level_organization_id,
                forced: r.forced,
            })
            .collect())
    }

    /// Direct existence probe against the identity 5-tuple.
    pub async fn mapping_exists(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
        assigned_level_organization_id: OrgId,
        forced: bool,
    ) -> Result<bool> {
        let key = MappingKey {
            organization_id,
            user_id,
            role_id,
            assigned_level_organization_id,
            forced,
        };
        self.store.mapping_exists(tenant_id, &key).await
    }

    /// Snapshot the grant's stored rows across the org's current subtree.
    ///
    /// The descendant set is always re-queried, never cached from the time
    /// the cascade was created: if the hierarchy has grown since, the
    /// reconciliation covers the current, larger set.
    async fn snapshot(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<GrantState> {
        let descendants = self
            .hierarchy
            .descendant_ids(tenant_id, organization_id)
            .await?;
        let mut orgs = Vec::with_capacity(1 + descendants.len());
        orgs.push(organization_id);
        orgs.extend_from_slice(&descendants);
        let rows = self
            .store
            .mappings_in_orgs(tenant_id, user_id, role_id, &orgs)
            .await?;
        Ok(GrantState {
            tenant_id,
            organization_id,
            user_id,
            role_id,
            descendants,
            rows,
        })
    }

    /// Acquire the per-grant locks for a batch, in a stable order so two
    /// concurrent batches over overlapping user sets cannot deadlock.
    async fn lock_batch(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        role_id: RoleId,
        grants: &[GrantRequest],
    ) -> Vec<GrantGuard> {
        let mut users: Vec<UserId> = grants.iter().map(|g| g.user_id).collect();
        users.sort_by_key(|u| u.into_inner());
        users.dedup();

        let mut guards = Vec::with_capacity(users.len());
        for user in users {
            guards.push(
                self.locks
                    .acquire((tenant_id, organization_id, user, role_id))
                    .await,
            );
        }
        guards
    }
}
