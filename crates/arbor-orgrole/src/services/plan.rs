//! Pure reconciliation planning.
//!
//! Every mutating operation first snapshots the stored rows for one grant
//! across the issuing organization and its current descendants, then computes
//! an exact insert-set and delete-set from that snapshot. The planner is pure
//! so the full (forced x includeSubOrgs) x (fresh x existing) decision table
//! is testable without storage.

use uuid::Uuid;

use crate::error::{OrgRoleError, Result};
use crate::types::{
    GrantRequest, MappingKey, OrgId, OrganizationUserRoleMapping, PatchSet, RoleId, UserId,
};

/// The computed diff for one operation: rows to insert and keys to delete,
/// applied as a single atomic store operation.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Rows to insert.
    pub to_insert: Vec<OrganizationUserRoleMapping>,
    /// Row identities to delete.
    pub to_delete: Vec<MappingKey>,
}

impl ReconcilePlan {
    /// Whether the plan changes anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty()
    }
}

/// Snapshot of one grant's stored state across a subtree.
///
/// `rows` holds every mapping for `(user, role)` whose organization is the
/// issuing org or one of its current descendants, regardless of provenance
/// or forced flag.
#[derive(Debug, Clone)]
pub struct GrantState {
    pub tenant_id: Uuid,
    pub organization_id: OrgId,
    pub user_id: UserId,
    pub role_id: RoleId,
    /// Current descendants of the issuing organization, the org excluded.
    pub descendants: Vec<OrgId>,
    pub rows: Vec<OrganizationUserRoleMapping>,
}

impl GrantState {
    /// The issuing organization followed by its descendants.
    fn subtree(&self) -> impl Iterator<Item = OrgId> + '_ {
        std::iter::once(self.organization_id).chain(self.descendants.iter().copied())
    }

    /// Whether any row exists at the issuing organization.
    pub fn has_mapping_at_org(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.organization_id == self.organization_id)
    }

    /// Whether a directly-assigned row (forced or not) exists at the issuing
    /// organization.
    pub fn has_direct_mapping(&self) -> bool {
        self.direct_forced_exists() || self.direct_non_forced_exists()
    }

    /// Whether the forced direct row exists at the issuing organization.
    pub fn direct_forced_exists(&self) -> bool {
        self.forced_row_exists_at(self.organization_id)
    }

    /// Whether the non-forced direct row exists at the issuing organization.
    pub fn direct_non_forced_exists(&self) -> bool {
        self.local_non_forced_exists_at(self.organization_id)
    }

    /// Whether a forced row of *this* cascade (provenance = issuing org)
    /// exists at `org`. Forced rows propagated from other ancestors carry a
    /// different provenance and never match.
    fn forced_row_exists_at(&self, org: OrgId) -> bool {
        self.rows.iter().any(|r| {
            r.organization_id == org
                && r.assigned_level_organization_id == self.organization_id
                && r.forced
        })
    }

    /// Whether a locally-assigned non-forced row exists at `org`.
    /// Non-forced cascade copies are materialized with the node's own id as
    /// provenance, so every independent row is local to its node.
    fn local_non_forced_exists_at(&self, org: OrgId) -> bool {
        self.rows.iter().any(|r| {
            r.organization_id == org && r.assigned_level_organization_id == org && !r.forced
        })
    }

    fn forced_row(&self, org: OrgId) -> OrganizationUserRoleMapping {
        OrganizationUserRoleMapping::new(
            self.tenant_id,
            org,
            self.user_id,
            self.role_id,
            self.organization_id,
            true,
        )
    }

    fn local_row(&self, org: OrgId) -> OrganizationUserRoleMapping {
        OrganizationUserRoleMapping::new(self.tenant_id, org, self.user_id, self.role_id, org, false)
    }

    fn forced_key(&self, org: OrgId) -> MappingKey {
        MappingKey {
            organization_id: org,
            user_id: self.user_id,
            role_id: self.role_id,
            assigned_level_organization_id: self.organization_id,
            forced: true,
        }
    }

    fn local_key(&self, org: OrgId) -> MappingKey {
        MappingKey {
            organization_id: org,
            user_id: self.user_id,
            role_id: self.role_id,
            assigned_level_organization_id: org,
            forced: false,
        }
    }
}

/// Expand one grant request into the rows it materializes.
///
/// A forced grant covers the issuing org and every current descendant with
/// the issuing org as provenance. A non-forced cascade materializes one
/// independent row per descendant, each with the descendant's own id as
/// provenance, indistinguishable from locally-issued grants.
pub fn plan_add(
    tenant_id: Uuid,
    organization_id: OrgId,
    role_id: RoleId,
    descendants: &[OrgId],
    grant: &GrantRequest,
) -> Result<Vec<OrganizationUserRoleMapping>> {
    if grant.forced && !grant.include_sub_orgs {
        return Err(OrgRoleError::InvalidCascadeCombination);
    }

    let mut rows = Vec::with_capacity(1 + descendants.len());
    if grant.forced {
        rows.push(OrganizationUserRoleMapping::new(
            tenant_id,
            organization_id,
            grant.user_id,
            role_id,
            organization_id,
            true,
        ));
        for descendant in descendants {
            rows.push(OrganizationUserRoleMapping::new(
                tenant_id,
                *descendant,
                grant.user_id,
                role_id,
                organization_id,
                true,
            ));
        }
    } else if grant.include_sub_orgs {
        rows.push(OrganizationUserRoleMapping::new(
            tenant_id,
            organization_id,
            grant.user_id,
            role_id,
            organization_id,
            false,
        ));
        for descendant in descendants {
            rows.push(OrganizationUserRoleMapping::new(
                tenant_id,
                *descendant,
                grant.user_id,
                role_id,
                *descendant,
                false,
            ));
        }
    } else {
        rows.push(OrganizationUserRoleMapping::new(
            tenant_id,
            organization_id,
            grant.user_id,
            role_id,
            organization_id,
            false,
        ));
    }
    Ok(rows)
}

/// Compute the patch diff transitioning a grant between cascade modes.
///
/// See the module docs for the decision table. The existing-direct branch
/// actively reconciles: promotion to forced removes the locally-assigned
/// non-forced rows across the subtree; demotion tears down the forced
/// cascade and ensures independent rows per the target. The fresh branch
/// (mappings exist at the org, none directly assigned there) only ever
/// inserts.
pub fn plan_patch(state: &GrantState, target: PatchSet) -> Result<ReconcilePlan> {
    if !state.has_mapping_at_org() {
        return Err(OrgRoleError::InvalidMapping {
            organization_id: state.organization_id,
            user_id: state.user_id,
            role_id: state.role_id,
        });
    }
    if target.forced && !target.include_sub_orgs {
        return Err(OrgRoleError::InvalidBooleanCombination);
    }

    let mut plan = ReconcilePlan::default();
    let fresh = !state.has_direct_mapping();

    match (target.forced, target.include_sub_orgs) {
        (true, true) => {
            for org in state.subtree() {
                if !fresh && state.local_non_forced_exists_at(org) {
                    plan.to_delete.push(state.local_key(org));
                }
                if !state.forced_row_exists_at(org) {
                    plan.to_insert.push(state.forced_row(org));
                }
            }
        }
        (false, true) => {
            for org in state.subtree() {
                if !fresh && state.forced_row_exists_at(org) {
                    plan.to_delete.push(state.forced_key(org));
                }
                if !state.local_non_forced_exists_at(org) {
                    plan.to_insert.push(state.local_row(org));
                }
            }
        }
        (false, false) => {
            if fresh {
                // Nothing to reconcile: no direct grant, nothing requested
                // beyond it.
                return Ok(plan);
            }
            // Demotion tears down the forced cascade; independent rows at
            // descendants from an earlier non-forced cascade stay untouched.
            for org in state.subtree() {
                if state.forced_row_exists_at(org) {
                    plan.to_delete.push(state.forced_key(org));
                }
            }
            if !state.direct_non_forced_exists() {
                plan.to_insert.push(state.local_row(state.organization_id));
            }
        }
        (true, false) => unreachable!("rejected above"),
    }

    Ok(plan)
}

/// Compute the delete set for a single grant.
///
/// A forced direct grant revokes totally: the forced cascade plus any
/// coexisting independent rows across the subtree. A non-forced direct grant
/// removes the issuing org's row, and the descendants' independent rows only
/// when `include_sub_orgs` is set.
pub fn plan_delete(state: &GrantState, include_sub_orgs: bool) -> Result<ReconcilePlan> {
    let direct_forced = state.direct_forced_exists();
    if !direct_forced && !state.direct_non_forced_exists() {
        return Err(OrgRoleError::InvalidDirectMapping {
            organization_id: state.organization_id,
            user_id: state.user_id,
            role_id: state.role_id,
        });
    }

    let mut plan = ReconcilePlan::default();
    if direct_forced {
        // A forced revoke wins over locally layered grants.
        for org in state.subtree() {
            if state.forced_row_exists_at(org) {
                plan.to_delete.push(state.forced_key(org));
            }
            if state.local_non_forced_exists_at(org) {
                plan.to_delete.push(state.local_key(org));
            }
        }
    } else {
        plan.to_delete.push(state.local_key(state.organization_id));
        if include_sub_orgs {
            for descendant in &state.descendants {
                if state.local_non_forced_exists_at(*descendant) {
                    plan.to_delete.push(state.local_key(*descendant));
                }
            }
        }
    }
    Ok(plan)
}
