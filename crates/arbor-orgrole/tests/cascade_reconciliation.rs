//! Integration tests for cascade reconciliation across the organization
//! tree: forced propagation, non-forced independence, mode transitions, and
//! delete semantics.

mod common;

use arbor_orgrole::error::OrgRoleError;
use arbor_orgrole::MappingFilter;
use common::{grant, patch_ops, TestContext};

// ============================================================================
// Add
// ============================================================================

/// Adding the same grant twice with identical cascade flags fails the second
/// time; no duplicate rows result.
#[tokio::test]
async fn test_fresh_add_is_not_idempotent() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "org-admin").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, false, false)])
        .await
        .unwrap();

    let err = ctx
        .reconciler
        .add_mappings(tenant, org, role, vec![grant(user, false, false)])
        .await
        .unwrap_err();

    assert!(matches!(err, OrgRoleError::MappingAlreadyExists { .. }));
    assert_eq!(ctx.rows(tenant).await.len(), 1);
}

/// A forced grant at O with descendants {A, B, C} yields exactly 4 rows, all
/// forced, all sharing O as assigned level.
#[tokio::test]
async fn test_forced_propagation_is_complete() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let a = ctx.org(tenant, Some(org)).await;
    let b = ctx.org(tenant, Some(org)).await;
    let c = ctx.org(tenant, Some(b)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "auditor").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, true)])
        .await
        .unwrap();

    let rows = ctx.rows(tenant).await;
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.forced));
    assert!(rows.iter().all(|r| r.assigned_level_organization_id == org));
    for node in [org, a, b, c] {
        assert_eq!(ctx.rows_at(tenant, node).await.len(), 1);
    }
}

#[tokio::test]
async fn test_forced_without_sub_orgs_rejected_on_add() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "org-admin").await;

    let err = ctx
        .reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, false)])
        .await
        .unwrap_err();

    assert!(matches!(err, OrgRoleError::InvalidCascadeCombination));
    assert!(ctx.rows(tenant).await.is_empty());
}

/// Non-forced cascade copies become indistinguishable from locally-issued
/// grants: deleting one leaves the others untouched.
#[tokio::test]
async fn test_non_forced_cascade_rows_are_independent() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let a = ctx.org(tenant, Some(org)).await;
    let b = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "viewer").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, false, true)])
        .await
        .unwrap();
    assert_eq!(ctx.rows(tenant).await.len(), 3);

    // The propagated copy at A is owned by A and deletable there.
    ctx.reconciler
        .delete_mapping(tenant, a, user, role, false)
        .await
        .unwrap();

    assert!(ctx.rows_at(tenant, a).await.is_empty());
    assert_eq!(ctx.rows_at(tenant, org).await.len(), 1);
    assert_eq!(ctx.rows_at(tenant, b).await.len(), 1);
}

/// One batch is all-or-nothing: a failing user aborts every grant.
#[tokio::test]
async fn test_batch_add_aborts_atomically() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let good = ctx.user(tenant).await;
    let role = ctx.role(tenant, "org-admin").await;

    let err = ctx
        .reconciler
        .add_mappings(
            tenant,
            org,
            role,
            vec![
                grant(good, false, false),
                // Never registered in the user store.
                grant(arbor_orgrole::UserId::new(), false, false),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OrgRoleError::InvalidUser(_)));
    assert!(ctx.rows(tenant).await.is_empty());
}

// ============================================================================
// Patch
// ============================================================================

/// Demoting a forced grant to a non-forced cascade replaces the forced set
/// with exactly one independent row per node, none missing, none duplicated.
#[tokio::test]
async fn test_forced_to_non_forced_demotion() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let a = ctx.org(tenant, Some(org)).await;
    let b = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "operator").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, true)])
        .await
        .unwrap();

    ctx.reconciler
        .patch_mapping(tenant, org, role, user, &patch_ops(false, true))
        .await
        .unwrap();

    let rows = ctx.rows(tenant).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| !r.forced));
    for node in [org, a, b] {
        let at_node = ctx.rows_at(tenant, node).await;
        assert_eq!(at_node.len(), 1);
        assert_eq!(at_node[0].assigned_level_organization_id, node);
    }
}

/// Promoting an independent grant to forced removes the local copies and
/// installs the cascade with origin provenance.
#[tokio::test]
async fn test_non_forced_to_forced_promotion() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let _a = ctx.org(tenant, Some(org)).await;
    let _b = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "operator").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, false, true)])
        .await
        .unwrap();

    ctx.reconciler
        .patch_mapping(tenant, org, role, user, &patch_ops(true, true))
        .await
        .unwrap();

    let rows = ctx.rows(tenant).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.forced));
    assert!(rows.iter().all(|r| r.assigned_level_organization_id == org));
}

/// The contradictory target is rejected in the fresh and the mixed branch
/// alike, with no state change.
#[tokio::test]
async fn test_patch_rejects_invalid_combination() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "operator").await;

    // Mixed: forced cascade plus a coexisting direct non-forced grant.
    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, true)])
        .await
        .unwrap();
    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, false, false)])
        .await
        .unwrap();
    let before = ctx.rows(tenant).await.len();

    let err = ctx
        .reconciler
        .patch_mapping(tenant, org, role, user, &patch_ops(true, false))
        .await
        .unwrap_err();
    assert!(matches!(err, OrgRoleError::InvalidBooleanCombination));
    assert_eq!(ctx.rows(tenant).await.len(), before);
}

/// Patching a grant that has no mapping at the org at all is a client error.
#[tokio::test]
async fn test_patch_unknown_mapping() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "operator").await;

    let err = ctx
        .reconciler
        .patch_mapping(tenant, org, role, user, &patch_ops(false, true))
        .await
        .unwrap_err();
    assert!(matches!(err, OrgRoleError::InvalidMapping { .. }));
}

/// Narrowing includeSubOrgs after a non-forced cascade does not revoke the
/// descendants' independent rows.
#[tokio::test]
async fn test_patch_narrowing_keeps_descendant_rows() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let a = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "viewer").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, false, true)])
        .await
        .unwrap();

    ctx.reconciler
        .patch_mapping(tenant, org, role, user, &patch_ops(false, false))
        .await
        .unwrap();

    assert_eq!(ctx.rows_at(tenant, a).await.len(), 1);
    assert_eq!(ctx.rows(tenant).await.len(), 2);
}

/// A forced cascade created before the tree grew is healed to cover the
/// current descendant set when re-patched to forced.
#[tokio::test]
async fn test_patch_self_heals_forced_set_over_new_descendants() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let _a = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "auditor").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, true)])
        .await
        .unwrap();
    assert_eq!(ctx.rows(tenant).await.len(), 2);

    // The tree grows after the cascade was created.
    let late_child = ctx.org(tenant, Some(org)).await;

    ctx.reconciler
        .patch_mapping(tenant, org, role, user, &patch_ops(true, true))
        .await
        .unwrap();

    let at_late = ctx.rows_at(tenant, late_child).await;
    assert_eq!(at_late.len(), 1);
    assert!(at_late[0].forced);
    assert_eq!(at_late[0].assigned_level_organization_id, org);
}

// ============================================================================
// Delete
// ============================================================================

/// Deleting a forced grant removes the cascade plus any coexisting
/// independent rows for the same (user, role) at every descendant.
#[tokio::test]
async fn test_forced_delete_cascades_fully() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let a = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "operator").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, true)])
        .await
        .unwrap();
    // Layer an independent grant at the descendant.
    ctx.reconciler
        .add_mappings(tenant, a, role, vec![grant(user, false, false)])
        .await
        .unwrap();
    assert_eq!(ctx.rows(tenant).await.len(), 3);

    ctx.reconciler
        .delete_mapping(tenant, org, user, role, false)
        .await
        .unwrap();

    assert!(ctx.rows(tenant).await.is_empty());
}

#[tokio::test]
async fn test_delete_requires_direct_assignment() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let a = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "auditor").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, true)])
        .await
        .unwrap();

    // The forced copy at A is not directly assigned there.
    let err = ctx
        .reconciler
        .delete_mapping(tenant, a, user, role, false)
        .await
        .unwrap_err();
    assert!(matches!(err, OrgRoleError::InvalidDirectMapping { .. }));
}

#[tokio::test]
async fn test_non_forced_delete_with_sub_orgs() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let _a = ctx.org(tenant, Some(org)).await;
    let _b = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "viewer").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, false, true)])
        .await
        .unwrap();

    ctx.reconciler
        .delete_mapping(tenant, org, user, role, true)
        .await
        .unwrap();

    assert!(ctx.rows(tenant).await.is_empty());
}

/// Bulk purge removes every row of the user and nothing else.
#[tokio::test]
async fn test_delete_all_mappings_of_user() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let _a = ctx.org(tenant, Some(org)).await;
    let doomed = ctx.user(tenant).await;
    let survivor = ctx.user(tenant).await;
    let role = ctx.role(tenant, "operator").await;

    ctx.reconciler
        .add_mappings(
            tenant,
            org,
            role,
            vec![grant(doomed, true, true), grant(survivor, false, false)],
        )
        .await
        .unwrap();

    let removed = ctx
        .reconciler
        .delete_all_mappings_of_user(tenant, doomed)
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let rows = ctx.rows(tenant).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, survivor);
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_queries_reflect_materialized_rows() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let org = ctx.org(tenant, None).await;
    let a = ctx.org(tenant, Some(org)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "auditor").await;

    ctx.reconciler
        .add_mappings(tenant, org, role, vec![grant(user, true, true)])
        .await
        .unwrap();

    // The propagated row is reported at the descendant as stored, with the
    // origin's provenance, without re-deriving cascade semantics.
    let users = ctx
        .reconciler
        .get_users_by_organization_and_role(tenant, a, role, &MappingFilter::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, user);
    assert_eq!(users[0].assigned_level_organization_id, org);
    assert!(users[0].forced);

    // Narrowing on the stored fields excludes the forced copy.
    let users = ctx
        .reconciler
        .get_users_by_organization_and_role(
            tenant,
            a,
            role,
            &MappingFilter {
                forced: Some(false),
                ..MappingFilter::default()
            },
            0,
            10,
        )
        .await
        .unwrap();
    assert!(users.is_empty());

    let roles = ctx
        .reconciler
        .get_roles_by_organization_and_user(tenant, a, user)
        .await
        .unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].role_id, role);

    assert!(ctx
        .reconciler
        .mapping_exists(tenant, a, user, role, org, true)
        .await
        .unwrap());
    assert!(!ctx
        .reconciler
        .mapping_exists(tenant, a, user, role, a, true)
        .await
        .unwrap());
}

// ============================================================================
// End-to-end scenario
// ============================================================================

/// ROOT -> {CHILD1, CHILD2}: forced add yields 3 rows; demotion yields 3
/// independent rows; deleting at ROOT without sub-orgs leaves the children's
/// rows in place.
#[tokio::test]
async fn test_end_to_end_grant_lifecycle() {
    let ctx = TestContext::new();
    let tenant = ctx.tenant_a;
    let root = ctx.org(tenant, None).await;
    let child1 = ctx.org(tenant, Some(root)).await;
    let child2 = ctx.org(tenant, Some(root)).await;
    let user = ctx.user(tenant).await;
    let role = ctx.role(tenant, "org-admin").await;

    // Forced add at ROOT.
    ctx.reconciler
        .add_mappings(tenant, root, role, vec![grant(user, true, true)])
        .await
        .unwrap();
    let rows = ctx.rows(tenant).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.forced));

    // Demote to a non-forced cascade.
    ctx.reconciler
        .patch_mapping(tenant, root, role, user, &patch_ops(false, true))
        .await
        .unwrap();
    let rows = ctx.rows(tenant).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| !r.forced));

    // Delete at ROOT without sub-orgs: children survive.
    ctx.reconciler
        .delete_mapping(tenant, root, user, role, false)
        .await
        .unwrap();
    assert!(ctx.rows_at(tenant, root).await.is_empty());
    assert_eq!(ctx.rows_at(tenant, child1).await.len(), 1);
    assert_eq!(ctx.rows_at(tenant, child2).await.len(), 1);
}
