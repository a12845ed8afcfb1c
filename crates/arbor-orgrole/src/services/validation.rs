//! Grant validation.
//!
//! Validates the collaborator-owned pieces of a grant (organization, user,
//! role) and the non-idempotence rule for add calls.

use std::sync::Arc;

use uuid::Uuid;

use crate::directory::{OrganizationHierarchyProvider, RoleStore, UserStore};
use crate::error::{OrgRoleError, Result};
use crate::store::MappingStore;
use crate::types::{MappingKey, OrgId, RoleId, RoleRef, UserId};

/// Validates grants against the hierarchy, user store, and role store.
pub struct GrantValidator {
    hierarchy: Arc<dyn OrganizationHierarchyProvider>,
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    mappings: Arc<dyn MappingStore>,
}

impl GrantValidator {
    /// Create a new validator.
    pub fn new(
        hierarchy: Arc<dyn OrganizationHierarchyProvider>,
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        Self {
            hierarchy,
            users,
            roles,
            mappings,
        }
    }

    /// Validate one grant about to be added.
    ///
    /// Checks, in order: the organization is known to the hierarchy
    /// provider, the user exists in the tenant user store, the role resolves
    /// to an internal role, and no directly-assigned row for
    /// `(org, user, role, org, forced)` exists yet. Add is not idempotent;
    /// re-adding an identical grant is a client error.
    pub async fn validate(
        &self,
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
        forced: bool,
    ) -> Result<RoleRef> {
        if !self
            .hierarchy
            .organization_exists(tenant_id, organization_id)
            .await?
        {
            return Err(OrgRoleError::InvalidOrganization(organization_id));
        }

        if !self.users.user_exists(tenant_id, user_id).await? {
            return Err(OrgRoleError::InvalidUser(user_id));
        }

        let role = self
            .roles
            .resolve_internal_role(tenant_id, role_id)
            .await?
            .filter(|r| r.internal)
            .ok_or(OrgRoleError::InvalidRole(role_id))?;

        let direct_key = MappingKey {
            organization_id,
            user_id,
            role_id,
            assigned_level_organization_id: organization_id,
            forced,
        };
        if self.mappings.mapping_exists(tenant_id, &direct_key).await? {
            return Err(OrgRoleError::MappingAlreadyExists {
                organization_id,
                user_id,
                role_id,
            });
        }

        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryHierarchy, InMemoryRoleStore, InMemoryUserStore};
    use crate::store::InMemoryMappingStore;
    use crate::types::OrganizationUserRoleMapping;

    struct Setup {
        validator: GrantValidator,
        roles: Arc<InMemoryRoleStore>,
        mappings: Arc<InMemoryMappingStore>,
        tenant: Uuid,
        org: OrgId,
        user: UserId,
        role: RoleId,
    }

    async fn setup() -> Setup {
        let hierarchy = Arc::new(InMemoryHierarchy::new());
        let users = Arc::new(InMemoryUserStore::new());
        let roles = Arc::new(InMemoryRoleStore::new());
        let mappings = Arc::new(InMemoryMappingStore::new());
        let validator = GrantValidator::new(
            hierarchy.clone(),
            users.clone(),
            roles.clone(),
            mappings.clone(),
        );

        let tenant = Uuid::new_v4();
        let org = OrgId::new();
        let user = UserId::new();
        let role = RoleId::new();
        hierarchy.add_organization(tenant, org, None).await;
        users.add_user(tenant, user).await;
        roles.add_internal_role(tenant, role, "org-admin").await;

        Setup {
            validator,
            roles,
            mappings,
            tenant,
            org,
            user,
            role,
        }
    }

    #[tokio::test]
    async fn test_valid_grant_resolves_role() {
        let s = setup().await;
        let role = s
            .validator
            .validate(s.tenant, s.org, s.user, s.role, false)
            .await
            .unwrap();
        assert_eq!(role.name, "org-admin");
    }

    #[tokio::test]
    async fn test_unknown_organization() {
        let s = setup().await;
        let err = s
            .validator
            .validate(s.tenant, OrgId::new(), s.user, s.role, false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrgRoleError::InvalidOrganization(_)));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let s = setup().await;
        let err = s
            .validator
            .validate(s.tenant, s.org, UserId::new(), s.role, false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrgRoleError::InvalidUser(_)));
    }

    #[tokio::test]
    async fn test_unknown_role() {
        let s = setup().await;
        let err = s
            .validator
            .validate(s.tenant, s.org, s.user, RoleId::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrgRoleError::InvalidRole(_)));
    }

    #[tokio::test]
    async fn test_externally_shared_role_rejected() {
        let s = setup().await;
        let shared = RoleId::new();
        s.roles.add_shared_role(s.tenant, shared, "partner").await;

        let err = s
            .validator
            .validate(s.tenant, s.org, s.user, shared, false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrgRoleError::InvalidRole(_)));
    }

    #[tokio::test]
    async fn test_existing_direct_mapping_conflicts() {
        let s = setup().await;
        s.mappings
            .insert(
                s.tenant,
                vec![OrganizationUserRoleMapping::new(
                    s.tenant, s.org, s.user, s.role, s.org, false,
                )],
            )
            .await
            .unwrap();

        let err = s
            .validator
            .validate(s.tenant, s.org, s.user, s.role, false)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // The forced copy is a distinct 5-tuple and does not conflict.
        s.validator
            .validate(s.tenant, s.org, s.user, s.role, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_validation_is_tenant_scoped() {
        let s = setup().await;
        let other_tenant = Uuid::new_v4();
        let err = s
            .validator
            .validate(other_tenant, s.org, s.user, s.role, false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrgRoleError::InvalidOrganization(_)));
    }
}
