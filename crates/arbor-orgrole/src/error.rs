//! Error types for the organization-role mapping engine.
//!
//! Client errors are caller-correctable and never leave partial state;
//! server errors cover store, connectivity, and post-commit eventing
//! failures.

use crate::types::{OrgId, PatchPath, RoleId, UserId};
use thiserror::Error;

/// Errors raised by the mapping engine.
#[derive(Debug, Error)]
pub enum OrgRoleError {
    /// The organization id is unknown to the hierarchy provider.
    #[error("Organization not found: {0}")]
    InvalidOrganization(OrgId),

    /// The user id does not exist in the tenant user store.
    #[error("User not found: {0}")]
    InvalidUser(UserId),

    /// The role id does not resolve, or resolves to an externally managed
    /// role that cannot participate in organization mappings.
    #[error("Role is not a valid internal role: {0}")]
    InvalidRole(RoleId),

    /// A directly-assigned row for this grant already exists. Add is not
    /// idempotent; re-adding an identical grant is a client error.
    #[error("Mapping already exists for user {user_id} and role {role_id} at organization {organization_id}")]
    MappingAlreadyExists {
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    },

    /// A forced grant without sub-organization inclusion is contradictory.
    #[error("A forced mapping must include sub-organizations")]
    InvalidCascadeCombination,

    /// A patch call did not carry an operation for the named path.
    #[error("Missing patch operation for path '{0}'")]
    MissingPatchOperation(PatchPath),

    /// A patch call carried more than the two expected operations.
    #[error("Expected exactly 2 patch operations, got {0}")]
    TooManyOperations(usize),

    /// The patch target state `forced=true, includeSubOrgs=false` is
    /// contradictory.
    #[error("Invalid flag combination: forced=true requires includeSubOrgs=true")]
    InvalidBooleanCombination,

    /// No mapping of any kind exists at the organization for this user and
    /// role, so there is nothing to patch.
    #[error("No mapping exists for user {user_id} and role {role_id} at organization {organization_id}")]
    InvalidMapping {
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    },

    /// The grant is not directly assigned at the organization, so it cannot
    /// be deleted there.
    #[error("No directly assigned mapping for user {user_id} and role {role_id} at organization {organization_id}")]
    InvalidDirectMapping {
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    },

    /// A database query or transaction failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A storage backend failed outside of SQL execution.
    #[error("Store error: {0}")]
    Store(String),

    /// Publishing the post-commit event failed. The underlying mapping
    /// change has already been committed; callers must treat this as
    /// "data changed, notification uncertain".
    #[error("Failed to publish event '{event}': {cause}")]
    EventPublishFailed { event: String, cause: String },
}

impl OrgRoleError {
    /// Whether this error is caller-correctable.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            OrgRoleError::Database(_)
                | OrgRoleError::Store(_)
                | OrgRoleError::EventPublishFailed { .. }
        )
    }

    /// Whether this error reports a missing resource or mapping.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrgRoleError::InvalidOrganization(_)
                | OrgRoleError::InvalidUser(_)
                | OrgRoleError::InvalidRole(_)
                | OrgRoleError::InvalidMapping { .. }
                | OrgRoleError::InvalidDirectMapping { .. }
        )
    }

    /// Whether this error reports a conflicting existing mapping.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, OrgRoleError::MappingAlreadyExists { .. })
    }
}

/// Type alias for Results using [`OrgRoleError`].
pub type Result<T> = std::result::Result<T, OrgRoleError>;
