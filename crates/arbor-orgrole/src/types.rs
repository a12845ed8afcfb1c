//! Type definitions for the organization-role mapping domain.
//!
//! Includes newtype wrappers for IDs, the persisted mapping row, and the
//! request/projection types consumed by the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types (Newtype Pattern)
// ============================================================================

/// Unique identifier for an organization node in the tenant's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub Uuid);

impl OrgId {
    /// Create a new random OrgId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrgId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<OrgId> for Uuid {
    fn from(id: OrgId) -> Self {
        id.0
    }
}

/// Unique identifier for a user in the tenant user store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random UserId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<UserId> for Uuid {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Unique identifier for an internal role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub Uuid);

impl RoleId {
    /// Create a new random RoleId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RoleId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<RoleId> for Uuid {
    fn from(id: RoleId) -> Self {
        id.0
    }
}

// ============================================================================
// Mapping Row
// ============================================================================

/// A persisted organization-user-role mapping row.
///
/// One logical grant can materialize as many rows across a subtree. The
/// `assigned_level_organization_id` field records provenance: for a directly
/// issued grant it equals `organization_id`; for a row propagated by a forced
/// cascade it stays equal to the ancestor that issued the grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationUserRoleMapping {
    /// The tenant this mapping belongs to.
    pub tenant_id: Uuid,
    /// The organization at which this row takes effect.
    pub organization_id: OrgId,
    /// The user holding the grant.
    pub user_id: UserId,
    /// The internal role being granted.
    pub role_id: RoleId,
    /// The organization where the grant was originally issued.
    pub assigned_level_organization_id: OrgId,
    /// Whether this row belongs to a forced cascade.
    pub forced: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

impl OrganizationUserRoleMapping {
    /// Build a new mapping row stamped with the current time.
    pub fn new(
        tenant_id: Uuid,
        organization_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
        assigned_level_organization_id: OrgId,
        forced: bool,
    ) -> Self {
        Self {
            tenant_id,
            organization_id,
            user_id,
            role_id,
            assigned_level_organization_id,
            forced,
            created_at: Utc::now(),
        }
    }

    /// Whether this row was issued at the organization it takes effect at.
    #[must_use]
    pub fn is_directly_assigned(&self) -> bool {
        self.organization_id == self.assigned_level_organization_id
    }

    /// The identity 5-tuple of this row.
    #[must_use]
    pub fn key(&self) -> MappingKey {
        MappingKey {
            organization_id: self.organization_id,
            user_id: self.user_id,
            role_id: self.role_id,
            assigned_level_organization_id: self.assigned_level_organization_id,
            forced: self.forced,
        }
    }
}

/// The identity 5-tuple of a mapping row.
///
/// Forced and non-forced copies from the same origin at the same node carry
/// distinct keys and are independently removable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingKey {
    /// The organization at which the row takes effect.
    pub organization_id: OrgId,
    /// The user holding the grant.
    pub user_id: UserId,
    /// The role granted.
    pub role_id: RoleId,
    /// Provenance organization.
    pub assigned_level_organization_id: OrgId,
    /// Forced-cascade marker.
    pub forced: bool,
}

// ============================================================================
// Requests
// ============================================================================

/// One grant request within an add-mappings call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRequest {
    /// The user to grant the role to.
    pub user_id: UserId,
    /// Whether the grant is a forced cascade.
    pub forced: bool,
    /// Whether the grant extends to current sub-organizations.
    pub include_sub_orgs: bool,
}

/// The two patchable paths of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchPath {
    /// The `forced` flag.
    Forced,
    /// The `includeSubOrgs` flag.
    IncludeSubOrgs,
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchPath::Forced => write!(f, "forced"),
            PatchPath::IncludeSubOrgs => write!(f, "includeSubOrgs"),
        }
    }
}

/// A single replace operation in a patch-mapping call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PatchOp {
    /// Which flag the operation replaces.
    pub path: PatchPath,
    /// The new boolean value.
    pub value: bool,
}

/// The fully decoded target state of a patch call.
///
/// Built by [`PatchSet::decode`] from the raw operation list; both paths must
/// be present exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSet {
    /// Target value for the `forced` flag.
    pub forced: bool,
    /// Target value for the `includeSubOrgs` flag.
    pub include_sub_orgs: bool,
}

impl PatchSet {
    /// Decode a raw operation list into the typed target state.
    ///
    /// Exactly two operations must be supplied, one per path. A duplicated
    /// path leaves the other one missing and is reported as such rather than
    /// by array position.
    pub fn decode(ops: &[PatchOp]) -> crate::error::Result<Self> {
        if ops.len() > 2 {
            return Err(crate::error::OrgRoleError::TooManyOperations(ops.len()));
        }

        let mut forced: Option<bool> = None;
        let mut include_sub_orgs: Option<bool> = None;
        for op in ops {
            match op.path {
                PatchPath::Forced => forced = Some(op.value),
                PatchPath::IncludeSubOrgs => include_sub_orgs = Some(op.value),
            }
        }

        let forced = forced.ok_or(crate::error::OrgRoleError::MissingPatchOperation(
            PatchPath::Forced,
        ))?;
        let include_sub_orgs =
            include_sub_orgs.ok_or(crate::error::OrgRoleError::MissingPatchOperation(
                PatchPath::IncludeSubOrgs,
            ))?;

        Ok(Self {
            forced,
            include_sub_orgs,
        })
    }
}

/// Reference to a resolved role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRef {
    /// The role identifier.
    pub id: RoleId,
    /// Display name of the role.
    pub name: String,
    /// Whether the role is managed internally. Externally shared roles
    /// cannot participate in organization mappings.
    pub internal: bool,
}

// ============================================================================
// Projections
// ============================================================================

/// Optional narrowing of a user listing over the stored projection fields.
///
/// Attribute-level hydration lives with the user store owner; the engine
/// only filters on what its own rows carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingFilter {
    /// Keep only rows with this forced flag.
    pub forced: Option<bool>,
    /// Keep only rows issued at this organization.
    pub assigned_level_organization_id: Option<OrgId>,
}

impl MappingFilter {
    /// Whether a row passes the filter.
    #[must_use]
    pub fn matches(&self, row: &OrganizationUserRoleMapping) -> bool {
        self.forced.is_none_or(|f| row.forced == f)
            && self
                .assigned_level_organization_id
                .is_none_or(|org| row.assigned_level_organization_id == org)
    }
}

/// A user holding a role at an organization, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// The user id.
    pub user_id: UserId,
    /// The organization where the grant was issued.
    pub assigned_level_organization_id: OrgId,
    /// Whether the row belongs to a forced cascade.
    pub forced: bool,
}

/// A role held by a user at an organization, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    /// The role id.
    pub role_id: RoleId,
    /// The organization where the grant was issued.
    pub assigned_level_organization_id: OrgId,
    /// Whether the row belongs to a forced cascade.
    pub forced: bool,
}
