//! Database entity models.

pub mod org_role;
pub mod org_user;
pub mod org_user_role_mapping;
pub mod organization;

pub use org_role::OrgRole;
pub use org_user::OrgUser;
pub use org_user_role_mapping::{MappingIdentity, NewMapping, OrgUserRoleMapping};
pub use organization::Organization;
