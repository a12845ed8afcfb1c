//! Organization-user-role mapping propagation engine.
//!
//! Organizations in a tenant form a tree; a single (user, role) grant issued
//! at one organization can materialize as rows across the whole subtree
//! depending on its cascading mode. This crate decides exactly which nodes
//! hold an effective grant, keeps that set consistent as the mode is
//! toggled, and reconciles the stored rows on add, patch, and delete.
//!
//! Two cascading modes interact:
//!
//! - **Forced** grants must exist at the issuing organization and every
//!   current descendant, all sharing the issuing org as provenance, and are
//!   reconciled as a unit.
//! - **Non-forced** cascades materialize independent copies, one per
//!   descendant, each owned by its own node and never re-unified once
//!   created.
//!
//! Transitions between modes are computed as precise add/remove diffs by a
//! pure planner rather than full rebuilds, so independently created grants
//! survive.
//!
//! # Services
//!
//! - [`services::MappingReconciler`]: add / patch / delete / query
//! - [`services::GrantValidator`]: organization, user, and role validation
//!
//! # Collaborators
//!
//! Storage and the external stores are behind traits ([`store::MappingStore`],
//! [`directory::OrganizationHierarchyProvider`], [`directory::UserStore`],
//! [`directory::RoleStore`], [`events::EventNotifier`]); each ships an
//! in-memory implementation for testing. The PostgreSQL backend lives in
//! `arbor-db`.

pub mod directory;
pub mod error;
pub mod events;
pub mod services;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{OrgRoleError, Result};
pub use types::{
    GrantRequest,
    MappingFilter,
    MappingKey,
    OrgId,
    OrganizationUserRoleMapping,
    PatchOp,
    PatchPath,
    PatchSet,
    RoleId,
    RoleRecord,
    RoleRef,
    UserId,
    UserRecord,
};

// Re-export service types
pub use services::{GrantValidator, MappingReconciler, ReconcilePlan};

// Re-export collaborator traits and their test doubles
pub use directory::{
    InMemoryHierarchy, InMemoryRoleStore, InMemoryUserStore, OrganizationHierarchyProvider,
    RoleStore, UserStore,
};
pub use events::{EventNotifier, InMemoryNotifier, MappingEvent};
pub use store::{InMemoryMappingStore, MappingStore};
