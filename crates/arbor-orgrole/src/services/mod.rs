//! Business services for organization-role mapping management.

pub mod plan;
pub mod reconciler;
pub mod validation;

pub use plan::{plan_add, plan_delete, plan_patch, GrantState, ReconcilePlan};
pub use reconciler::MappingReconciler;
pub use validation::GrantValidator;
