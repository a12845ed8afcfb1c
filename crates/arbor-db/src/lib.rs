//! PostgreSQL persistence for the arbor mapping engine.
//!
//! Provides the connection pool, embedded migrations, row models, and the
//! Postgres-backed implementations of the `arbor-orgrole` collaborator
//! traits. Cascade reconciliation diffs apply inside a single transaction
//! under per-grant advisory locks, so concurrent writers in different
//! processes serialize the same way in-process writers do.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod store;

pub use error::{DbError, DbResult};
pub use migrations::run_migrations;
pub use pool::DbPool;
pub use store::{PgHierarchyProvider, PgMappingStore, PgRoleStore, PgUserStore};
