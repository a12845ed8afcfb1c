//! Role catalog lookups backing grant validation.

use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A role in the tenant catalog.
///
/// Only internal roles may be mapped to organization users; shared roles are
/// resolved but rejected by validation.
#[derive(Debug, Clone, FromRow)]
pub struct OrgRole {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub internal: bool,
}

impl OrgRole {
    /// Register a role in the tenant catalog.
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        name: &str,
        internal: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO org_roles (id, tenant_id, name, internal)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, id) DO NOTHING
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(name)
        .bind(internal)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Look up a role by id.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM org_roles
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }
}
