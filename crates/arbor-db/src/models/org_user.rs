//! User directory lookups backing grant validation.

use sqlx::PgPool;
use uuid::Uuid;

/// A user known to the tenant directory.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrgUser {
    pub id: Uuid,
    pub tenant_id: Uuid,
}

impl OrgUser {
    /// Register a user in the tenant.
    pub async fn create(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO org_users (id, tenant_id)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id, id) DO NOTHING
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Check whether a user exists in the tenant.
    pub async fn exists(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT 1 FROM org_users
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.is_some())
    }
}
