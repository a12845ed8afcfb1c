//! Organization entity model.
//!
//! Organizations form a tree per tenant; the descendant query drives cascade
//! materialization and is always evaluated against the current tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// An organization node in a tenant's tree.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier for the organization.
    pub id: Uuid,

    /// The tenant this organization belongs to.
    pub tenant_id: Uuid,

    /// Parent organization, `None` for a root.
    pub parent_id: Option<Uuid>,

    /// Display name.
    pub name: String,

    /// When the organization was created.
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Create an organization under an optional parent.
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO organizations (tenant_id, parent_id, name)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(parent_id)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    /// Check whether an organization exists in the tenant.
    pub async fn exists(
        pool: &PgPool,
        tenant_id: Uuid,
        organization_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT 1 FROM organizations
            WHERE id = $1 AND tenant_id = $2
            ",
        )
        .bind(organization_id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.is_some())
    }

    /// Get the ids of all descendants using a recursive CTE.
    ///
    /// The starting organization itself is not included.
    pub async fn descendant_ids(
        pool: &PgPool,
        tenant_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r"
            WITH RECURSIVE descendants AS (
                -- Base case: direct children
                SELECT o.id FROM organizations o
                WHERE o.parent_id = $1 AND o.tenant_id = $2

                UNION ALL

                -- Recursive case: children of children
                SELECT o.id FROM organizations o
                INNER JOIN descendants d ON o.parent_id = d.id
                WHERE o.tenant_id = $2
            )
            SELECT id FROM descendants
            ",
        )
        .bind(organization_id)
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
