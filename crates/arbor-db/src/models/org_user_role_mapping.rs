//! Organization-user-role mapping entity model.
//!
//! Each row is one materialized grant at one organization. The unique index
//! covers the full 5-tuple, so a forced copy propagated from an ancestor and
//! an independently issued local grant coexist as distinct rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// A stored organization-user-role mapping row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrgUserRoleMapping {
    /// Unique identifier for the row.
    pub id: Uuid,

    /// The tenant this mapping belongs to.
    pub tenant_id: Uuid,

    /// Organization where the grant is effective.
    pub organization_id: Uuid,

    /// The user holding the role.
    pub user_id: Uuid,

    /// The role held.
    pub role_id: Uuid,

    /// Organization that issued the grant.
    pub assigned_level_organization_id: Uuid,

    /// Whether the row belongs to a forced cascade.
    pub forced: bool,

    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for one mapping row.
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_level_organization_id: Uuid,
    pub forced: bool,
}

/// Identity of one row, used for targeted deletes.
#[derive(Debug, Clone, Copy)]
pub struct MappingIdentity {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_level_organization_id: Uuid,
    pub forced: bool,
}

/// Deterministic advisory lock key for one grant.
///
/// Scoped to (tenant, user, role): every row of a grant shares those three,
/// regardless of which node of the subtree it is materialized at.
fn grant_lock_key(tenant_id: Uuid, user_id: Uuid, role_id: Uuid) -> i64 {
    let fold = |id: Uuid| -> i64 {
        let v = id.as_u128();
        (v as i64) ^ ((v >> 64) as i64)
    };
    fold(tenant_id)
        .wrapping_mul(31)
        .wrapping_add(fold(user_id))
        .wrapping_mul(31)
        .wrapping_add(fold(role_id))
}

/// Take transaction-scoped advisory locks for every grant touched, in key
/// order so concurrent writers cannot deadlock.
async fn lock_grants(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    grants: impl Iterator<Item = (Uuid, Uuid)>,
) -> Result<(), sqlx::Error> {
    let mut keys: Vec<i64> = grants
        .map(|(user_id, role_id)| grant_lock_key(tenant_id, user_id, role_id))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    for key in keys {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn insert_rows(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    rows: &[NewMapping],
) -> Result<(), sqlx::Error> {
    for row in rows {
        sqlx::query(
            r"
            INSERT INTO org_user_role_mappings (
                tenant_id, organization_id, user_id, role_id,
                assigned_level_organization_id, forced
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (
                tenant_id, organization_id, user_id, role_id,
                assigned_level_organization_id, forced
            ) DO NOTHING
            ",
        )
        .bind(tenant_id)
        .bind(row.organization_id)
        .bind(row.user_id)
        .bind(row.role_id)
        .bind(row.assigned_level_organization_id)
        .bind(row.forced)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn delete_rows(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    keys: &[MappingIdentity],
) -> Result<u64, sqlx::Error> {
    let mut deleted = 0;
    for key in keys {
        let result = sqlx::query(
            r"
            DELETE FROM org_user_role_mappings
            WHERE tenant_id = $1
              AND organization_id = $2
              AND user_id = $3
              AND role_id = $4
              AND assigned_level_organization_id = $5
              AND forced = $6
            ",
        )
        .bind(tenant_id)
        .bind(key.organization_id)
        .bind(key.user_id)
        .bind(key.role_id)
        .bind(key.assigned_level_organization_id)
        .bind(key.forced)
        .execute(&mut **tx)
        .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

impl OrgUserRoleMapping {
    /// Check whether a row with this exact identity exists.
    pub async fn exists(
        pool: &PgPool,
        tenant_id: Uuid,
        key: &MappingIdentity,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT 1 FROM org_user_role_mappings
            WHERE tenant_id = $1
              AND organization_id = $2
              AND user_id = $3
              AND role_id = $4
              AND assigned_level_organization_id = $5
              AND forced = $6
            ",
        )
        .bind(tenant_id)
        .bind(key.organization_id)
        .bind(key.user_id)
        .bind(key.role_id)
        .bind(key.assigned_level_organization_id)
        .bind(key.forced)
        .fetch_optional(pool)
        .await?;

        Ok(row.is_some())
    }

    /// All rows of one (user, role) grant within a set of organizations.
    pub async fn find_in_orgs(
        pool: &PgPool,
        tenant_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
        organization_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM org_user_role_mappings
            WHERE tenant_id = $1
              AND user_id = $2
              AND role_id = $3
              AND organization_id = ANY($4)
            ",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role_id)
        .bind(organization_ids)
        .fetch_all(pool)
        .await
    }

    /// Insert a batch of rows in one transaction.
    ///
    /// Rows whose full identity already exists are skipped, not errors; the
    /// conflict check against intent happens before planning, this layer
    /// only keeps re-applied plans idempotent.
    pub async fn insert_batch(
        pool: &PgPool,
        tenant_id: Uuid,
        rows: &[NewMapping],
    ) -> Result<(), sqlx::Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = pool.begin().await?;
        lock_grants(&mut tx, tenant_id, rows.iter().map(|r| (r.user_id, r.role_id))).await?;
        insert_rows(&mut tx, tenant_id, rows).await?;
        tx.commit().await
    }

    /// Delete a batch of rows by identity in one transaction.
    pub async fn delete_batch(
        pool: &PgPool,
        tenant_id: Uuid,
        keys: &[MappingIdentity],
    ) -> Result<u64, sqlx::Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut tx = pool.begin().await?;
        lock_grants(&mut tx, tenant_id, keys.iter().map(|k| (k.user_id, k.role_id))).await?;
        let deleted = delete_rows(&mut tx, tenant_id, keys).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    /// Apply a reconciliation diff atomically: deletes first, then inserts,
    /// under advisory locks covering every grant the diff touches.
    pub async fn apply_diff(
        pool: &PgPool,
        tenant_id: Uuid,
        to_insert: &[NewMapping],
        to_delete: &[MappingIdentity],
    ) -> Result<(), sqlx::Error> {
        if to_insert.is_empty() && to_delete.is_empty() {
            return Ok(());
        }
        let mut tx = pool.begin().await?;
        lock_grants(
            &mut tx,
            tenant_id,
            to_insert
                .iter()
                .map(|r| (r.user_id, r.role_id))
                .chain(to_delete.iter().map(|k| (k.user_id, k.role_id))),
        )
        .await?;
        delete_rows(&mut tx, tenant_id, to_delete).await?;
        insert_rows(&mut tx, tenant_id, to_insert).await?;
        tx.commit().await
    }

    /// Remove every row of a user across all organizations of the tenant.
    pub async fn delete_all_for_user(
        pool: &PgPool,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM org_user_role_mappings
            WHERE tenant_id = $1 AND user_id = $2
            ",
        )
        .bind(tenant_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Rows holding one role at one organization, optionally narrowed on
    /// the forced flag and the issuing organization, paged after narrowing.
    pub async fn list_by_org_role(
        pool: &PgPool,
        tenant_id: Uuid,
        organization_id: Uuid,
        role_id: Uuid,
        forced: Option<bool>,
        assigned_level_organization_id: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM org_user_role_mappings
            WHERE tenant_id = $1 AND organization_id = $2 AND role_id = $3
              AND ($4::boolean IS NULL OR forced = $4)
              AND ($5::uuid IS NULL OR assigned_level_organization_id = $5)
            ORDER BY created_at, id
            OFFSET $6 LIMIT $7
            ",
        )
        .bind(tenant_id)
        .bind(organization_id)
        .bind(role_id)
        .bind(forced)
        .bind(assigned_level_organization_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Rows held by one user at one organization.
    pub async fn list_by_org_user(
        pool: &PgPool,
        tenant_id: Uuid,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM org_user_role_mappings
            WHERE tenant_id = $1 AND organization_id = $2 AND user_id = $3
            ORDER BY created_at, id
            ",
        )
        .bind(tenant_id)
        .bind(organization_id)
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_lock_key_is_deterministic() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let role = Uuid::new_v4();
        assert_eq!(
            grant_lock_key(tenant, user, role),
            grant_lock_key(tenant, user, role)
        );
        assert_ne!(
            grant_lock_key(tenant, user, role),
            grant_lock_key(tenant, role, user)
        );
    }
}
