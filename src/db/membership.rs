use async_trait::async_trait;
use sqlx::prelude::FromRow;
use uuid::Uuid;

use super::{JoinOutcome, MembershipStore, PgStore, StoreError};
use crate::models::{Membership, Role};

#[derive(Debug, FromRow)]
struct MembershipRow {
    membership_id: i64,
    user_id: Uuid,
    org_id: i64,
    role: String,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|_| StoreError::Corrupt {
            column: "organization_memberships.role",
            value: row.role.clone(),
        })?;
        Ok(Membership {
            membership_id: row.membership_id,
            user_id: row.user_id,
            org_id: row.org_id,
            role,
        })
    }
}

fn convert_all(rows: Vec<MembershipRow>) -> Result<Vec<Membership>, StoreError> {
    rows.into_iter().map(Membership::try_from).collect()
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn find_membership(
        &self,
        user_id: Uuid,
        org_id: i64,
    ) -> Result<Option<Membership>, StoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM organization_memberships WHERE user_id = $1 AND org_id = $2",
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Membership::try_from)
        .transpose()
    }

    async fn get_membership(&self, membership_id: i64) -> Result<Option<Membership>, StoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM organization_memberships WHERE membership_id = $1",
        )
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Membership::try_from)
        .transpose()
    }

    async fn list_user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM organization_memberships WHERE user_id = $1 ORDER BY membership_id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_org_members(&self, org_id: i64) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM organization_memberships WHERE org_id = $1 ORDER BY membership_id DESC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn join_organization(
        &self,
        user_id: Uuid,
        org_id: i64,
        role: Role,
    ) -> Result<JoinOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Joins of one organization queue up here, so an empty organization is
        // observed empty by exactly one of them.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(org_id)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query_as::<_, MembershipRow>(
            "INSERT INTO organization_memberships (user_id, org_id, role)
            SELECT $1::uuid, $2::bigint, $3::text
            WHERE $3::text <> 'admin'
                OR NOT EXISTS (SELECT 1 FROM organization_memberships WHERE org_id = $2)
            ON CONFLICT (user_id, org_id) DO NOTHING
            RETURNING *",
        )
        .bind(user_id)
        .bind(org_id)
        .bind(role.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(row) => JoinOutcome::Joined(Membership::try_from(row)?),
            None => {
                let existing = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM organization_memberships
                        WHERE user_id = $1 AND org_id = $2)",
                )
                .bind(user_id)
                .bind(org_id)
                .fetch_one(&mut *tx)
                .await?;
                if existing {
                    JoinOutcome::AlreadyMember
                } else {
                    JoinOutcome::AdminTaken
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn update_role(
        &self,
        membership_id: i64,
        role: Role,
    ) -> Result<Option<Membership>, StoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "UPDATE organization_memberships SET role = $2 WHERE membership_id = $1 RETURNING *",
        )
        .bind(membership_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Membership::try_from)
        .transpose()
    }

    async fn delete_membership(&self, membership_id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM organization_memberships WHERE membership_id = $1")
            .bind(membership_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
