use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use super::{Admission, PaymentRecord, PgStore, RsvpStore, StoreError};
use crate::{
    models::{Event, Rsvp, RsvpCounts, RsvpStatus, StoredStatus},
    service::gate,
};

#[derive(Debug, FromRow)]
pub(super) struct RsvpRow {
    rsvp_id: i64,
    event_id: i64,
    user_id: Uuid,
    status: String,
    rsvp_time: DateTime<Utc>,
    paid: bool,
    paid_at: Option<DateTime<Utc>>,
}

fn parse_status(raw: &str) -> Result<RsvpStatus, StoreError> {
    StoredStatus::parse(raw)
        .map(RsvpStatus::from)
        .ok_or_else(|| StoreError::Corrupt {
            column: "event_rsvps.status",
            value: raw.to_string(),
        })
}

impl TryFrom<RsvpRow> for Rsvp {
    type Error = StoreError;

    fn try_from(row: RsvpRow) -> Result<Self, Self::Error> {
        Ok(Rsvp {
            rsvp_id: row.rsvp_id,
            event_id: row.event_id,
            user_id: row.user_id,
            status: parse_status(&row.status)?,
            rsvp_time: row.rsvp_time,
            paid: row.paid,
            paid_at: row.paid_at,
        })
    }
}

const SELECT_ONE: &str = "SELECT * FROM event_rsvps WHERE event_id = $1 AND user_id = $2";

#[async_trait]
impl RsvpStore for PgStore {
    async fn find_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<Option<Rsvp>, StoreError> {
        sqlx::query_as::<_, RsvpRow>(SELECT_ONE)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Rsvp::try_from)
            .transpose()
    }

    async fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, StoreError> {
        let rows = sqlx::query_as::<_, RsvpRow>(
            "SELECT * FROM event_rsvps WHERE event_id = $1 ORDER BY rsvp_time DESC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Rsvp::try_from).collect()
    }

    async fn count_rsvps(&self, event_id: i64) -> Result<RsvpCounts, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM event_rsvps WHERE event_id = $1 GROUP BY status",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        let mut counts = RsvpCounts::default();
        for (status, n) in rows {
            counts.add(parse_status(&status)?, n);
        }
        Ok(counts)
    }

    async fn admit_rsvp(
        &self,
        event_id: i64,
        user_id: Uuid,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Admission>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The event row lock serializes every admission for this event, so the
        // headcount below cannot go stale before the write commits.
        let event = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE event_id = $1 FOR UPDATE",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(event) = event else {
            return Ok(None);
        };

        let existing = sqlx::query_as::<_, RsvpRow>(SELECT_ONE)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(Rsvp::try_from)
            .transpose()?;

        let attending = if gate::needs_headcount(&event, existing.as_ref(), status) {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM event_rsvps WHERE event_id = $1 AND status = $2",
            )
            .bind(event_id)
            .bind(StoredStatus::Confirmed.as_str())
            .fetch_one(&mut *tx)
            .await?
        } else {
            0
        };

        if let Err(rejection) = gate::screen(&event, existing.as_ref(), status, attending) {
            tx.rollback().await?;
            return Ok(Some(Admission::Rejected(rejection)));
        }

        let admission = match existing {
            Some(current) => {
                let row = sqlx::query_as::<_, RsvpRow>(
                    "UPDATE event_rsvps SET status = $2, rsvp_time = $3
                    WHERE rsvp_id = $1
                    RETURNING *",
                )
                .bind(current.rsvp_id)
                .bind(status.stored().as_str())
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                Admission::Updated {
                    previous: current.status,
                    rsvp: Rsvp::try_from(row)?,
                }
            }
            None => {
                let row = sqlx::query_as::<_, RsvpRow>(
                    "INSERT INTO event_rsvps (event_id, user_id, status, rsvp_time, paid)
                    VALUES ($1, $2, $3, $4, FALSE)
                    RETURNING *",
                )
                .bind(event_id)
                .bind(user_id)
                .bind(status.stored().as_str())
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                Admission::Created(Rsvp::try_from(row)?)
            }
        };

        tx.commit().await?;
        Ok(Some(admission))
    }

    async fn record_payment(
        &self,
        event_id: i64,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError> {
        // The WHERE clause on the conflict branch keeps `paid` monotonic: a row
        // that is already paid is left untouched and nothing is returned.
        let recorded = sqlx::query_as::<_, RsvpRow>(
            "INSERT INTO event_rsvps (event_id, user_id, status, rsvp_time, paid, paid_at)
            VALUES ($1, $2, $3, $4, TRUE, $4)
            ON CONFLICT (event_id, user_id) DO UPDATE
            SET status = EXCLUDED.status, rsvp_time = EXCLUDED.rsvp_time,
                paid = TRUE, paid_at = EXCLUDED.paid_at
            WHERE event_rsvps.paid = FALSE
            RETURNING *",
        )
        .bind(event_id)
        .bind(user_id)
        .bind(StoredStatus::Confirmed.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match recorded {
            Some(row) => Ok(PaymentRecord::Recorded(Rsvp::try_from(row)?)),
            None => {
                let row = sqlx::query_as::<_, RsvpRow>(SELECT_ONE)
                    .bind(event_id)
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(PaymentRecord::AlreadyPaid(Rsvp::try_from(row)?))
            }
        }
    }

    async fn delete_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM event_rsvps WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
