use async_trait::async_trait;
use log::debug;
use sqlx::{Postgres, QueryBuilder};

use super::{rsvp::RsvpRow, EventRevision, EventStore, PgStore, StoreError};
use crate::{
    dto::EventFilter,
    models::{Event, NewEvent, Rsvp, StoredStatus},
};

#[async_trait]
impl EventStore for PgStore {
    async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let created = sqlx::query_as::<_, Event>(
            "INSERT INTO events (title, description, location, start_time, end_time,
                attendee_cap, price_cents, created_by_org_id, created_by_user_id, restricted_to_org)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *",
        )
        .bind(event.title)
        .bind(event.description)
        .bind(event.location)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.attendee_cap)
        .bind(event.price_cents)
        .bind(event.created_by_org_id)
        .bind(event.created_by_user_id)
        .bind(event.restricted_to_org)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM events WHERE TRUE");
        if let Some(org_id) = filter.org_id {
            query_builder.push(" AND created_by_org_id = ").push_bind(org_id);
        }
        if let Some(user_id) = filter.user_id {
            query_builder.push(" AND created_by_user_id = ").push_bind(user_id);
        }
        if let Some(restricted) = filter.restricted {
            query_builder.push(" AND restricted_to_org = ").push_bind(restricted);
        }
        query_builder.push(" ORDER BY start_time ASC");
        debug!("list_events sql: {}", query_builder.sql());
        let events = query_builder
            .build_query_as::<Event>()
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn update_event(&self, event: &Event) -> Result<Option<EventRevision>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Event>(
            "UPDATE events SET title = $2, description = $3, location = $4, start_time = $5,
                end_time = $6, attendee_cap = $7, price_cents = $8, restricted_to_org = $9
            WHERE event_id = $1
            RETURNING *",
        )
        .bind(event.event_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.attendee_cap)
        .bind(event.price_cents)
        .bind(event.restricted_to_org)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(updated) = updated else {
            return Ok(None);
        };

        // A priced event only admits paid attendees.
        let demoted = if updated.is_priced() {
            let rows = sqlx::query_as::<_, RsvpRow>(
                "UPDATE event_rsvps SET status = $2
                WHERE event_id = $1 AND status = $3 AND paid = FALSE
                RETURNING *",
            )
            .bind(updated.event_id)
            .bind(StoredStatus::Pending.as_str())
            .bind(StoredStatus::Confirmed.as_str())
            .fetch_all(&mut *tx)
            .await?;
            rows.into_iter()
                .map(Rsvp::try_from)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        if let Some(cap) = updated.attendee_cap {
            let attending = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM event_rsvps WHERE event_id = $1 AND status = $2",
            )
            .bind(updated.event_id)
            .bind(StoredStatus::Confirmed.as_str())
            .fetch_one(&mut *tx)
            .await?;
            if attending > i64::from(cap) {
                tx.rollback().await?;
                return Ok(Some(EventRevision::CapBelowAttendance { attending }));
            }
        }

        tx.commit().await?;
        Ok(Some(EventRevision::Applied {
            event: updated,
            demoted,
        }))
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool, StoreError> {
        // event_rsvps rows go with it through ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        db::{rsvp::tests::seed_event, RsvpStore},
        models::RsvpStatus,
        PGPool,
    };

    #[sqlx::test]
    #[ignore = "requires a postgres DATABASE_URL"]
    async fn pricing_an_event_demotes_unpaid_attendees(pool: PGPool) {
        let store = PgStore::new(pool);
        let mut event = seed_event(&store, Some(10), 0).await;
        let (walk_in, payer) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .admit_rsvp(event.event_id, walk_in, RsvpStatus::Attending, Utc::now())
            .await
            .unwrap();
        store
            .record_payment(event.event_id, payer, Utc::now())
            .await
            .unwrap();

        event.price_cents = 2000;
        let Some(EventRevision::Applied { event: updated, demoted }) =
            store.update_event(&event).await.unwrap()
        else {
            panic!("update was not applied");
        };
        assert_eq!(updated.price_cents, 2000);
        assert_eq!(demoted.len(), 1);
        assert_eq!(demoted[0].user_id, walk_in);

        let walk_in = store.find_rsvp(event.event_id, walk_in).await.unwrap().unwrap();
        assert_eq!(walk_in.status, RsvpStatus::Tentative);
        let payer = store.find_rsvp(event.event_id, payer).await.unwrap().unwrap();
        assert_eq!(payer.status, RsvpStatus::Attending);
    }

    #[sqlx::test]
    #[ignore = "requires a postgres DATABASE_URL"]
    async fn cap_cannot_drop_below_attendance(pool: PGPool) {
        let store = PgStore::new(pool);
        let mut event = seed_event(&store, Some(5), 0).await;
        for _ in 0..3 {
            store
                .admit_rsvp(event.event_id, Uuid::new_v4(), RsvpStatus::Attending, Utc::now())
                .await
                .unwrap();
        }

        event.attendee_cap = Some(2);
        assert_eq!(
            store.update_event(&event).await.unwrap(),
            Some(EventRevision::CapBelowAttendance { attending: 3 })
        );
        let stored = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(stored.attendee_cap, Some(5));
    }
}
