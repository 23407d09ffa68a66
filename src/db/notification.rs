use chrono::Utc;
use uuid::Uuid;

use super::StoreError;
use crate::{service::notify::RsvpNotice, PGPool};

/// Queues a notification row for the mailer. `stat = 0` marks it unsent;
/// the mailer stamps `sending_dt` once delivered.
pub async fn create(notice: &RsvpNotice, pool: &PGPool) -> Result<Uuid, StoreError> {
    let notification_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO notifications (id, recipient, recipient_email, subject, content, stat, creation_dt)
        VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(notification_id)
    .bind(notice.recipient)
    .bind(&notice.recipient_email)
    .bind(notice.subject())
    .bind(notice.body())
    .bind(0i16)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(notification_id)
}
