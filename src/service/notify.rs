use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use log::{debug, warn};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::{
    db::{self, StoreError},
    models::{Event, Rsvp, RsvpStatus},
    PGPool,
};

#[derive(Debug, Display)]
pub enum NotifyError {
    #[display(fmt = "notification outbox write failed: {}", _0)]
    Outbox(StoreError),
}

impl std::error::Error for NotifyError {}

#[derive(Debug, Clone, PartialEq)]
pub struct RsvpNotice {
    pub recipient: Uuid,
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub event_id: i64,
    pub event_title: String,
    pub event_location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: RsvpStatus,
}

impl RsvpNotice {
    pub fn new(event: &Event, rsvp: &Rsvp, user: Option<&AuthUser>) -> Self {
        Self {
            recipient: rsvp.user_id,
            recipient_email: user.and_then(|u| u.email.clone()),
            recipient_name: user.and_then(AuthUser::display_name),
            event_id: event.event_id,
            event_title: event.title.clone(),
            event_location: event.location.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            status: rsvp.status,
        }
    }

    pub fn subject(&self) -> String {
        format!("RSVP Confirmation: {} - {}", self.status.label(), self.event_title)
    }

    pub fn body(&self) -> String {
        let greeting = match &self.recipient_name {
            Some(name) => format!("Hello {name},"),
            None => "Hello,".to_string(),
        };
        let summary = match self.status {
            RsvpStatus::Attending => "You are confirmed to attend this event.",
            RsvpStatus::Tentative => "You have marked yourself as maybe attending this event.",
            RsvpStatus::Declined => "You have indicated that you will not be attending this event.",
        };
        let mut body = format!(
            "{greeting}\n\n{summary}\n\n{}\nStart: {}\nEnd: {}\n",
            self.event_title,
            self.start_time.format("%A, %B %-d, %Y %H:%M UTC"),
            self.end_time.format("%A, %B %-d, %Y %H:%M UTC"),
        );
        if let Some(location) = &self.event_location {
            body.push_str(&format!("Location: {location}\n"));
        }
        body
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn rsvp_changed(&self, notice: &RsvpNotice) -> Result<(), NotifyError>;
}

/// Writes notices into the `notifications` table for the mailer to deliver.
pub struct OutboxNotifier {
    pool: PGPool,
}

impl OutboxNotifier {
    pub fn new(pool: PGPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn rsvp_changed(&self, notice: &RsvpNotice) -> Result<(), NotifyError> {
        let id = db::notification::create(notice, &self.pool)
            .await
            .map_err(NotifyError::Outbox)?;
        debug!("queued notification {} for user {}", id, notice.recipient);
        Ok(())
    }
}

/// Fire-and-forget: a failed notification is logged and never reaches the
/// request that triggered it.
pub fn dispatch(notifier: Arc<dyn Notifier>, notice: RsvpNotice) {
    tokio::spawn(async move {
        if let Err(err) = notifier.rsvp_changed(&notice).await {
            warn!(
                "dropping rsvp notification for user {} on event {}: {}",
                notice.recipient, notice.event_id, err
            );
        }
    });
}
