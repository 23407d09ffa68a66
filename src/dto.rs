use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    errors::AppError,
    models::{Role, Rsvp, RsvpCounts, RsvpStatus},
};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewEventDto {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attendee_cap: Option<i32>,
    pub price_cents: Option<i32>,
    #[serde(default)]
    pub restricted_to_org: bool,
    pub created_by_org_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct UpdateEventDto {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub attendee_cap: Option<Option<i32>>,
    pub price_cents: Option<i32>,
    pub restricted_to_org: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct EventFilter {
    pub org_id: Option<i64>,
    pub user_id: Option<uuid::Uuid>,
    pub restricted: Option<bool>,
}

/// Body of `POST /events/{id}/rsvp`. The status stays a raw JSON value so an
/// unknown or mistyped value produces `INVALID_STATUS` rather than a generic
/// parse error.
#[derive(Debug, Deserialize, Clone)]
pub struct RsvpRequest {
    pub status: Option<serde_json::Value>,
}

impl RsvpRequest {
    pub fn status(&self) -> Result<RsvpStatus, AppError> {
        match &self.status {
            Some(serde_json::Value::String(raw)) => raw.trim().parse(),
            Some(other) => Err(AppError::InvalidStatus(other.to_string())),
            None => Err(AppError::InvalidStatus(String::new())),
        }
    }
}

/// The `success`/`message`/`rsvp` envelope existing clients read.
#[derive(Debug, Serialize)]
pub struct RsvpEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub rsvp: Option<Rsvp>,
}

impl RsvpEnvelope {
    pub fn with_message(message: &str, rsvp: Rsvp) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            rsvp: Some(rsvp),
        }
    }

    pub fn lookup(rsvp: Option<Rsvp>) -> Self {
        Self {
            success: true,
            message: None,
            rsvp,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RsvpSummary {
    #[serde(flatten)]
    pub counts: RsvpCounts,
    pub attendee_cap: Option<i32>,
    pub spots_remaining: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewMembershipDto {
    pub org_id: i64,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateMembershipDto {
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutRequestDto {
    pub event_id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfirmPaymentDto {
    pub session_id: String,
}
