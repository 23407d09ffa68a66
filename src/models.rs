use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub event_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attendee_cap: Option<i32>,
    pub price_cents: i32,
    pub created_by_org_id: Option<i64>,
    pub created_by_user_id: Uuid,
    pub restricted_to_org: bool,
}

impl Event {
    pub fn is_priced(&self) -> bool {
        self.price_cents > 0
    }
}

/// Validated input for a new event row.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attendee_cap: Option<i32>,
    pub price_cents: i32,
    pub created_by_org_id: Option<i64>,
    pub created_by_user_id: Uuid,
    pub restricted_to_org: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::BadRequest(format!(
                "Invalid role '{other}'. Must be one of: member, admin"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Membership {
    pub membership_id: i64,
    pub user_id: Uuid,
    pub org_id: i64,
    pub role: Role,
}

impl Membership {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Attendance intent in the vocabulary callers use on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsvpStatus {
    #[serde(rename = "going")]
    Attending,
    #[serde(rename = "maybe")]
    Tentative,
    #[serde(rename = "not_going")]
    Declined,
}

impl RsvpStatus {
    pub const ALL: [RsvpStatus; 3] = [
        RsvpStatus::Attending,
        RsvpStatus::Tentative,
        RsvpStatus::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Attending => "going",
            RsvpStatus::Tentative => "maybe",
            RsvpStatus::Declined => "not_going",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RsvpStatus::Attending => "Going",
            RsvpStatus::Tentative => "Maybe",
            RsvpStatus::Declined => "Not Going",
        }
    }

    pub fn stored(self) -> StoredStatus {
        StoredStatus::from(self)
    }
}

impl FromStr for RsvpStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "going" => Ok(RsvpStatus::Attending),
            "maybe" => Ok(RsvpStatus::Tentative),
            "not_going" => Ok(RsvpStatus::Declined),
            other => Err(AppError::InvalidStatus(other.to_string())),
        }
    }
}

/// Values persisted in `event_rsvps.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredStatus {
    Confirmed,
    Pending,
    Cancelled,
}

impl StoredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoredStatus::Confirmed => "confirmed",
            StoredStatus::Pending => "pending",
            StoredStatus::Cancelled => "cancelled",
        }
    }

    /// Returns `None` for anything outside the three known storage values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(StoredStatus::Confirmed),
            "pending" => Some(StoredStatus::Pending),
            "cancelled" => Some(StoredStatus::Cancelled),
            _ => None,
        }
    }
}

impl From<RsvpStatus> for StoredStatus {
    fn from(status: RsvpStatus) -> Self {
        match status {
            RsvpStatus::Attending => StoredStatus::Confirmed,
            RsvpStatus::Tentative => StoredStatus::Pending,
            RsvpStatus::Declined => StoredStatus::Cancelled,
        }
    }
}

impl From<StoredStatus> for RsvpStatus {
    fn from(status: StoredStatus) -> Self {
        match status {
            StoredStatus::Confirmed => RsvpStatus::Attending,
            StoredStatus::Pending => RsvpStatus::Tentative,
            StoredStatus::Cancelled => RsvpStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rsvp {
    pub rsvp_id: i64,
    pub event_id: i64,
    pub user_id: Uuid,
    pub status: RsvpStatus,
    pub rsvp_time: DateTime<Utc>,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Rsvp {
    pub fn is_attending(&self) -> bool {
        self.status == RsvpStatus::Attending
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RsvpCounts {
    pub going: i64,
    pub maybe: i64,
    pub not_going: i64,
}

impl RsvpCounts {
    pub fn add(&mut self, status: RsvpStatus, n: i64) {
        match status {
            RsvpStatus::Attending => self.going += n,
            RsvpStatus::Tentative => self.maybe += n,
            RsvpStatus::Declined => self.not_going += n,
        }
    }
}
