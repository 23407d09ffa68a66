pub mod event;
pub mod membership;
pub mod notification;
pub mod rsvp;

#[cfg(test)]
pub mod memory;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use log::info;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use uuid::Uuid;

use crate::{
    config::Config,
    dto::EventFilter,
    errors::Rejection,
    models::{Event, Membership, NewEvent, Role, Rsvp, RsvpCounts, RsvpStatus},
    PGPool,
};

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),

    #[display(fmt = "unexpected value '{}' in column {}", value, column)]
    Corrupt { column: &'static str, value: String },
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Result of running the payment and capacity gates and the RSVP write as
/// one atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Created(Rsvp),
    Updated { previous: RsvpStatus, rsvp: Rsvp },
    Rejected(Rejection),
}

/// Result of projecting a completed payment onto the RSVP.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentRecord {
    Recorded(Rsvp),
    AlreadyPaid(Rsvp),
}

impl PaymentRecord {
    pub fn rsvp(&self) -> &Rsvp {
        match self {
            PaymentRecord::Recorded(rsvp) | PaymentRecord::AlreadyPaid(rsvp) => rsvp,
        }
    }
}

/// Result of rewriting an event's mutable columns.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRevision {
    /// `demoted` holds the unpaid attending RSVPs moved to tentative because
    /// the event is now priced.
    Applied { event: Event, demoted: Vec<Rsvp> },
    /// The new cap is below the number of people already attending. Nothing
    /// was written.
    CapBelowAttendance { attending: i64 },
}

/// Result of a caller asking to join an organization.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Joined(Membership),
    AlreadyMember,
    /// The admin role was requested for an organization that already has
    /// members.
    AdminTaken,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError>;
    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, StoreError>;
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;
    /// Overwrites every mutable column of the event with `event_id`. Runs under
    /// the event row lock, so it serializes with `RsvpStore::admit_rsvp`.
    async fn update_event(&self, event: &Event) -> Result<Option<EventRevision>, StoreError>;
    /// Deletes the event together with its RSVPs.
    async fn delete_event(&self, event_id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_membership(
        &self,
        user_id: Uuid,
        org_id: i64,
    ) -> Result<Option<Membership>, StoreError>;
    async fn get_membership(&self, membership_id: i64) -> Result<Option<Membership>, StoreError>;
    async fn list_user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>, StoreError>;
    async fn list_org_members(&self, org_id: i64) -> Result<Vec<Membership>, StoreError>;
    /// Adds the membership. The admin role is only granted when the
    /// organization has no members yet; that check and the insert are atomic
    /// with respect to other joins of the same organization.
    async fn join_organization(
        &self,
        user_id: Uuid,
        org_id: i64,
        role: Role,
    ) -> Result<JoinOutcome, StoreError>;
    async fn update_role(
        &self,
        membership_id: i64,
        role: Role,
    ) -> Result<Option<Membership>, StoreError>;
    async fn delete_membership(&self, membership_id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RsvpStore: Send + Sync {
    async fn find_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<Option<Rsvp>, StoreError>;
    /// Newest first.
    async fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, StoreError>;
    async fn count_rsvps(&self, event_id: i64) -> Result<RsvpCounts, StoreError>;
    /// Runs the payment gate, the capacity gate and the create-or-update of the
    /// (event, user) RSVP atomically. `None` means the event does not exist.
    async fn admit_rsvp(
        &self,
        event_id: i64,
        user_id: Uuid,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Admission>, StoreError>;
    /// Sets the RSVP to attending and paid unless it is already paid. `paid`
    /// is never written back to false.
    async fn record_payment(
        &self,
        event_id: i64,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError>;
    async fn delete_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<bool, StoreError>;
}

pub trait Store: EventStore + MembershipStore + RsvpStore {}

impl<T: EventStore + MembershipStore + RsvpStore> Store for T {}

#[derive(Clone)]
pub struct PgStore {
    pool: PGPool,
}

impl PgStore {
    pub fn new(pool: PGPool) -> Self {
        Self { pool }
    }
}

pub async fn init_db_pool(config: &Config) -> Result<PGPool, sqlx::Error> {
    let timeout_ms = config.upstream_timeout.as_millis().to_string();
    let options = PgConnectOptions::from_str(&config.database_url)?
        .options([("statement_timeout", timeout_ms.as_str())]);
    let pool: PGPool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.upstream_timeout)
        .connect_with(options)
        .await?;
    info!("connected to postgresql (max {} connections)", config.db_max_connections);
    Ok(pool)
}
