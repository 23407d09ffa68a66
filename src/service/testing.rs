//! Fakes and fixtures shared by the service and handler tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::task::yield_now;
use uuid::Uuid;

use super::{
    auth::{jwt::JwtIdentity, AuthUser},
    notify::{Notifier, NotifyError, RsvpNotice},
    processor::{
        CheckoutRequest, CheckoutSession, PaymentProcessor, ProcessorError, ProcessorEvent,
        SessionDetails, WebhookError,
    },
    stripe, AppState,
};
use crate::{
    db::{
        memory::MemoryStore, Admission, EventRevision, EventStore, JoinOutcome, MembershipStore,
        PaymentRecord, RsvpStore, StoreError,
    },
    dto::EventFilter,
    models::{Event, Membership, NewEvent, Role, Rsvp, RsvpCounts, RsvpStatus},
};

pub const WEBHOOK_SECRET: &str = "whsec_unit_test";

/// Serves sessions registered by the test and verifies webhooks with the
/// real signature scheme.
#[derive(Default)]
pub struct FakeProcessor {
    sessions: Mutex<HashMap<String, SessionDetails>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
}

impl FakeProcessor {
    pub fn add_session(&self, session: SessionDetails) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn checkout_count(&self) -> usize {
        self.checkouts.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request.clone());
        let id = format!("cs_test_{}", checkouts.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.test/{id}"),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, ProcessorError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(ProcessorError::SessionNotFound)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<ProcessorEvent, WebhookError> {
        stripe::construct_event(payload, signature, WEBHOOK_SECRET, Utc::now().timestamp(), 300)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<RsvpNotice>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn rsvp_changed(&self, notice: &RsvpNotice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn rsvp_changed(&self, _notice: &RsvpNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Outbox(StoreError::Corrupt {
            column: "notifications",
            value: "unavailable".to_string(),
        }))
    }
}

/// Hands control back to the executor before every store call, so futures
/// driven together by `join_all` overlap at each await instead of running to
/// completion one after another.
pub struct YieldingStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl EventStore for YieldingStore {
    async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        yield_now().await;
        self.inner.create_event(event).await
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, StoreError> {
        yield_now().await;
        self.inner.get_event(event_id).await
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        yield_now().await;
        self.inner.list_events(filter).await
    }

    async fn update_event(&self, event: &Event) -> Result<Option<EventRevision>, StoreError> {
        yield_now().await;
        self.inner.update_event(event).await
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool, StoreError> {
        yield_now().await;
        self.inner.delete_event(event_id).await
    }
}

#[async_trait]
impl MembershipStore for YieldingStore {
    async fn find_membership(
        &self,
        user_id: Uuid,
        org_id: i64,
    ) -> Result<Option<Membership>, StoreError> {
        yield_now().await;
        self.inner.find_membership(user_id, org_id).await
    }

    async fn get_membership(&self, membership_id: i64) -> Result<Option<Membership>, StoreError> {
        yield_now().await;
        self.inner.get_membership(membership_id).await
    }

    async fn list_user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>, StoreError> {
        yield_now().await;
        self.inner.list_user_memberships(user_id).await
    }

    async fn list_org_members(&self, org_id: i64) -> Result<Vec<Membership>, StoreError> {
        yield_now().await;
        self.inner.list_org_members(org_id).await
    }

    async fn join_organization(
        &self,
        user_id: Uuid,
        org_id: i64,
        role: Role,
    ) -> Result<JoinOutcome, StoreError> {
        yield_now().await;
        self.inner.join_organization(user_id, org_id, role).await
    }

    async fn update_role(
        &self,
        membership_id: i64,
        role: Role,
    ) -> Result<Option<Membership>, StoreError> {
        yield_now().await;
        self.inner.update_role(membership_id, role).await
    }

    async fn delete_membership(&self, membership_id: i64) -> Result<bool, StoreError> {
        yield_now().await;
        self.inner.delete_membership(membership_id).await
    }
}

#[async_trait]
impl RsvpStore for YieldingStore {
    async fn find_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<Option<Rsvp>, StoreError> {
        yield_now().await;
        self.inner.find_rsvp(event_id, user_id).await
    }

    async fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, StoreError> {
        yield_now().await;
        self.inner.list_rsvps(event_id).await
    }

    async fn count_rsvps(&self, event_id: i64) -> Result<RsvpCounts, StoreError> {
        yield_now().await;
        self.inner.count_rsvps(event_id).await
    }

    async fn admit_rsvp(
        &self,
        event_id: i64,
        user_id: Uuid,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Admission>, StoreError> {
        yield_now().await;
        self.inner.admit_rsvp(event_id, user_id, status, now).await
    }

    async fn record_payment(
        &self,
        event_id: i64,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError> {
        yield_now().await;
        self.inner.record_payment(event_id, user_id, now).await
    }

    async fn delete_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<bool, StoreError> {
        yield_now().await;
        self.inner.delete_rsvp(event_id, user_id).await
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub processor: Arc<FakeProcessor>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let processor = Arc::new(FakeProcessor::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState {
            store: store.clone(),
            processor: processor.clone(),
            identity: Arc::new(JwtIdentity::new(
                super::auth::jwt::tests::SECRET,
                None,
            )),
            notifier: notifier.clone(),
        };
        Self {
            state,
            store,
            processor,
            notifier,
        }
    }

    /// Service calls go through a [`YieldingStore`]; `store` still reaches
    /// the shared state directly.
    pub fn interleaved() -> Self {
        let mut harness = Self::new();
        harness.state.store = Arc::new(YieldingStore {
            inner: harness.store.clone(),
        });
        harness
    }

    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        let mut harness = Self::new();
        harness.state.notifier = notifier;
        harness
    }

    pub async fn seed_event(&self, org: Option<i64>, cap: Option<i32>, price_cents: i32) -> Event {
        let start = Utc::now() + Duration::days(7);
        self.store
            .create_event(NewEvent {
                title: "Spring showcase".to_string(),
                description: Some("Student projects on display".to_string()),
                location: Some("Main hall".to_string()),
                start_time: start,
                end_time: start + Duration::hours(3),
                attendee_cap: cap,
                price_cents,
                created_by_org_id: org,
                created_by_user_id: Uuid::new_v4(),
                restricted_to_org: org.is_some(),
            })
            .await
            .unwrap()
    }

    pub async fn join(&self, user: &AuthUser, org_id: i64, role: Role) -> Membership {
        self.store.seed_membership(user.user_id, org_id, role)
    }
}

pub fn user() -> AuthUser {
    let user_id = Uuid::new_v4();
    AuthUser {
        user_id,
        email: Some(format!("{}@campus.test", &user_id.simple().to_string()[..8])),
        username: Some("student".to_string()),
        full_name: None,
    }
}

pub fn paid_session(id: &str, event: &Event, user: &AuthUser) -> SessionDetails {
    SessionDetails {
        id: id.to_string(),
        payment_status: "paid".to_string(),
        amount_total: Some(i64::from(event.price_cents)),
        metadata: HashMap::from([
            ("event_id".to_string(), event.event_id.to_string()),
            ("user_id".to_string(), user.user_id.to_string()),
        ]),
    }
}

/// Lets spawned notification tasks run before the test inspects them.
pub async fn settle() {
    for _ in 0..10 {
        yield_now().await;
    }
}
