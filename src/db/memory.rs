//! In-memory store for tests. One mutex guards all state, which gives every
//! trait method the same atomicity the Postgres transactions provide.

use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    Admission, EventRevision, EventStore, JoinOutcome, MembershipStore, PaymentRecord, RsvpStore,
    StoreError,
};
use crate::{
    dto::EventFilter,
    models::{Event, Membership, NewEvent, Role, Rsvp, RsvpCounts, RsvpStatus},
    service::gate,
};

#[derive(Default)]
struct State {
    events: BTreeMap<i64, Event>,
    memberships: BTreeMap<i64, Membership>,
    rsvps: BTreeMap<i64, Rsvp>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_membership(&mut self, user_id: Uuid, org_id: i64, role: Role) -> Membership {
        let membership_id = self.next_id();
        let membership = Membership {
            membership_id,
            user_id,
            org_id,
            role,
        };
        self.memberships.insert(membership_id, membership.clone());
        membership
    }

    fn rsvp_mut(&mut self, event_id: i64, user_id: Uuid) -> Option<&mut Rsvp> {
        self.rsvps
            .values_mut()
            .find(|r| r.event_id == event_id && r.user_id == user_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rsvp_count(&self) -> usize {
        self.state.lock().unwrap().rsvps.len()
    }

    /// Adds a membership with any role, skipping the join rules.
    pub fn seed_membership(&self, user_id: Uuid, org_id: i64, role: Role) -> Membership {
        self.state
            .lock()
            .unwrap()
            .add_membership(user_id, org_id, role)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let mut state = self.state.lock().unwrap();
        let event_id = state.next_id();
        let created = Event {
            event_id,
            title: event.title,
            description: event.description,
            location: event.location,
            start_time: event.start_time,
            end_time: event.end_time,
            attendee_cap: event.attendee_cap,
            price_cents: event.price_cents,
            created_by_org_id: event.created_by_org_id,
            created_by_user_id: event.created_by_user_id,
            restricted_to_org: event.restricted_to_org,
        };
        state.events.insert(event_id, created.clone());
        Ok(created)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>, StoreError> {
        Ok(self.state.lock().unwrap().events.get(&event_id).cloned())
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| filter.org_id.map_or(true, |org| e.created_by_org_id == Some(org)))
            .filter(|e| filter.user_id.map_or(true, |user| e.created_by_user_id == user))
            .filter(|e| filter.restricted.map_or(true, |r| e.restricted_to_org == r))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    async fn update_event(&self, event: &Event) -> Result<Option<EventRevision>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&event.event_id) {
            return Ok(None);
        }

        let unpaid: Vec<i64> = state
            .rsvps
            .values()
            .filter(|r| r.event_id == event.event_id && r.is_attending() && !r.paid)
            .map(|r| r.rsvp_id)
            .collect();
        let demote = if event.is_priced() { unpaid } else { Vec::new() };
        let attending = state
            .rsvps
            .values()
            .filter(|r| r.event_id == event.event_id && r.is_attending())
            .count()
            - demote.len();
        if let Some(cap) = event.attendee_cap {
            if attending as i64 > i64::from(cap) {
                return Ok(Some(EventRevision::CapBelowAttendance {
                    attending: attending as i64,
                }));
            }
        }

        state.events.insert(event.event_id, event.clone());
        let demoted = demote
            .iter()
            .map(|id| {
                let rsvp = state.rsvps.get_mut(id).unwrap();
                rsvp.status = RsvpStatus::Tentative;
                rsvp.clone()
            })
            .collect();
        Ok(Some(EventRevision::Applied {
            event: event.clone(),
            demoted,
        }))
    }

    async fn delete_event(&self, event_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let removed = state.events.remove(&event_id).is_some();
        if removed {
            state.rsvps.retain(|_, r| r.event_id != event_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_membership(
        &self,
        user_id: Uuid,
        org_id: i64,
    ) -> Result<Option<Membership>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .find(|m| m.user_id == user_id && m.org_id == org_id)
            .cloned())
    }

    async fn get_membership(&self, membership_id: i64) -> Result<Option<Membership>, StoreError> {
        Ok(self.state.lock().unwrap().memberships.get(&membership_id).cloned())
    }

    async fn list_user_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .rev()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_org_members(&self, org_id: i64) -> Result<Vec<Membership>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .rev()
            .filter(|m| m.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn join_organization(
        &self,
        user_id: Uuid,
        org_id: i64,
        role: Role,
    ) -> Result<JoinOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut members = state.memberships.values().filter(|m| m.org_id == org_id);
        if members.clone().any(|m| m.user_id == user_id) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if role == Role::Admin && members.next().is_some() {
            return Ok(JoinOutcome::AdminTaken);
        }
        Ok(JoinOutcome::Joined(state.add_membership(user_id, org_id, role)))
    }

    async fn update_role(
        &self,
        membership_id: i64,
        role: Role,
    ) -> Result<Option<Membership>, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.memberships.get_mut(&membership_id).map(|m| {
            m.role = role;
            m.clone()
        }))
    }

    async fn delete_membership(&self, membership_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .memberships
            .remove(&membership_id)
            .is_some())
    }
}

#[async_trait]
impl RsvpStore for MemoryStore {
    async fn find_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<Option<Rsvp>, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.rsvp_mut(event_id, user_id).map(|r| r.clone()))
    }

    async fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rsvps: Vec<Rsvp> = state
            .rsvps
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        rsvps.sort_by(|a, b| b.rsvp_time.cmp(&a.rsvp_time));
        Ok(rsvps)
    }

    async fn count_rsvps(&self, event_id: i64) -> Result<RsvpCounts, StoreError> {
        let state = self.state.lock().unwrap();
        let mut counts = RsvpCounts::default();
        for rsvp in state.rsvps.values().filter(|r| r.event_id == event_id) {
            counts.add(rsvp.status, 1);
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
        let mut state = self.state.lock().unwrap();
        let Some(event) = state.events.get(&event_id).cloned() else {
            return Ok(None);
        };
        let existing = state.rsvp_mut(event_id, user_id).map(|r| r.clone());
        let attending = state
            .rsvps
            .values()
            .filter(|r| r.event_id == event_id && r.is_attending())
            .count() as i64;

        if let Err(rejection) = gate::screen(&event, existing.as_ref(), status, attending) {
            return Ok(Some(Admission::Rejected(rejection)));
        }

        match existing {
            Some(current) => {
                let stored = state.rsvps.get_mut(&current.rsvp_id).unwrap();
                stored.status = status;
                stored.rsvp_time = now;
                Ok(Some(Admission::Updated {
                    previous: current.status,
                    rsvp: stored.clone(),
                }))
            }
            None => {
                let rsvp_id = state.next_id();
                let rsvp = Rsvp {
                    rsvp_id,
                    event_id,
                    user_id,
                    status,
                    rsvp_time: now,
                    paid: false,
                    paid_at: None,
                };
                state.rsvps.insert(rsvp_id, rsvp.clone());
                Ok(Some(Admission::Created(rsvp)))
            }
        }
    }

    async fn record_payment(
        &self,
        event_id: i64,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.rsvp_mut(event_id, user_id) {
            if existing.paid {
                return Ok(PaymentRecord::AlreadyPaid(existing.clone()));
            }
            existing.status = RsvpStatus::Attending;
            existing.rsvp_time = now;
            existing.paid = true;
            existing.paid_at = Some(now);
            return Ok(PaymentRecord::Recorded(existing.clone()));
        }
        let rsvp_id = state.next_id();
        let rsvp = Rsvp {
            rsvp_id,
            event_id,
            user_id,
            status: RsvpStatus::Attending,
            rsvp_time: now,
            paid: true,
            paid_at: Some(now),
        };
        state.rsvps.insert(rsvp_id, rsvp.clone());
        Ok(PaymentRecord::Recorded(rsvp))
    }

    async fn delete_rsvp(&self, event_id: i64, user_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.rsvps.len();
        state
            .rsvps
            .retain(|_, r| !(r.event_id == event_id && r.user_id == user_id));
        Ok(state.rsvps.len() < before)
    }
}
