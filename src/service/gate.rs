//! Admission gates for RSVP requests.
//!
//! Each gate is a pure decision over data the caller has already loaded. The
//! store runs [`screen`] inside the same atomic unit as the RSVP write, so the
//! payment and capacity decisions always see the rows they are about to
//! change.

use uuid::Uuid;

use crate::{
    db::Store,
    errors::{AppError, Rejection},
    models::{Event, Membership, Rsvp, RsvpStatus},
};

/// Events without an owning organization are open to everyone.
pub fn check_membership(
    event: &Event,
    membership: Option<Membership>,
) -> Result<Option<Membership>, Rejection> {
    match event.created_by_org_id {
        None => Ok(None),
        Some(_) => membership.map(Some).ok_or(Rejection::NotAMember),
    }
}

/// Looks up the caller's membership in the event's organization and applies
/// [`check_membership`].
pub async fn membership_gate(
    store: &dyn Store,
    event: &Event,
    user_id: Uuid,
) -> Result<Option<Membership>, AppError> {
    let membership = match event.created_by_org_id {
        Some(org_id) => store.find_membership(user_id, org_id).await?,
        None => None,
    };
    Ok(check_membership(event, membership)?)
}

/// Attendance at a priced event needs a paid RSVP. Tentative and declined
/// answers never confirm attendance and pass freely.
pub fn check_payment(
    event: &Event,
    existing: Option<&Rsvp>,
    target: RsvpStatus,
) -> Result<(), Rejection> {
    if target != RsvpStatus::Attending || !event.is_priced() {
        return Ok(());
    }
    match existing {
        Some(rsvp) if rsvp.paid => Ok(()),
        _ => Err(Rejection::PaymentRequired {
            price_cents: event.price_cents,
        }),
    }
}

/// Whether the capacity gate has to count attendees for this request.
pub fn needs_headcount(event: &Event, existing: Option<&Rsvp>, target: RsvpStatus) -> bool {
    target == RsvpStatus::Attending
        && event.attendee_cap.is_some()
        && !existing.map_or(false, Rsvp::is_attending)
}

/// `attending` is the number of RSVPs currently in the attending state. A
/// caller who is already attending is part of that number, so re-confirming
/// never counts them twice.
pub fn check_capacity(
    event: &Event,
    existing: Option<&Rsvp>,
    target: RsvpStatus,
    attending: i64,
) -> Result<(), Rejection> {
    if !needs_headcount(event, existing, target) {
        return Ok(());
    }
    match event.attendee_cap {
        Some(cap) if attending >= i64::from(cap) => Err(Rejection::CapacityFull { cap }),
        _ => Ok(()),
    }
}

/// Payment gate followed by capacity gate.
pub fn screen(
    event: &Event,
    existing: Option<&Rsvp>,
    target: RsvpStatus,
    attending: i64,
) -> Result<(), Rejection> {
    check_payment(event, existing, target)?;
    check_capacity(event, existing, target, attending)
}
