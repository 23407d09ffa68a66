use chrono::Utc;
use log::info;

use super::{
    auth::AuthUser,
    gate, load_event,
    notify::{self, RsvpNotice},
    AppState,
};
use crate::{
    db::Admission,
    dto::RsvpSummary,
    errors::{AppError, Rejection},
    models::{Event, Rsvp, RsvpStatus},
};

/// Outcome of a successful RSVP submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub rsvp: Rsvp,
    pub created: bool,
}

/// Creates or updates the caller's RSVP after the membership, payment and
/// capacity gates all pass.
pub async fn submit(
    state: &AppState,
    event_id: i64,
    user: &AuthUser,
    status: RsvpStatus,
) -> Result<Submitted, AppError> {
    let event = load_event(state, event_id).await?;
    gate::membership_gate(state.store.as_ref(), &event, user.user_id).await?;

    let admission = state
        .store
        .admit_rsvp(event_id, user.user_id, status, Utc::now())
        .await?
        .ok_or_else(AppError::event_not_found)?;

    let (rsvp, created, changed) = match admission {
        Admission::Created(rsvp) => (rsvp, true, true),
        Admission::Updated { previous, rsvp } => {
            let changed = previous != rsvp.status;
            (rsvp, false, changed)
        }
        Admission::Rejected(rejection) => {
            info!(
                "rsvp {} by {} on event {} rejected: {}",
                status.as_str(),
                user.user_id,
                event_id,
                rejection.code()
            );
            return Err(rejection.into());
        }
    };

    if changed {
        notify::dispatch(
            state.notifier.clone(),
            RsvpNotice::new(&event, &rsvp, Some(user)),
        );
    }
    Ok(Submitted { rsvp, created })
}

pub async fn get_mine(
    state: &AppState,
    event_id: i64,
    user: &AuthUser,
) -> Result<Option<Rsvp>, AppError> {
    Ok(state.store.find_rsvp(event_id, user.user_id).await?)
}

/// Organization members see the roster of their organization's events. An
/// event without an organization shows its roster to its creator only.
pub async fn roster(state: &AppState, event_id: i64, user: &AuthUser) -> Result<Vec<Rsvp>, AppError> {
    let event = load_event(state, event_id).await?;
    authorize_roster(state, &event, user).await?;
    Ok(state.store.list_rsvps(event_id).await?)
}

async fn authorize_roster(state: &AppState, event: &Event, user: &AuthUser) -> Result<(), AppError> {
    match event.created_by_org_id {
        Some(_) => gate::membership_gate(state.store.as_ref(), event, user.user_id)
            .await
            .map(|_| ()),
        None if event.created_by_user_id == user.user_id => Ok(()),
        None => Err(Rejection::NotAMember.into()),
    }
}

pub async fn summary(state: &AppState, event_id: i64) -> Result<RsvpSummary, AppError> {
    let event = load_event(state, event_id).await?;
    let counts = state.store.count_rsvps(event_id).await?;
    let spots_remaining = event
        .attendee_cap
        .map(|cap| (i64::from(cap) - counts.going).max(0));
    Ok(RsvpSummary {
        counts,
        attendee_cap: event.attendee_cap,
        spots_remaining,
    })
}

/// Deletes the caller's RSVP. A recorded payment is not refunded.
pub async fn cancel(state: &AppState, event_id: i64, user: &AuthUser) -> Result<(), AppError> {
    load_event(state, event_id).await?;
    if state.store.delete_rsvp(event_id, user.user_id).await? {
        info!("rsvp for event {} withdrawn by {}", event_id, user.user_id);
        Ok(())
    } else {
        Err(AppError::NotFound("RSVP not found".to_string()))
    }
}
