use chrono::{DateTime, Utc};
use log::info;

use super::{
    auth::AuthUser,
    load_event,
    notify::{self, RsvpNotice},
    AppState,
};
use crate::{
    db::EventRevision,
    dto::{EventFilter, NewEventDto, UpdateEventDto},
    errors::AppError,
    models::{Event, NewEvent},
};

fn validate_schedule(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    if end <= start {
        return Err(AppError::BadRequest(
            "Event end time must be after its start time".to_string(),
        ));
    }
    Ok(())
}

fn validate_limits(attendee_cap: Option<i32>, price_cents: i32) -> Result<(), AppError> {
    if matches!(attendee_cap, Some(cap) if cap <= 0) {
        return Err(AppError::BadRequest(
            "Attendee cap must be a positive number".to_string(),
        ));
    }
    if price_cents < 0 {
        return Err(AppError::BadRequest("Price cannot be negative".to_string()));
    }
    Ok(())
}

fn clean_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Event title is required".to_string()));
    }
    Ok(title.to_string())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn require_org_admin(state: &AppState, user: &AuthUser, org_id: i64) -> Result<(), AppError> {
    match state.store.find_membership(user.user_id, org_id).await? {
        Some(membership) if membership.is_admin() => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only organization admins can manage this organization's events".to_string(),
        )),
    }
}

/// The creator always manages an event; so does any admin of its organization.
async fn authorize_manage(state: &AppState, event: &Event, user: &AuthUser) -> Result<(), AppError> {
    if event.created_by_user_id == user.user_id {
        return Ok(());
    }
    match event.created_by_org_id {
        Some(org_id) => require_org_admin(state, user, org_id).await,
        None => Err(AppError::Forbidden(
            "Only the event creator can manage this event".to_string(),
        )),
    }
}

pub async fn create(state: &AppState, user: &AuthUser, dto: NewEventDto) -> Result<Event, AppError> {
    let title = clean_title(&dto.title)?;
    let price_cents = dto.price_cents.unwrap_or(0);
    validate_schedule(dto.start_time, dto.end_time)?;
    validate_limits(dto.attendee_cap, price_cents)?;
    if let Some(org_id) = dto.created_by_org_id {
        require_org_admin(state, user, org_id).await?;
    }

    let event = state
        .store
        .create_event(NewEvent {
            title,
            description: blank_to_none(dto.description),
            location: blank_to_none(dto.location),
            start_time: dto.start_time,
            end_time: dto.end_time,
            attendee_cap: dto.attendee_cap,
            price_cents,
            created_by_org_id: dto.created_by_org_id,
            created_by_user_id: user.user_id,
            restricted_to_org: dto.restricted_to_org && dto.created_by_org_id.is_some(),
        })
        .await?;
    info!("event {} created by {}", event.event_id, user.user_id);
    Ok(event)
}

pub async fn list(state: &AppState, filter: &EventFilter) -> Result<Vec<Event>, AppError> {
    Ok(state.store.list_events(filter).await?)
}

pub async fn get_by_id(state: &AppState, event_id: i64) -> Result<Event, AppError> {
    load_event(state, event_id).await
}

pub async fn update(
    state: &AppState,
    event_id: i64,
    user: &AuthUser,
    fields: UpdateEventDto,
) -> Result<Event, AppError> {
    let mut event = load_event(state, event_id).await?;
    authorize_manage(state, &event, user).await?;

    if let Some(title) = fields.title {
        event.title = clean_title(&title)?;
    }
    if let Some(description) = fields.description {
        event.description = blank_to_none(description);
    }
    if let Some(location) = fields.location {
        event.location = blank_to_none(location);
    }
    if let Some(start_time) = fields.start_time {
        event.start_time = start_time;
    }
    if let Some(end_time) = fields.end_time {
        event.end_time = end_time;
    }
    if let Some(attendee_cap) = fields.attendee_cap {
        event.attendee_cap = attendee_cap;
    }
    if let Some(price_cents) = fields.price_cents {
        event.price_cents = price_cents;
    }
    if let Some(restricted) = fields.restricted_to_org {
        event.restricted_to_org = restricted && event.created_by_org_id.is_some();
    }
    validate_schedule(event.start_time, event.end_time)?;
    validate_limits(event.attendee_cap, event.price_cents)?;

    let revision = state
        .store
        .update_event(&event)
        .await?
        .ok_or_else(AppError::event_not_found)?;
    let (updated, demoted) = match revision {
        EventRevision::Applied { event, demoted } => (event, demoted),
        EventRevision::CapBelowAttendance { attending } => {
            return Err(AppError::Conflict(format!(
                "{attending} people are already attending; the attendee cap cannot be lower"
            )));
        }
    };
    info!("event {} updated by {}", event_id, user.user_id);
    if !demoted.is_empty() {
        info!(
            "event {} is now priced; {} unpaid attendees moved to tentative",
            event_id,
            demoted.len()
        );
    }
    for rsvp in &demoted {
        notify::dispatch(state.notifier.clone(), RsvpNotice::new(&updated, rsvp, None));
    }
    Ok(updated)
}

/// Removes the event and every RSVP attached to it.
pub async fn delete(state: &AppState, event_id: i64, user: &AuthUser) -> Result<(), AppError> {
    let event = load_event(state, event_id).await?;
    authorize_manage(state, &event, user).await?;
    if !state.store.delete_event(event_id).await? {
        return Err(AppError::event_not_found());
    }
    info!("event {} deleted by {}", event_id, user.user_id);
    Ok(())
}
