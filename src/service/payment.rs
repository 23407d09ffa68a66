//! Checkout creation and the projection of completed payments onto RSVPs.
//!
//! A payment reaches the store through two doors: the browser returning
//! from checkout (`confirm`) and the processor's signed webhook
//! (`handle_webhook`). Both end in [`apply_confirmation`], and the store's
//! conditional write makes the second arrival a no-op.

use chrono::Utc;
use log::{info, warn};

use super::{
    auth::AuthUser,
    gate, load_event,
    notify::{self, RsvpNotice},
    processor::{CheckoutRequest, CheckoutSession, ProcessorEvent, SessionDetails, WebhookError},
    AppState,
};
use crate::{
    db::PaymentRecord,
    errors::{AppError, Rejection},
    models::Rsvp,
};

pub async fn create_checkout(
    state: &AppState,
    event_id: i64,
    user: &AuthUser,
) -> Result<CheckoutSession, AppError> {
    let event = load_event(state, event_id).await?;
    if !event.is_priced() {
        return Err(AppError::BadRequest(
            "This event is free and does not require payment".to_string(),
        ));
    }
    gate::membership_gate(state.store.as_ref(), &event, user.user_id).await?;
    if let Some(rsvp) = state.store.find_rsvp(event_id, user.user_id).await? {
        if rsvp.paid {
            return Err(AppError::Conflict(
                "You have already paid for this event".to_string(),
            ));
        }
    }

    let session = state
        .processor
        .create_checkout_session(&CheckoutRequest {
            event_id,
            title: event.title.clone(),
            price_cents: event.price_cents,
            user_id: user.user_id,
        })
        .await?;
    info!(
        "checkout session {} created for event {} by {}",
        session.id, event_id, user.user_id
    );
    Ok(session)
}

/// Browser-side confirmation after the processor redirects back.
pub async fn confirm(
    state: &AppState,
    session_id: &str,
    user: &AuthUser,
) -> Result<PaymentRecord, AppError> {
    let session = state.processor.retrieve_session(session_id).await?;
    match session.target() {
        Some(target) if target.user_id == user.user_id => {}
        _ => {
            warn!(
                "user {} tried to confirm checkout session {} opened for someone else",
                user.user_id, session.id
            );
            return Err(AppError::NotFound("Checkout session not found".to_string()));
        }
    }
    apply_confirmation(state, &session, Some(user)).await
}

/// What the webhook endpoint should acknowledge.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Applied(Rsvp),
    Duplicate,
    /// A verified event that carries nothing to apply.
    Ignored(String),
    /// A verified payment the gates refused; acknowledged so the processor
    /// stops redelivering it.
    Refused(Rejection),
}

pub async fn handle_webhook(
    state: &AppState,
    payload: &[u8],
    signature: Option<&str>,
) -> Result<WebhookOutcome, AppError> {
    let event = state
        .processor
        .verify_webhook(payload, signature)
        .map_err(|err| match err {
            WebhookError::Payload(detail) => {
                AppError::BadRequest(format!("Invalid webhook payload: {detail}"))
            }
            _ => AppError::SignatureInvalid,
        })?;

    let session = match event {
        ProcessorEvent::CheckoutCompleted(session) => session,
        ProcessorEvent::Other(kind) => return Ok(WebhookOutcome::Ignored(kind)),
    };
    if !session.is_paid() || session.target().is_none() {
        return Ok(WebhookOutcome::Ignored(format!(
            "session {} carries no completed payment",
            session.id
        )));
    }

    match apply_confirmation(state, &session, None).await {
        Ok(PaymentRecord::Recorded(rsvp)) => Ok(WebhookOutcome::Applied(rsvp)),
        Ok(PaymentRecord::AlreadyPaid(_)) => Ok(WebhookOutcome::Duplicate),
        Err(AppError::Rejected(rejection)) => {
            warn!(
                "webhook payment for session {} refused: {}",
                session.id,
                rejection.code()
            );
            Ok(WebhookOutcome::Refused(rejection))
        }
        Err(AppError::NotFound(message)) => Ok(WebhookOutcome::Ignored(message)),
        Err(err) => Err(err),
    }
}

/// Records the payment described by `session` on its (event, user) RSVP.
/// `paid` only ever moves from false to true.
pub async fn apply_confirmation(
    state: &AppState,
    session: &SessionDetails,
    user: Option<&AuthUser>,
) -> Result<PaymentRecord, AppError> {
    if !session.is_paid() {
        return Err(Rejection::PaymentNotCompleted.into());
    }
    let target = session
        .target()
        .ok_or_else(|| AppError::BadRequest("Checkout session has no RSVP metadata".to_string()))?;
    let event = load_event(state, target.event_id).await?;
    if session.amount_total.unwrap_or(0) < i64::from(event.price_cents) {
        warn!(
            "session {} paid {:?} cents, event {} costs {}",
            session.id, session.amount_total, event.event_id, event.price_cents
        );
        return Err(Rejection::PaymentNotCompleted.into());
    }

    if let Some(existing) = state.store.find_rsvp(target.event_id, target.user_id).await? {
        if existing.paid {
            return Ok(PaymentRecord::AlreadyPaid(existing));
        }
    }
    gate::membership_gate(state.store.as_ref(), &event, target.user_id).await?;

    let record = state
        .store
        .record_payment(target.event_id, target.user_id, Utc::now())
        .await?;
    if let PaymentRecord::Recorded(rsvp) = &record {
        info!(
            "payment recorded for event {} user {} (session {})",
            target.event_id, target.user_id, session.id
        );
        notify::dispatch(
            state.notifier.clone(),
            RsvpNotice::new(&event, rsvp, user.filter(|u| u.user_id == target.user_id)),
        );
    }
    Ok(record)
}
