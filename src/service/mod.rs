pub mod auth;
pub mod event;
pub mod gate;
pub mod log;
pub mod membership;
pub mod notify;
pub mod payment;
pub mod processor;
pub mod rsvp;
pub mod stripe;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use crate::{db::Store, errors::AppError, models::Event};

use self::{auth::IdentityProvider, notify::Notifier, processor::PaymentProcessor};

/// Everything a request handler needs, shared across workers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn Notifier>,
}

pub async fn load_event(state: &AppState, event_id: i64) -> Result<Event, AppError> {
    state
        .store
        .get_event(event_id)
        .await?
        .ok_or_else(AppError::event_not_found)
}
