use std::collections::HashMap;

use async_trait::async_trait;
use derive_more::Display;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Display)]
pub enum ProcessorError {
    #[display(fmt = "payment processor request failed: {}", _0)]
    Transport(reqwest::Error),

    #[display(fmt = "payment processor answered {}: {}", status, message)]
    Api { status: u16, message: String },

    #[display(fmt = "no such checkout session")]
    SessionNotFound,
}

impl std::error::Error for ProcessorError {}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        ProcessorError::Transport(err)
    }
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum WebhookError {
    #[display(fmt = "missing signature header")]
    MissingHeader,

    #[display(fmt = "malformed signature header")]
    MalformedHeader,

    #[display(fmt = "signature timestamp outside the tolerance window")]
    Expired,

    #[display(fmt = "no signature matches the payload")]
    Mismatch,

    #[display(fmt = "signed payload is not a valid event: {}", _0)]
    Payload(String),
}

impl std::error::Error for WebhookError {}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub event_id: i64,
    pub title: String,
    pub price_cents: i32,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// The `(event, user)` pair a checkout session was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTarget {
    pub event_id: i64,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: String,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SessionDetails {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// Decodes the metadata written by `create_checkout_session`.
    pub fn target(&self) -> Option<SessionTarget> {
        let event_id = self.metadata.get("event_id")?.parse::<i64>().ok()?;
        let user_id = self.metadata.get("user_id")?.parse::<Uuid>().ok()?;
        Some(SessionTarget { event_id, user_id })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorEvent {
    CheckoutCompleted(SessionDetails),
    Other(String),
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProcessorError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, ProcessorError>;

    /// Authenticates a raw webhook body against its signature header before
    /// anything in it is trusted.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<ProcessorEvent, WebhookError>;
}
