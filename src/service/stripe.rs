//! Stripe checkout client and webhook signature verification.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::processor::{
    CheckoutRequest, CheckoutSession, PaymentProcessor, ProcessorError, ProcessorEvent,
    SessionDetails, WebhookError,
};
use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    webhook_tolerance_secs: i64,
    frontend_url: String,
    currency: String,
}

impl StripeClient {
    pub fn new(config: &Config) -> Result<Self, ProcessorError> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: config.stripe_api_base.clone(),
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            webhook_tolerance_secs: config.webhook_tolerance_secs,
            frontend_url: config.frontend_url.clone(),
            currency: config.currency.clone(),
        })
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        let event_page = format!("{}/events/{}", self.frontend_url, request.event_id);
        vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", self.currency.clone()),
            ("line_items[0][price_data][unit_amount]", request.price_cents.to_string()),
            ("line_items[0][price_data][product_data][name]", request.title.clone()),
            ("metadata[event_id]", request.event_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
            (
                "success_url",
                format!("{event_page}?payment=success&session_id={{CHECKOUT_SESSION_ID}}"),
            ),
            ("cancel_url", format!("{event_page}?payment=cancel")),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

async fn read_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProcessorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProcessorError::SessionNotFound);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or(text);
    Err(ProcessorError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Stripe session ids are opaque but never contain path or query syntax.
fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&self.checkout_form(request))
            .send()
            .await?;
        let session: CheckoutSession = read_response(response).await?;
        debug!(
            "checkout session {} opened for event {} user {}",
            session.id, request.event_id, request.user_id
        );
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, ProcessorError> {
        if !is_valid_session_id(session_id) {
            return Err(ProcessorError::SessionNotFound);
        }
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        read_response(response).await
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<ProcessorEvent, WebhookError> {
        construct_event(
            payload,
            signature,
            &self.webhook_secret,
            Utc::now().timestamp(),
            self.webhook_tolerance_secs,
        )
    }
}

pub fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<Vec<u8>, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Checks a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the payload.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or(WebhookError::MalformedHeader)?;
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedHeader)?,
                )
            }
            "v1" => candidates.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    if timestamp < now - tolerance_secs {
        return Err(WebhookError::Expired);
    }

    let expected =
        compute_signature(secret, timestamp, payload).map_err(|_| WebhookError::Mismatch)?;
    let matched = candidates.iter().any(|candidate| match hex::decode(candidate) {
        Ok(sig) => sig.len() == expected.len() && bool::from(sig.as_slice().ct_eq(expected.as_slice())),
        Err(_) => false,
    });
    if matched {
        Ok(())
    } else {
        Err(WebhookError::Mismatch)
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: serde_json::Value,
}

/// Verifies the signature and only then decodes the payload.
pub fn construct_event(
    payload: &[u8],
    signature: Option<&str>,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<ProcessorEvent, WebhookError> {
    let header = signature.ok_or(WebhookError::MissingHeader)?;
    if let Err(err) = verify_signature(payload, header, secret, now, tolerance_secs) {
        warn!("rejected webhook: {}", err);
        return Err(err);
    }
    let envelope: WebhookEnvelope =
        serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))?;
    match envelope.kind.as_str() {
        CHECKOUT_COMPLETED | ASYNC_PAYMENT_SUCCEEDED => {
            let session: SessionDetails = serde_json::from_value(envelope.data.object)
                .map_err(|e| WebhookError::Payload(e.to_string()))?;
            Ok(ProcessorEvent::CheckoutCompleted(session))
        }
        _ => Ok(ProcessorEvent::Other(envelope.kind)),
    }
}
