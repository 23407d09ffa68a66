use actix_web::{post, web, HttpRequest, HttpResponse};
use log::info;
use serde_json::json;

use crate::{
    dto::{CheckoutRequestDto, ConfirmPaymentDto, RsvpEnvelope},
    errors::AppError,
    service::{
        self,
        auth::current_user,
        payment::WebhookOutcome,
        stripe::SIGNATURE_HEADER,
        AppState,
    },
};

#[post("/create-checkout-session")]
pub async fn create_checkout_session(
    req: HttpRequest,
    dto: web::Json<CheckoutRequestDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let session = service::payment::create_checkout(&state, dto.event_id, &user).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "session_id": session.id,
        "url": session.url,
    })))
}

#[post("/confirm")]
pub async fn confirm(
    req: HttpRequest,
    dto: web::Json<ConfirmPaymentDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let record = service::payment::confirm(&state, dto.session_id.trim(), &user).await?;
    Ok(HttpResponse::Ok().json(RsvpEnvelope::with_message(
        "Payment confirmed",
        record.rsvp().clone(),
    )))
}

/// The raw body is needed byte for byte to check the signature.
#[post("/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let outcome = service::payment::handle_webhook(&state, &body, signature).await?;
    if let WebhookOutcome::Ignored(reason) = &outcome {
        info!("webhook ignored: {}", reason);
    }
    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_checkout_session).service(confirm);
}

/// Mounted outside the bearer-token scope; the signature authenticates it.
pub fn init_webhook_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(stripe_webhook);
}
