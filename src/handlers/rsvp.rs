use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::{
    dto::{RsvpEnvelope, RsvpRequest},
    errors::AppError,
    service::{self, auth::current_user, AppState},
};

#[post("/{id}/rsvp")]
pub async fn submit(
    req: HttpRequest,
    id: web::Path<i64>,
    body: web::Json<RsvpRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let status = body.status()?;
    let out = service::rsvp::submit(&state, id.into_inner(), &user, status).await?;
    if out.created {
        Ok(HttpResponse::Created().json(RsvpEnvelope::with_message(
            "RSVP created successfully",
            out.rsvp,
        )))
    } else {
        Ok(HttpResponse::Ok().json(RsvpEnvelope::with_message(
            "RSVP updated successfully",
            out.rsvp,
        )))
    }
}

#[get("/{id}/rsvp")]
pub async fn get_mine(
    req: HttpRequest,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let rsvp = service::rsvp::get_mine(&state, id.into_inner(), &user).await?;
    Ok(HttpResponse::Ok().json(RsvpEnvelope::lookup(rsvp)))
}

#[delete("/{id}/rsvp")]
pub async fn cancel(
    req: HttpRequest,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    service::rsvp::cancel(&state, id.into_inner(), &user).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "RSVP cancelled successfully",
    })))
}

#[get("/{id}/rsvps")]
pub async fn roster(
    req: HttpRequest,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let rsvps = service::rsvp::roster(&state, id.into_inner(), &user).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "rsvps": rsvps })))
}

#[get("/{id}/rsvp-counts")]
pub async fn counts(
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let summary = service::rsvp::summary(&state, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "counts": summary })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(submit)
        .service(get_mine)
        .service(cancel)
        .service(roster)
        .service(counts);
}
