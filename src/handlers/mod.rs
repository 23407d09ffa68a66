pub mod auth;
pub mod event;
pub mod membership;
pub mod payment;
pub mod rsvp;

use std::fmt::Display;

use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError},
    web, HttpRequest,
};

use crate::errors::AppError;

/// Extractor failures answer with the same JSON envelope as every other error.
fn bad_request<E: Display>(err: E, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Malformed request: {err}")).into()
}

/// Routes behind `AuthMiddleware`. Each handler decides whether it needs a
/// caller.
pub fn init_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(bad_request::<JsonPayloadError>))
        .app_data(web::QueryConfig::default().error_handler(bad_request::<QueryPayloadError>))
        .app_data(web::PathConfig::default().error_handler(bad_request::<PathError>))
        .service(web::scope("/auth").configure(auth::init_routes))
        .service(
            web::scope("/events")
                .configure(rsvp::init_routes)
                .configure(event::init_routes),
        )
        .service(web::scope("/memberships").configure(membership::init_routes))
        .service(web::scope("/payments").configure(payment::init_routes));
}
