use std::fmt;

use actix_web::{
    error,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use derive_more::Display;
use log::error;
use serde_json::json;

use crate::{db::StoreError, service::processor::ProcessorError};

/// Expected outcomes of the admission gates. These are user-facing answers,
/// not failures of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotAMember,
    PaymentRequired { price_cents: i32 },
    CapacityFull { cap: i32 },
    PaymentNotCompleted,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NotAMember => "NOT_A_MEMBER",
            Rejection::PaymentRequired { .. } => "PAYMENT_REQUIRED",
            Rejection::CapacityFull { .. } => "CAPACITY_FULL",
            Rejection::PaymentNotCompleted => "PAYMENT_NOT_COMPLETED",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotAMember => {
                write!(f, "You must be a member of the organization to access this event")
            }
            Rejection::PaymentRequired { price_cents } => write!(
                f,
                "Please pay ${}.{:02} before RSVPing to this event",
                price_cents / 100,
                price_cents % 100
            ),
            Rejection::CapacityFull { .. } => write!(f, "Event has reached its attendee capacity"),
            Rejection::PaymentNotCompleted => write!(f, "Payment has not been completed"),
        }
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "{}", _0)]
    Unauthenticated(String),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Rejected(Rejection),

    #[display(
        fmt = "Valid status is required. Must be one of: going, not_going, maybe (got '{}')",
        _0
    )]
    InvalidStatus(String),

    #[display(fmt = "{}", _0)]
    BadRequest(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(fmt = "Service temporarily unavailable, please retry: {}", _0)]
    UpstreamUnavailable(String),

    #[display(fmt = "Webhook signature verification failed")]
    SignatureInvalid,
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Rejected(rejection) => rejection.code(),
            AppError::InvalidStatus(_) => "INVALID_STATUS",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::SignatureInvalid => "SIGNATURE_INVALID",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::UpstreamUnavailable(_))
    }

    pub fn event_not_found() -> Self {
        AppError::NotFound("Event not found".to_string())
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        AppError::Rejected(rejection)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        error!("store call failed: {}", err);
        AppError::UpstreamUnavailable("storage is unavailable".to_string())
    }
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::SessionNotFound => {
                AppError::NotFound("Checkout session not found".to_string())
            }
            other => {
                error!("payment processor call failed: {}", other);
                AppError::UpstreamUnavailable("payment processor is unavailable".to_string())
            }
        }
    }
}

impl error::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
            "code": self.code(),
            "retryable": self.is_retryable(),
        });
        match self {
            AppError::Rejected(Rejection::PaymentRequired { price_cents }) => {
                body["price_cents"] = json!(price_cents);
            }
            AppError::Rejected(Rejection::CapacityFull { cap }) => {
                body["attendee_cap"] = json!(cap);
            }
            _ => {}
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Rejected(Rejection::NotAMember) => StatusCode::FORBIDDEN,
            AppError::Rejected(Rejection::PaymentRequired { .. }) => StatusCode::PAYMENT_REQUIRED,
            AppError::Rejected(Rejection::CapacityFull { .. }) => StatusCode::BAD_REQUEST,
            AppError::Rejected(Rejection::PaymentNotCompleted) => StatusCode::PAYMENT_REQUIRED,
            AppError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SignatureInvalid => StatusCode::BAD_REQUEST,
        }
    }
}
