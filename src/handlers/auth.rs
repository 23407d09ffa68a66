use actix_web::{get, HttpRequest, HttpResponse};
use serde_json::json;

use crate::{errors::AppError, service::auth::current_user};

#[get("/me")]
pub async fn me(req: HttpRequest) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "user": user })))
}

pub fn init_routes(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(me);
}
