use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::{
    dto::{EventFilter, NewEventDto, UpdateEventDto},
    errors::AppError,
    service::{self, auth::current_user, AppState},
};

#[get("")]
pub async fn get_all(
    filter: web::Query<EventFilter>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let events = service::event::list(&state, &filter).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "events": events })))
}

#[post("/create")]
pub async fn create(
    req: HttpRequest,
    new_event_dto: web::Json<NewEventDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let event = service::event::create(&state, &user, new_event_dto.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Event created successfully",
        "event": event,
    })))
}

#[get("/{id}")]
pub async fn get_by_id(
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let event = service::event::get_by_id(&state, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "event": event })))
}

#[put("/{id}")]
pub async fn update(
    req: HttpRequest,
    id: web::Path<i64>,
    update_event_dto: web::Json<UpdateEventDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let event =
        service::event::update(&state, id.into_inner(), &user, update_event_dto.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Event updated successfully",
        "event": event,
    })))
}

#[delete("/{id}")]
pub async fn remove(
    req: HttpRequest,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    service::event::delete(&state, id.into_inner(), &user).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Event deleted successfully",
    })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_all)
        .service(create)
        .service(get_by_id)
        .service(update)
        .service(remove);
}
