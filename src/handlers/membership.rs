use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use crate::{
    dto::{NewMembershipDto, UpdateMembershipDto},
    errors::AppError,
    service::{self, auth::current_user, AppState},
};

#[post("")]
pub async fn join(
    req: HttpRequest,
    dto: web::Json<NewMembershipDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let membership = service::membership::join(&state, &user, dto.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Joined organization successfully",
        "membership": membership,
    })))
}

#[get("")]
pub async fn mine(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let memberships = service::membership::mine(&state, &user).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "memberships": memberships })))
}

#[get("/organization/{org_id}")]
pub async fn org_members(
    req: HttpRequest,
    org_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let roster = service::membership::org_members(&state, &user, org_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "members": roster.members,
        "user_role": roster.user_role,
    })))
}

#[get("/user/{user_id}")]
pub async fn of_user(
    req: HttpRequest,
    user_id: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let caller = current_user(&req)?;
    let memberships = service::membership::of_user(&state, &caller, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "memberships": memberships })))
}

#[put("/{membership_id}")]
pub async fn update_role(
    req: HttpRequest,
    membership_id: web::Path<i64>,
    dto: web::Json<UpdateMembershipDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    let membership = service::membership::update_role(
        &state,
        &user,
        membership_id.into_inner(),
        dto.into_inner().role,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Membership updated successfully",
        "membership": membership,
    })))
}

#[delete("/{membership_id}")]
pub async fn remove(
    req: HttpRequest,
    membership_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = current_user(&req)?;
    service::membership::remove(&state, &user, membership_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Membership removed successfully",
    })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(join)
        .service(mine)
        .service(org_members)
        .service(of_user)
        .service(update_role)
        .service(remove);
}
