use std::collections::HashSet;

use log::info;
use serde::Serialize;
use uuid::Uuid;

use super::{auth::AuthUser, AppState};
use crate::{
    db::JoinOutcome,
    dto::NewMembershipDto,
    errors::{AppError, Rejection},
    models::{Membership, Role},
};

#[derive(Debug, Serialize)]
pub struct OrgRoster {
    pub members: Vec<Membership>,
    pub user_role: Role,
}

async fn load_membership(state: &AppState, membership_id: i64) -> Result<Membership, AppError> {
    state
        .store
        .get_membership(membership_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))
}

async fn require_admin(state: &AppState, user: &AuthUser, org_id: i64) -> Result<(), AppError> {
    match state.store.find_membership(user.user_id, org_id).await? {
        Some(m) if m.is_admin() => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only organization admins can do this".to_string(),
        )),
    }
}

/// Joins an organization. Only the first member of an organization may
/// claim the admin role for themself.
pub async fn join(
    state: &AppState,
    user: &AuthUser,
    dto: NewMembershipDto,
) -> Result<Membership, AppError> {
    let role = match dto.role.as_deref() {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::Member,
    };
    let membership = match state
        .store
        .join_organization(user.user_id, dto.org_id, role)
        .await?
    {
        JoinOutcome::Joined(membership) => membership,
        JoinOutcome::AlreadyMember => {
            return Err(AppError::Conflict(
                "You are already a member of this organization".to_string(),
            ));
        }
        JoinOutcome::AdminTaken => {
            return Err(AppError::Forbidden(
                "Only an existing admin can grant the admin role".to_string(),
            ));
        }
    };
    info!(
        "user {} joined organization {} as {}",
        user.user_id,
        dto.org_id,
        role.as_str()
    );
    Ok(membership)
}

pub async fn mine(state: &AppState, user: &AuthUser) -> Result<Vec<Membership>, AppError> {
    Ok(state.store.list_user_memberships(user.user_id).await?)
}

/// Another user's memberships, limited to the organizations the caller
/// administers. Callers asking about themselves see everything.
pub async fn of_user(
    state: &AppState,
    caller: &AuthUser,
    user_id: Uuid,
) -> Result<Vec<Membership>, AppError> {
    let memberships = state.store.list_user_memberships(user_id).await?;
    if caller.user_id == user_id {
        return Ok(memberships);
    }
    let administered: HashSet<i64> = state
        .store
        .list_user_memberships(caller.user_id)
        .await?
        .into_iter()
        .filter(Membership::is_admin)
        .map(|m| m.org_id)
        .collect();
    if administered.is_empty() {
        return Err(AppError::Forbidden(
            "Only organization admins can view other users' memberships".to_string(),
        ));
    }
    Ok(memberships
        .into_iter()
        .filter(|m| administered.contains(&m.org_id))
        .collect())
}

pub async fn org_members(
    state: &AppState,
    user: &AuthUser,
    org_id: i64,
) -> Result<OrgRoster, AppError> {
    let own = state
        .store
        .find_membership(user.user_id, org_id)
        .await?
        .ok_or(Rejection::NotAMember)?;
    let members = state.store.list_org_members(org_id).await?;
    Ok(OrgRoster {
        members,
        user_role: own.role,
    })
}

pub async fn update_role(
    state: &AppState,
    user: &AuthUser,
    membership_id: i64,
    role: Role,
) -> Result<Membership, AppError> {
    let target = load_membership(state, membership_id).await?;
    require_admin(state, user, target.org_id).await?;
    let updated = state
        .store
        .update_role(membership_id, role)
        .await?
        .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))?;
    info!(
        "membership {} set to {} by {}",
        membership_id,
        role.as_str(),
        user.user_id
    );
    Ok(updated)
}

/// Members may leave on their own; admins may remove anyone in their
/// organization.
pub async fn remove(state: &AppState, user: &AuthUser, membership_id: i64) -> Result<(), AppError> {
    let target = load_membership(state, membership_id).await?;
    if target.user_id != user.user_id {
        require_admin(state, user, target.org_id).await?;
    }
    if !state.store.delete_membership(membership_id).await? {
        return Err(AppError::NotFound("Membership not found".to_string()));
    }
    info!("membership {} removed by {}", membership_id, user.user_id);
    Ok(())
}
