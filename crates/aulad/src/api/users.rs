//! User administration endpoints.
//!
//! Users are never deleted; DELETE deactivates and a separate route reactivates.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::validate_new_secret;
use crate::auth::{
    is_valid_identifier, spawn_hash_secret, CredentialRecord, NewCredential, Principal, Role,
    UserProfile,
};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Clone, Debug, Deserialize)]
pub struct CreateUserRequest {
    pub identifier: String,
    pub secret: String,
    pub role: Role,
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserProfile>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_secret: String,
}

/// GET /api/v1/users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<ListUsersResponse>, ApiError> {
    let users = state
        .users
        .list()
        .await?
        .iter()
        .map(CredentialRecord::profile)
        .collect();
    Ok(Json(ListUsersResponse { users }))
}

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let identifier = request.identifier.trim().to_string();
    if !is_valid_identifier(&identifier) {
        return Err(ApiError::BadRequest(
            "identifier must be exactly 8 digits".to_string(),
        ));
    }
    let display_name = request.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(ApiError::BadRequest("display_name is required".to_string()));
    }
    validate_new_secret(&request.secret)?;

    // Only the super-role may mint another super-role account.
    if request.role.is_super() && !principal.role.is_super() {
        return Err(ApiError::role_required(&[Role::SUPER]));
    }

    let created = state
        .users
        .create(NewCredential {
            identifier,
            secret_hash: spawn_hash_secret(&request.secret).await?,
            role: request.role,
            display_name,
            must_change_secret: true,
        })
        .await?;

    tracing::info!(
        user_id = created.id,
        role = %created.role,
        created_by = principal.id,
        "User created"
    );
    Ok((StatusCode::CREATED, Json(created.profile())))
}

/// DELETE /api/v1/users/:id
pub async fn deactivate_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<UserProfile>, ApiError> {
    if id == principal.id {
        return Err(ApiError::BadRequest(
            "cannot deactivate your own account".to_string(),
        ));
    }
    set_active(&state, &principal, id, false).await
}

/// POST /api/v1/users/:id/reactivate
pub async fn reactivate_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<UserProfile>, ApiError> {
    set_active(&state, &principal, id, true).await
}

/// POST /api/v1/users/:id/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_new_secret(&request.new_secret)?;

    let hash = spawn_hash_secret(&request.new_secret).await?;
    state.users.set_secret(id, &hash, true).await?;
    tracing::info!(user_id = id, reset_by = principal.id, "Secret reset");
    Ok(StatusCode::NO_CONTENT)
}

async fn set_active(
    state: &AppState,
    principal: &Principal,
    id: i64,
    active: bool,
) -> Result<Json<UserProfile>, ApiError> {
    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {id} not found")))?;
    if target.role.is_super() && !principal.role.is_super() {
        return Err(ApiError::role_required(&[Role::SUPER]));
    }

    let updated = state.users.set_active(id, active).await?;
    tracing::info!(user_id = id, active, changed_by = principal.id, "User activation changed");
    Ok(Json(updated.profile()))
}
