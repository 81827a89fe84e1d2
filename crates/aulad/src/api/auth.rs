//! Login and self-service session endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::auth::{LoginOutcome, Principal, UserProfile};
use crate::error::ApiError;
use crate::state::AppState;

/// Shortest secret accepted when a user sets a new one.
pub const MIN_SECRET_LEN: usize = 6;

#[derive(Clone, Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MeResponse {
    pub principal: Principal,
    pub profile: UserProfile,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_secret: String,
    pub new_secret: String,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, ApiError> {
    if request.identifier.trim().is_empty() || request.secret.is_empty() {
        return Err(ApiError::BadRequest(
            "identifier and secret are required".to_string(),
        ));
    }

    let outcome = state.login.login(&request.identifier, &request.secret).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<MeResponse>, ApiError> {
    let record = state
        .users
        .find_by_id(principal.id)
        .await?
        .ok_or(ApiError::AuthenticationFailed)?;

    Ok(Json(MeResponse {
        principal,
        profile: record.profile(),
    }))
}

/// POST /api/v1/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_new_secret(&request.new_secret)?;

    state
        .login
        .change_secret(principal.id, &request.current_secret, &request.new_secret)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn validate_new_secret(secret: &str) -> Result<(), ApiError> {
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(ApiError::BadRequest(format!(
            "secret must be at least {MIN_SECRET_LEN} characters"
        )));
    }
    Ok(())
}
