//! Permission administration and lookup endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::{Principal, Role};
use crate::error::ApiError;
use crate::permissions::{Action, Module, PermissionGrant, PermissionTuple, RoleGrant};
use crate::state::AppState;

#[derive(Clone, Debug, Serialize)]
pub struct ListPermissionsResponse {
    pub permissions: Vec<PermissionTuple>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpdatePermissionRequest {
    pub permitted: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReplacePermissionsRequest {
    pub permissions: Vec<RoleGrant>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RolePermissionsResponse {
    pub role: Role,
    pub permissions: Vec<PermissionTuple>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAction {
    pub module: Module,
    pub action: Action,
}

#[derive(Clone, Debug, Serialize)]
pub struct MyPermissionsResponse {
    pub role: Role,
    pub permissions: Vec<ModuleAction>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CatalogResponse {
    pub roles: Vec<Role>,
    pub modules: Vec<Module>,
    pub actions: Vec<Action>,
}

/// GET /api/v1/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<ListPermissionsResponse>, ApiError> {
    let permissions = state.admin.list().await?;
    Ok(Json(ListPermissionsResponse { permissions }))
}

/// POST /api/v1/permissions
pub async fn create_permission(
    State(state): State<AppState>,
    Json(grant): Json<PermissionGrant>,
) -> Result<(StatusCode, Json<PermissionTuple>), ApiError> {
    let row = state.admin.create(grant).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/v1/permissions/:id
pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePermissionRequest>,
) -> Result<Json<PermissionTuple>, ApiError> {
    let row = state.admin.set_permitted(id, request.permitted).await?;
    Ok(Json(row))
}

/// DELETE /api/v1/permissions/:id
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.admin.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/permissions/roles/:role
pub async fn replace_role_permissions(
    State(state): State<AppState>,
    Path(role): Path<String>,
    Json(request): Json<ReplacePermissionsRequest>,
) -> Result<Json<RolePermissionsResponse>, ApiError> {
    let role: Role = role
        .parse()
        .map_err(|e: crate::auth::UnknownLabel| ApiError::BadRequest(e.to_string()))?;
    let permissions = state
        .admin
        .replace_for_role(role, &request.permissions)
        .await?;
    Ok(Json(RolePermissionsResponse { role, permissions }))
}

/// PUT /api/v1/permissions/users/:id
///
/// Edits the permission set of the user's role, which is shared by every
/// user holding it. The response names the role that was changed.
pub async fn replace_user_permissions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ReplacePermissionsRequest>,
) -> Result<Json<RolePermissionsResponse>, ApiError> {
    let (role, permissions) = state
        .admin
        .replace_for_user(id, &request.permissions)
        .await?;
    Ok(Json(RolePermissionsResponse { role, permissions }))
}

/// POST /api/v1/permissions/reset
pub async fn reset_permissions(
    State(state): State<AppState>,
) -> Result<Json<ListPermissionsResponse>, ApiError> {
    let permissions = state.admin.reset_to_defaults().await?;
    Ok(Json(ListPermissionsResponse { permissions }))
}

/// POST /api/v1/permissions/cache/clear
pub async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.admin.clear_cache();
    StatusCode::NO_CONTENT
}

/// GET /api/v1/permissions/me
pub async fn my_permissions(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<MyPermissionsResponse>, ApiError> {
    let permissions = state
        .admin
        .effective_for(&principal)
        .await?
        .into_iter()
        .map(|(module, action)| ModuleAction { module, action })
        .collect();
    Ok(Json(MyPermissionsResponse {
        role: principal.role,
        permissions,
    }))
}

/// GET /api/v1/permissions/catalog
pub async fn catalog() -> Json<CatalogResponse> {
    Json(CatalogResponse {
        roles: Role::ALL.to_vec(),
        modules: Module::ALL.to_vec(),
        actions: Action::ALL.to_vec(),
    })
}
