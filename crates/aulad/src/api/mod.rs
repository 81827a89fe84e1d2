//! HTTP API for the aulad daemon

pub mod auth;
pub mod health;
pub mod permissions;
pub mod users;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{require_auth, role_layer, Role};
use crate::permissions::{permission_layer, Action, Module};
use crate::state::AppState;

pub use auth::{ChangePasswordRequest, LoginRequest, MeResponse};
pub use health::HealthResponse;
pub use permissions::{
    CatalogResponse, ListPermissionsResponse, ModuleAction, MyPermissionsResponse,
    ReplacePermissionsRequest, RolePermissionsResponse, UpdatePermissionRequest,
};
pub use users::{CreateUserRequest, ListUsersResponse, ResetPasswordRequest};

const STAFF: &[Role] = &[Role::Admin, Role::FrontDesk];
const SUPER_ONLY: &[Role] = &[Role::Admin];

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors_enabled = state.config.cors_enabled;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let gate = state.gate.clone();

    // Public routes - no auth required
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/auth/login", post(auth::login));

    // Self-service routes - any authenticated user
    let session_routes = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/auth/password", post(auth::change_password))
        .route("/api/v1/permissions/me", get(permissions::my_permissions))
        .route("/api/v1/permissions/catalog", get(permissions::catalog))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // User administration - staff roles, then per-route module permissions
    let user_routes = Router::new()
        .route(
            "/api/v1/users",
            get(users::list_users).layer(middleware::from_fn(permission_layer(
                gate.clone(),
                Module::Users,
                Action::View,
            ))),
        )
        .route(
            "/api/v1/users",
            post(users::create_user).layer(middleware::from_fn(permission_layer(
                gate.clone(),
                Module::Users,
                Action::Create,
            ))),
        )
        .route(
            "/api/v1/users/:id",
            delete(users::deactivate_user).layer(middleware::from_fn(permission_layer(
                gate.clone(),
                Module::Users,
                Action::Delete,
            ))),
        )
        .route(
            "/api/v1/users/:id/reactivate",
            post(users::reactivate_user).layer(middleware::from_fn(permission_layer(
                gate.clone(),
                Module::Users,
                Action::Edit,
            ))),
        )
        .route(
            "/api/v1/users/:id/reset-password",
            post(users::reset_password).layer(middleware::from_fn(role_layer(SUPER_ONLY))),
        )
        .layer(middleware::from_fn(role_layer(STAFF)))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Permission administration - super-role only, never behind the granular gate
    let permission_admin_routes = Router::new()
        .route(
            "/api/v1/permissions",
            get(permissions::list_permissions).post(permissions::create_permission),
        )
        .route(
            "/api/v1/permissions/:id",
            put(permissions::update_permission).delete(permissions::delete_permission),
        )
        .route(
            "/api/v1/permissions/roles/:role",
            put(permissions::replace_role_permissions),
        )
        .route(
            "/api/v1/permissions/users/:id",
            put(permissions::replace_user_permissions),
        )
        .route("/api/v1/permissions/reset", post(permissions::reset_permissions))
        .route("/api/v1/permissions/cache/clear", post(permissions::clear_cache))
        .layer(middleware::from_fn(role_layer(SUPER_ONLY)))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // CORS is applied only if enabled in config.
    let app = Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(user_routes)
        .merge(permission_admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        app.layer(cors)
    } else {
        app
    }
}
