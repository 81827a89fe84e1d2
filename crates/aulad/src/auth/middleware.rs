//! Authentication and role middleware for axum

use axum::{
    body::Body,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

use super::types::{Principal, Role};

/// Type alias for role layer future
type RoleLayerFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, ApiError>> + Send>>;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request<Body>) -> Option<&str> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())?;

    // Support both "Bearer" and "bearer" (case insensitive)
    if auth_header.len() > 7 {
        let prefix = auth_header.get(..7)?;
        if prefix.eq_ignore_ascii_case("Bearer ") {
            return auth_header.get(7..).map(str::trim).filter(|t| !t.is_empty());
        }
    }

    None
}

/// `?token=` fallback for links that cannot set headers (downloads, printable reports).
fn extract_query_token(req: &Request<Body>) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Middleware that validates the session token and adds a [`Principal`] to extensions
///
/// Returns 401 if the token is missing, invalid or expired, or if the user
/// behind it no longer exists or has been deactivated.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = match extract_bearer_token(&req) {
        Some(token) => Some(token.to_string()),
        None if state.config.auth.allow_query_token => extract_query_token(&req),
        None => None,
    };
    let token = token.ok_or(ApiError::AuthenticationFailed)?;

    let principal = state.sessions.authenticate(&token).await?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Middleware that admits only the listed roles
///
/// An empty list admits any authenticated principal. Must be used after
/// `require_auth`.
pub async fn require_role(
    roles: &'static [Role],
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(principal) = req.extensions().get::<Principal>() else {
        return Err(ApiError::NotAuthenticated);
    };

    if !roles.is_empty() && !roles.contains(&principal.role) {
        tracing::debug!(
            user_id = principal.id,
            role = %principal.role,
            "Role not admitted"
        );
        return Err(ApiError::role_required(roles));
    }

    Ok(next.run(req).await)
}

/// Create a closure for role checking that can be used with middleware::from_fn
pub fn role_layer(
    roles: &'static [Role],
) -> impl Fn(Request<Body>, Next) -> RoleLayerFuture + Clone + Send + 'static {
    move |req, next| Box::pin(async move { require_role(roles, req, next).await })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(ApiError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    fn make_request_with_auth(auth_value: &str) -> Request<Body> {
        Request::builder()
            .header(header::AUTHORIZATION, auth_value)
            .body(Body::empty())
            .unwrap()
    }

    fn make_request_without_auth() -> Request<Body> {
        Request::builder().body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        let req = make_request_with_auth("Bearer my-session-token");
        assert_eq!(extract_bearer_token(&req), Some("my-session-token"));
    }

    #[test]
    fn test_extract_bearer_token_mixed_case() {
        let req = make_request_with_auth("bEaReR my-session-token");
        assert_eq!(extract_bearer_token(&req), Some("my-session-token"));
    }

    #[test]
    fn test_extract_bearer_token_missing() {
        let req = make_request_without_auth();
        assert_eq!(extract_bearer_token(&req), None);
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let req = make_request_with_auth("Basic dXNlcjpwYXNz");
        assert_eq!(extract_bearer_token(&req), None);
    }

    #[test]
    fn test_extract_bearer_token_no_space() {
        let req = make_request_with_auth("Bearermy-session-token");
        assert_eq!(extract_bearer_token(&req), None);
    }

    #[test]
    fn test_extract_query_token() {
        let req = Request::builder()
            .uri("/reports/export?format=pdf&token=abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_query_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = Request::builder()
            .uri("/reports/export?token=")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_query_token(&req), None);
    }

    fn principal(role: Role) -> Principal {
        Principal {
            id: 1,
            identifier: "12345678".to_string(),
            role,
            display_name: "Test".to_string(),
            active: true,
        }
    }

    async fn status_for(roles: &'static [Role], who: Option<Role>) -> StatusCode {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn(role_layer(roles)));

        let mut req = make_request_without_auth();
        if let Some(role) = who {
            req.extensions_mut().insert(principal(role));
        }
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn role_gate_admits_listed_roles() {
        const STAFF: &[Role] = &[Role::Admin, Role::FrontDesk];
        assert_eq!(status_for(STAFF, Some(Role::Admin)).await, StatusCode::OK);
        assert_eq!(status_for(STAFF, Some(Role::FrontDesk)).await, StatusCode::OK);
        assert_eq!(status_for(STAFF, Some(Role::Student)).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn role_gate_without_principal_is_unauthenticated() {
        assert_eq!(status_for(&[Role::Admin], None).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_role_set_admits_any_authenticated_user() {
        assert_eq!(status_for(&[], Some(Role::Student)).await, StatusCode::OK);
        assert_eq!(status_for(&[], None).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn principal_extractor_rejects_when_absent() {
        let (mut parts, _) = make_request_without_auth().into_parts();
        let err = Principal::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
