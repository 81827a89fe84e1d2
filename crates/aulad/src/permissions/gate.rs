//! Request-time `(module, action)` check

use std::sync::Arc;

use axum::{body::Body, http::Request, middleware::Next, response::Response};

use super::cache::PermissionCache;
use super::{Action, Module};
use crate::auth::Principal;
use crate::error::ApiError;

/// Type alias for permission layer future
type PermissionLayerFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, ApiError>> + Send>>;

#[derive(Clone)]
pub struct PermissionGate {
    cache: Arc<dyn PermissionCache>,
}

impl PermissionGate {
    pub fn new(cache: Arc<dyn PermissionCache>) -> Self {
        Self { cache }
    }

    /// Allow or deny `principal` for `(module, action)`.
    ///
    /// The super-role is allowed without a lookup. Anything other than an
    /// explicit `permitted = true` row is a denial, and lookup errors deny too.
    pub async fn authorize(
        &self,
        principal: &Principal,
        module: Module,
        action: Action,
    ) -> Result<(), ApiError> {
        if principal.role.is_super() {
            return Ok(());
        }

        match self.cache.get(principal.role, module, action).await {
            Ok(Some(true)) => Ok(()),
            Ok(_) => {
                tracing::debug!(
                    user_id = principal.id,
                    role = %principal.role,
                    module = %module,
                    action = %action,
                    "Permission denied"
                );
                Err(ApiError::permission_denied(module, action))
            }
            Err(e) => {
                tracing::error!(error = %e, module = %module, action = %action, "Permission lookup failed");
                Err(ApiError::Internal(format!("permission lookup failed: {e}")))
            }
        }
    }
}

/// Middleware form of [`PermissionGate::authorize`]. Must run after `require_auth`.
pub async fn require_permission(
    gate: PermissionGate,
    module: Module,
    action: Action,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(principal) = req.extensions().get::<Principal>() else {
        return Err(ApiError::NotAuthenticated);
    };

    gate.authorize(principal, module, action).await?;
    Ok(next.run(req).await)
}

/// Create a closure for permission checking that can be used with middleware::from_fn
pub fn permission_layer(
    gate: PermissionGate,
    module: Module,
    action: Action,
) -> impl Fn(Request<Body>, Next) -> PermissionLayerFuture + Clone + Send + 'static {
    move |req, next| {
        let gate = gate.clone();
        Box::pin(async move { require_permission(gate, module, action, req, next).await })
    }
}
