use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::{AuthError, CredentialError, HashError, Role};
use crate::permissions::{Action, AdminError, Module, PermissionStoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forbidden {
    RoleRequired { required_roles: Vec<Role> },
    PermissionDenied { module: Module, action: Action },
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("{}", forbidden_message(.0))]
    Forbidden(Forbidden),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("too many failed attempts, retry in {retry_after_secs}s")]
    TooManyAttempts { retry_after_secs: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

fn forbidden_message(f: &Forbidden) -> String {
    match f {
        Forbidden::RoleRequired { required_roles } => {
            let roles: Vec<&str> = required_roles.iter().map(Role::as_str).collect();
            format!("requires one of roles: {}", roles.join(", "))
        }
        Forbidden::PermissionDenied { module, action } => {
            format!("missing permission {action} on {module}")
        }
    }
}

impl ApiError {
    pub fn role_required(roles: &[Role]) -> Self {
        Self::Forbidden(Forbidden::RoleRequired {
            required_roles: roles.to_vec(),
        })
    }

    pub fn permission_denied(module: Module, action: Action) -> Self {
        Self::Forbidden(Forbidden::PermissionDenied { module, action })
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::AuthenticationFailed => "authentication_failed",
            ApiError::NotAuthenticated => "not_authenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::TooManyAttempts { .. } => "too_many_attempts",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials
            | ApiError::AuthenticationFailed
            | ApiError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "error": self.code() });

        match &self {
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                body["message"] = json!("internal error");
            }
            _ => body["message"] = json!(self.to_string()),
        }

        match &self {
            ApiError::Forbidden(Forbidden::RoleRequired { required_roles }) => {
                body["required_roles"] = json!(required_roles);
            }
            ApiError::Forbidden(Forbidden::PermissionDenied { module, action }) => {
                body["module"] = json!(module);
                body["action"] = json!(action);
            }
            ApiError::TooManyAttempts { retry_after_secs } => {
                body["retry_after_secs"] = json!(retry_after_secs);
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let ApiError::TooManyAttempts { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::AuthenticationFailed => ApiError::AuthenticationFailed,
            AuthError::TooManyAttempts { retry_after_secs } => {
                ApiError::TooManyAttempts { retry_after_secs }
            }
            AuthError::Store(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::DuplicateIdentifier(_) => ApiError::Conflict(err.to_string()),
            CredentialError::NotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PermissionStoreError> for ApiError {
    fn from(err: PermissionStoreError) -> Self {
        match err {
            PermissionStoreError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            PermissionStoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Store(e) => e.into(),
            AdminError::Credentials(e) => e.into(),
            AdminError::DuplicateGrant { .. } => ApiError::BadRequest(err.to_string()),
            AdminError::UserNotFound(_) => ApiError::NotFound(err.to_string()),
        }
    }
}

impl From<HashError> for ApiError {
    fn from(err: HashError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
