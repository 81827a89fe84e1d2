//! Session authentication for aulad

pub mod login;
pub mod middleware;
pub mod secret;
pub mod session;
pub mod store;
pub mod throttle;
pub mod token;
pub mod types;

pub use login::{CredentialVerifier, LoginOutcome};
pub use middleware::{require_auth, require_role, role_layer};
pub use secret::{hash_secret, spawn_hash_secret, verify_secret, HashError};
pub use session::SessionAuthenticator;
pub use store::{
    is_valid_identifier, CredentialError, CredentialRecord, CredentialStore, NewCredential,
    SqliteCredentialStore, UserProfile,
};
pub use throttle::{LoginThrottle, ThrottleError};
pub use token::{Claims, IssuedToken, TokenError, TokenSigner};
pub use types::{Principal, Role, UnknownLabel};

/// Errors raised while logging in or authenticating a request
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("too many failed attempts (retry after {retry_after_secs}s)")]
    TooManyAttempts { retry_after_secs: u64 },
    #[error(transparent)]
    Store(#[from] CredentialError),
    #[error("throttle store error: {0}")]
    Throttle(rusqlite::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl From<ThrottleError> for AuthError {
    fn from(err: ThrottleError) -> Self {
        match err {
            ThrottleError::Locked { retry_after_secs } => Self::TooManyAttempts { retry_after_secs },
            ThrottleError::Database(e) => Self::Throttle(e),
        }
    }
}
