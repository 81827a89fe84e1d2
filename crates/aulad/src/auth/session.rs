//! Per-request token validation

use std::sync::Arc;

use super::store::CredentialStore;
use super::token::TokenSigner;
use super::types::Principal;
use super::AuthError;

#[derive(Clone)]
pub struct SessionAuthenticator {
    store: Arc<dyn CredentialStore>,
    signer: TokenSigner,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>, signer: TokenSigner) -> Self {
        Self { store, signer }
    }

    /// Resolve a bearer token into a [`Principal`].
    ///
    /// The user row is reloaded on every call: a deactivated or deleted user is
    /// rejected immediately, and role changes apply without re-login.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.signer.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Token validation failed");
            AuthError::AuthenticationFailed
        })?;

        let record = self.store.find_by_id(claims.id).await?;
        match record {
            Some(record) if record.active => Ok(record.principal()),
            Some(_) => {
                tracing::debug!(user_id = claims.id, "Token for inactive user");
                Err(AuthError::AuthenticationFailed)
            }
            None => {
                tracing::debug!(user_id = claims.id, "Token for unknown user");
                Err(AuthError::AuthenticationFailed)
            }
        }
    }
}
