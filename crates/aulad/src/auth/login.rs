//! Identifier + secret verification and token issuance

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::secret::{hash_secret, spawn_hash_secret, verify_secret};
use super::store::{CredentialStore, UserProfile};
use super::throttle::LoginThrottle;
use super::token::TokenSigner;
use super::AuthError;

/// Successful login response body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    throttle: LoginThrottle,
    signer: TokenSigner,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn CredentialStore>, throttle: LoginThrottle, signer: TokenSigner) -> Self {
        Self {
            store,
            throttle,
            signer,
        }
    }

    /// Check `identifier`/`secret` and issue a session token.
    ///
    /// Unknown identifiers, inactive users and wrong secrets are all reported
    /// as [`AuthError::InvalidCredentials`] and counted by the throttle.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginOutcome, AuthError> {
        let identifier = identifier.trim();
        self.throttle.check(identifier)?;

        let record = self.store.find_active_by_identifier(identifier).await?;
        let verified = check_secret(secret, record.as_ref().map(|r| r.secret_hash.as_str())).await;

        let record = match record {
            Some(record) if verified => record,
            _ => {
                tracing::debug!(identifier = %identifier, "Login rejected");
                self.throttle.record_failure(identifier)?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.throttle.clear(identifier)?;
        let issued = self
            .signer
            .issue(record.id, &record.identifier, record.role)?;

        tracing::info!(user_id = record.id, role = %record.role, "User logged in");

        Ok(LoginOutcome {
            token: issued.token,
            expires_at: issued.expires_at,
            user: record.profile(),
        })
    }

    /// Change a user's own secret. The current secret must verify; the
    /// forced-change flag is cleared afterwards.
    pub async fn change_secret(
        &self,
        user_id: i64,
        current: &str,
        new_secret: &str,
    ) -> Result<(), AuthError> {
        let record = self
            .store
            .find_by_id(user_id)
            .await?
            .filter(|r| r.active)
            .ok_or(AuthError::AuthenticationFailed)?;

        self.throttle.check(&record.identifier)?;
        if !check_secret(current, Some(&record.secret_hash)).await {
            tracing::debug!(user_id, "Secret change rejected");
            self.throttle.record_failure(&record.identifier)?;
            return Err(AuthError::InvalidCredentials);
        }
        self.throttle.clear(&record.identifier)?;

        let hash = spawn_hash_secret(new_secret).await?;
        self.store.set_secret(user_id, &hash, false).await?;
        tracing::info!(user_id, "Secret changed");
        Ok(())
    }
}

static DECOY_HASH: OnceLock<String> = OnceLock::new();

/// Verified against when no active account matches, so unknown identifiers
/// cost the same argon2 run as a wrong secret.
fn decoy_hash() -> &'static str {
    DECOY_HASH.get_or_init(|| hash_secret("aulad-decoy-secret").unwrap_or_default())
}

/// Argon2 verification is CPU bound; keep it off the async workers.
///
/// `None` still runs a full verify against the decoy hash and reports `false`.
async fn check_secret(plain: &str, hash: Option<&str>) -> bool {
    let plain = plain.to_string();
    let hash = hash.map(str::to_string);
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_secret(&plain, &hash),
        None => {
            let _ = verify_secret(&plain, decoy_hash());
            false
        }
    })
    .await
    .unwrap_or(false)
}
