//! Password hashing (argon2id, PHC string format).

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

#[derive(Debug, thiserror::Error)]
#[error("failed to hash secret: {0}")]
pub struct HashError(String);

/// Hash a plaintext secret with a fresh random salt.
pub fn hash_secret(plain: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError(e.to_string()))
}

/// [`hash_secret`] on the blocking pool; argon2 would otherwise stall an async worker.
pub async fn spawn_hash_secret(plain: &str) -> Result<String, HashError> {
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || hash_secret(&plain))
        .await
        .map_err(|e| HashError(e.to_string()))?
}

/// Verify `plain` against a stored PHC hash.
///
/// Comparison is constant time; a malformed stored hash verifies as `false`.
pub fn verify_secret(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("Stored secret hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_secret("admin123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_secret("admin123", &hash));
        assert!(!verify_secret("admin124", &hash));
    }

    #[test]
    fn salts_differ() {
        let a = hash_secret("same").unwrap();
        let b = hash_secret("same").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn spawned_hash_verifies() {
        let hash = spawn_hash_secret("recepcion").await.unwrap();
        assert!(verify_secret("recepcion", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_secret("anything", "not-a-phc-string"));
        assert!(!verify_secret("", ""));
    }
}
