//! Shared application state for the daemon

use std::sync::Arc;

use rand::RngCore;

use crate::auth::{
    spawn_hash_secret, CredentialError, CredentialStore, CredentialVerifier, LoginThrottle,
    NewCredential, SessionAuthenticator, SqliteCredentialStore, TokenSigner,
};
use crate::config::Config;
use crate::control_db::ControlDb;
use crate::permissions::{
    PermissionAdmin, PermissionCache, PermissionGate, PermissionStore, SqlitePermissionStore,
    TtlPermissionCache,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Config>,
    /// Credential records
    pub users: Arc<dyn CredentialStore>,
    /// Durable permission rows
    pub permissions: Arc<dyn PermissionStore>,
    /// Decision cache in front of `permissions`
    pub permission_cache: Arc<dyn PermissionCache>,
    pub gate: PermissionGate,
    pub admin: PermissionAdmin,
    pub login: CredentialVerifier,
    pub sessions: SessionAuthenticator,
    /// Instance ID (changes on every start)
    pub instance_id: String,
    /// Start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Open the configured database and build the state
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Arc::new(ControlDb::new(&config.control_db)?);
        tracing::info!(path = %config.control_db.display(), "Opened control database");
        Self::with_db(config, db).await
    }

    /// Build the state over an already-open database.
    ///
    /// Seeds the baseline permissions when the table is empty and creates any
    /// missing bootstrap users.
    pub async fn with_db(config: Config, db: Arc<ControlDb>) -> anyhow::Result<Self> {
        let users: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(db.clone()));
        let permissions: Arc<dyn PermissionStore> =
            Arc::new(SqlitePermissionStore::new(db.clone()));
        let permission_cache: Arc<dyn PermissionCache> = Arc::new(TtlPermissionCache::from_config(
            permissions.clone(),
            &config.permission_cache,
        ));

        if permissions.seed_defaults_if_empty().await? {
            tracing::info!("Seeded default permissions");
        }
        bootstrap_users(&config, users.as_ref()).await?;

        let signer = TokenSigner::new(&jwt_secret(&config), config.auth.token_ttl_secs);
        let throttle = LoginThrottle::new(db, config.auth.login_throttle.clone());

        Ok(Self {
            gate: PermissionGate::new(permission_cache.clone()),
            admin: PermissionAdmin::new(
                permissions.clone(),
                permission_cache.clone(),
                users.clone(),
            ),
            login: CredentialVerifier::new(users.clone(), throttle, signer.clone()),
            sessions: SessionAuthenticator::new(users.clone(), signer),
            config: Arc::new(config),
            users,
            permissions,
            permission_cache,
            instance_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now(),
        })
    }

    /// Get daemon uptime in seconds
    pub fn uptime_secs(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }
}

fn jwt_secret(config: &Config) -> Vec<u8> {
    match &config.auth.jwt_secret {
        Some(secret) => secret.as_bytes().to_vec(),
        None => {
            tracing::warn!("auth.jwt_secret not set; using an ephemeral secret (sessions won't survive restarts)");
            let mut bytes = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        }
    }
}

async fn bootstrap_users(config: &Config, users: &dyn CredentialStore) -> anyhow::Result<()> {
    for user in &config.bootstrap_users {
        let new = NewCredential {
            identifier: user.identifier.clone(),
            secret_hash: spawn_hash_secret(&user.secret).await?,
            role: user.role,
            display_name: user.display_name.clone(),
            must_change_secret: user.must_change_secret,
        };
        match users.create(new).await {
            Ok(created) => {
                tracing::info!(
                    user_id = created.id,
                    role = %created.role,
                    "Created bootstrap user"
                );
                if created.must_change_secret {
                    tracing::warn!(
                        identifier = %created.identifier,
                        "Bootstrap user still has its configured secret; change it after first login"
                    );
                }
            }
            Err(CredentialError::DuplicateIdentifier(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
