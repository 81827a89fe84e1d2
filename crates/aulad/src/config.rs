//! Configuration for the aulad daemon

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::auth::{is_valid_identifier, Role};

fn expand_env_refs(value: &str) -> anyhow::Result<String> {
    let mut out = String::new();
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow::anyhow!("Unclosed env var reference in value: {}", value))?;
        let name = &after[..end];
        if name.is_empty() {
            return Err(anyhow::anyhow!(
                "Empty env var reference in value: {}",
                value
            ));
        }
        let resolved = std::env::var(name)
            .map_err(|_| anyhow::anyhow!("Missing environment variable: {}", name))?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Expand `${VAR}` references, then read `file:<path>` / `@<path>` values from disk.
fn expand_secret_ref(value: &str) -> anyhow::Result<String> {
    let expanded = expand_env_refs(value)?;
    let expanded = expanded.trim().to_string();

    let path = if let Some(rest) = expanded.strip_prefix("file:") {
        rest.trim()
    } else if let Some(rest) = expanded.strip_prefix('@') {
        rest.trim()
    } else {
        return Ok(expanded);
    };

    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read secret file {}: {e}", path))?;
    let s = String::from_utf8(bytes)
        .map_err(|e| anyhow::anyhow!("Secret file {} is not valid UTF-8: {e}", path))?;
    Ok(s.trim().to_string())
}

/// Failed-login throttling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginThrottleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sliding window length
    #[serde(default = "default_throttle_window_secs")]
    pub window_secs: u64,
    /// Failures inside the window before the identifier is locked (0 = unlimited)
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_throttle_window_secs() -> u64 {
    900
}

fn default_max_failures() -> u32 {
    5
}

impl Default for LoginThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_throttle_window_secs(),
            max_failures: default_max_failures(),
        }
    }
}

/// Session authentication configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. Supports `${VAR}`, `file:` and `@` references.
    /// When unset a random secret is generated at start-up, and tokens do not survive restarts.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Session token lifetime
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Accept `?token=` when no Authorization header is present
    #[serde(default = "default_true")]
    pub allow_query_token: bool,
    #[serde(default)]
    pub login_throttle: LoginThrottleConfig,
}

fn default_token_ttl_secs() -> u64 {
    8 * 60 * 60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: default_token_ttl_secs(),
            allow_query_token: true,
            login_throttle: LoginThrottleConfig::default(),
        }
    }
}

/// Permission decision cache
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_permission_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_permission_cache_ttl_secs() -> u64 {
    300
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_permission_cache_ttl_secs(),
        }
    }
}

/// A user created at start-up if its identifier is not registered yet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapUserConfig {
    pub identifier: String,
    /// Plaintext secret (hashed before storage). Supports secret references.
    pub secret: String,
    pub role: Role,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub must_change_secret: bool,
}

fn default_bootstrap_users() -> Vec<BootstrapUserConfig> {
    vec![BootstrapUserConfig {
        identifier: "99999999".to_string(),
        secret: "admin123".to_string(),
        role: Role::Admin,
        display_name: "Administrador".to_string(),
        must_change_secret: true,
    }]
}

/// Daemon configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path to the SQLite database (users, permissions, login throttle)
    #[serde(default = "default_control_db")]
    pub control_db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable CORS for browser access
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub permission_cache: PermissionCacheConfig,

    #[serde(default = "default_bootstrap_users")]
    pub bootstrap_users: Vec<BootstrapUserConfig>,
}

fn default_listen() -> String {
    "127.0.0.1:8090".to_string()
}

fn default_control_db() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aulad")
        .join("aulad.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            control_db: default_control_db(),
            log_level: default_log_level(),
            cors_enabled: true,
            auth: AuthConfig::default(),
            permission_cache: PermissionCacheConfig::default(),
            bootstrap_users: default_bootstrap_users(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;

        // Support both YAML and TOML based on extension
        let mut config: Config = if path
            .as_ref()
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            serde_yaml::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        config.expand_env_refs()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.listen
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", self.listen, e))?;

        if self.auth.token_ttl_secs == 0 {
            anyhow::bail!("auth.token_ttl_secs must be positive");
        }
        if self.permission_cache.enabled && self.permission_cache.ttl_secs == 0 {
            anyhow::bail!("permission_cache.ttl_secs must be positive when the cache is enabled");
        }
        if self.auth.login_throttle.enabled && self.auth.login_throttle.window_secs == 0 {
            anyhow::bail!("auth.login_throttle.window_secs must be positive");
        }
        if matches!(&self.auth.jwt_secret, Some(s) if s.is_empty()) {
            anyhow::bail!("auth.jwt_secret must not be empty");
        }

        let mut seen = HashSet::new();
        for (idx, user) in self.bootstrap_users.iter().enumerate() {
            if !is_valid_identifier(&user.identifier) {
                anyhow::bail!(
                    "bootstrap_users[{}].identifier {:?} must be 8 digits",
                    idx,
                    user.identifier
                );
            }
            if !seen.insert(user.identifier.as_str()) {
                anyhow::bail!(
                    "bootstrap_users[{}].identifier {} is listed twice",
                    idx,
                    user.identifier
                );
            }
            if user.secret.is_empty() {
                anyhow::bail!("bootstrap_users[{}].secret must not be empty", idx);
            }
        }
        Ok(())
    }

    pub fn expand_env_refs(&mut self) -> anyhow::Result<()> {
        self.listen = expand_env_refs(&self.listen)?;
        if let Some(secret) = &self.auth.jwt_secret {
            self.auth.jwt_secret = Some(expand_secret_ref(secret)?);
        }
        for user in &mut self.bootstrap_users {
            user.secret = expand_secret_ref(&user.secret)?;
        }
        Ok(())
    }

    /// Load from default locations or create default
    pub fn load_default() -> anyhow::Result<Self> {
        // Try standard config locations
        let paths = [
            PathBuf::from("/etc/aulad/config.yaml"),
            PathBuf::from("/etc/aulad/config.toml"),
            dirs::config_dir()
                .map(|d| d.join("aulad/config.yaml"))
                .unwrap_or_default(),
            dirs::config_dir()
                .map(|d| d.join("aulad/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("./aulad.yaml"),
            PathBuf::from("./aulad.toml"),
        ];

        let mut errors: Vec<(PathBuf, anyhow::Error)> = Vec::new();
        for path in paths {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        if let Err(err) = config.validate() {
                            errors.push((path, err));
                        } else {
                            tracing::info!(path = %path.display(), "Loaded config");
                            return Ok(config);
                        }
                    }
                    Err(err) => {
                        errors.push((path, err));
                    }
                }
            }
        }

        if !errors.is_empty() {
            let mut msg = String::from("Failed to load aulad config from existing file(s):\n");
            for (path, err) in errors {
                msg.push_str(&format!("  - {}: {err}\n", path.display()));
            }
            return Err(anyhow::anyhow!(msg));
        }

        Ok(Self::default())
    }

    /// Get the tracing level filter
    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// Copy safe to print: secrets replaced with a placeholder.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if out.auth.jwt_secret.is_some() {
            out.auth.jwt_secret = Some("<redacted>".to_string());
        }
        for user in &mut out.bootstrap_users {
            user.secret = "<redacted>".to_string();
        }
        out
    }
}
