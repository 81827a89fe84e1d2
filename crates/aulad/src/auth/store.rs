//! Credential records (users) and their SQLite store

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::types::{Principal, Role};
use crate::control_db::ControlDb;

/// Number of digits in a national-ID style identifier.
pub const IDENTIFIER_LEN: usize = 8;

/// Error types for credential storage operations
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt user row: {0}")]
    Corrupt(String),
    #[error("identifier {0} is already registered")]
    DuplicateIdentifier(String),
    #[error("user {0} not found")]
    NotFound(i64),
}

pub type Result<T> = std::result::Result<T, CredentialError>;

/// Stored credential record. Carries the secret hash, so it is never serialized;
/// use [`CredentialRecord::profile`] for anything leaving the process.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: i64,
    pub identifier: String,
    pub secret_hash: String,
    pub role: Role,
    pub display_name: String,
    pub active: bool,
    pub must_change_secret: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sanitized view of a user (no secret hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub identifier: String,
    pub role: Role,
    pub display_name: String,
    pub active: bool,
    pub must_change_secret: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            identifier: self.identifier.clone(),
            role: self.role,
            display_name: self.display_name.clone(),
            active: self.active,
            must_change_secret: self.must_change_secret,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            identifier: self.identifier.clone(),
            role: self.role,
            display_name: self.display_name.clone(),
            active: self.active,
        }
    }
}

/// Input for registering a user. `secret_hash` must already be hashed.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub identifier: String,
    pub secret_hash: String,
    pub role: Role,
    pub display_name: String,
    pub must_change_secret: bool,
}

/// Whether `identifier` has the national-ID shape (fixed length, ASCII digits).
pub fn is_valid_identifier(identifier: &str) -> bool {
    identifier.len() == IDENTIFIER_LEN && identifier.bytes().all(|b| b.is_ascii_digit())
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an active user by identifier. Inactive users are reported as absent.
    async fn find_active_by_identifier(&self, identifier: &str) -> Result<Option<CredentialRecord>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<CredentialRecord>>;
    async fn create(&self, new: NewCredential) -> Result<CredentialRecord>;
    async fn list(&self) -> Result<Vec<CredentialRecord>>;
    async fn set_active(&self, id: i64, active: bool) -> Result<CredentialRecord>;
    async fn set_secret(&self, id: i64, secret_hash: &str, must_change_secret: bool) -> Result<()>;
}

const USER_COLUMNS: &str = "id, identifier, secret_hash, role, display_name, active, must_change_secret, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: Arc<ControlDb>,
}

impl SqliteCredentialStore {
    pub fn new(db: Arc<ControlDb>) -> Self {
        Self { db }
    }

    fn load_one(&self, sql: &str, param: &dyn rusqlite::ToSql) -> Result<Option<CredentialRecord>> {
        let conn = self.db.lock_conn();
        let mut stmt = conn.prepare(sql)?;
        let row = stmt.query_row([param], |row| Ok(read_row(row))).optional()?;
        row.transpose()
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_active_by_identifier(&self, identifier: &str) -> Result<Option<CredentialRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE identifier = ?1 AND active = 1");
        self.load_one(&sql, &identifier)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CredentialRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        self.load_one(&sql, &id)
    }

    async fn create(&self, new: NewCredential) -> Result<CredentialRecord> {
        let now = Utc::now();
        let id = {
            let conn = self.db.lock_conn();
            let inserted = conn.execute(
                r#"
INSERT INTO users (identifier, secret_hash, role, display_name, active, must_change_secret, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)
                "#,
                params![
                    new.identifier,
                    new.secret_hash,
                    new.role.as_str(),
                    new.display_name,
                    new.must_change_secret,
                    now.to_rfc3339(),
                ],
            );
            match inserted {
                Ok(_) => conn.last_insert_rowid(),
                Err(err) if is_unique_violation(&err) => {
                    return Err(CredentialError::DuplicateIdentifier(new.identifier));
                }
                Err(err) => return Err(err.into()),
            }
        };

        Ok(CredentialRecord {
            id,
            identifier: new.identifier,
            secret_hash: new.secret_hash,
            role: new.role,
            display_name: new.display_name,
            active: true,
            must_change_secret: new.must_change_secret,
            created_at: now,
            updated_at: now,
        })
    }

    async fn list(&self) -> Result<Vec<CredentialRecord>> {
        let conn = self.db.lock_conn();
        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row)?);
        }
        Ok(out)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<CredentialRecord> {
        let changed = {
            let conn = self.db.lock_conn();
            conn.execute(
                "UPDATE users SET active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active, Utc::now().to_rfc3339(), id],
            )?
        };
        if changed == 0 {
            return Err(CredentialError::NotFound(id));
        }
        self.find_by_id(id).await?.ok_or(CredentialError::NotFound(id))
    }

    async fn set_secret(&self, id: i64, secret_hash: &str, must_change_secret: bool) -> Result<()> {
        let conn = self.db.lock_conn();
        let changed = conn.execute(
            "UPDATE users SET secret_hash = ?1, must_change_secret = ?2, updated_at = ?3 WHERE id = ?4",
            params![secret_hash, must_change_secret, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(CredentialError::NotFound(id));
        }
        Ok(())
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid {column}: {e}"))
}

fn read_row(row: &rusqlite::Row<'_>) -> Result<CredentialRecord> {
    let role_str: String = row.get(3)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    let role = role_str
        .parse::<Role>()
        .map_err(|e| CredentialError::Corrupt(e.to_string()))?;

    Ok(CredentialRecord {
        id: row.get(0)?,
        identifier: row.get(1)?,
        secret_hash: row.get(2)?,
        role,
        display_name: row.get(4)?,
        active: row.get(5)?,
        must_change_secret: row.get(6)?,
        created_at: parse_timestamp(&created_str, "created_at").map_err(CredentialError::Corrupt)?,
        updated_at: parse_timestamp(&updated_str, "updated_at").map_err(CredentialError::Corrupt)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteCredentialStore {
        SqliteCredentialStore::new(Arc::new(ControlDb::in_memory().expect("db")))
    }

    fn new_user(identifier: &str, role: Role) -> NewCredential {
        NewCredential {
            identifier: identifier.to_string(),
            secret_hash: "$argon2id$placeholder".to_string(),
            role,
            display_name: format!("User {identifier}"),
            must_change_secret: false,
        }
    }

    #[test]
    fn identifier_shape() {
        assert!(is_valid_identifier("99999999"));
        assert!(!is_valid_identifier("9999999"));
        assert!(!is_valid_identifier("999999999"));
        assert!(!is_valid_identifier("9999999a"));
        assert!(!is_valid_identifier(""));
    }

    #[tokio::test]
    async fn create_and_find() {
        let store = store();
        let created = store.create(new_user("12345678", Role::FrontDesk)).await.expect("create");
        assert!(created.active);

        let by_id = store.find_by_id(created.id).await.expect("find").expect("present");
        assert_eq!(by_id.identifier, "12345678");
        assert_eq!(by_id.role, Role::FrontDesk);

        let by_identifier = store
            .find_active_by_identifier("12345678")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(by_identifier.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_identifier_is_rejected() {
        let store = store();
        store.create(new_user("12345678", Role::Student)).await.expect("create");
        let err = store
            .create(new_user("12345678", Role::Admin))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, CredentialError::DuplicateIdentifier(ref id) if id == "12345678"));
        assert_eq!(store.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn inactive_users_are_hidden_from_identifier_lookup() {
        let store = store();
        let user = store.create(new_user("11112222", Role::Student)).await.expect("create");

        let deactivated = store.set_active(user.id, false).await.expect("deactivate");
        assert!(!deactivated.active);
        assert!(store
            .find_active_by_identifier("11112222")
            .await
            .expect("find")
            .is_none());
        // Still reachable by id so the authenticator can see the flag.
        assert!(!store.find_by_id(user.id).await.expect("find").expect("present").active);

        store.set_active(user.id, true).await.expect("reactivate");
        assert!(store
            .find_active_by_identifier("11112222")
            .await
            .expect("find")
            .is_some());
    }

    #[tokio::test]
    async fn set_active_unknown_user() {
        let store = store();
        let err = store.set_active(404, false).await.expect_err("missing");
        assert!(matches!(err, CredentialError::NotFound(404)));
    }

    #[tokio::test]
    async fn set_secret_updates_hash_and_flag() {
        let store = store();
        let user = store.create(new_user("22223333", Role::Student)).await.expect("create");
        store.set_secret(user.id, "$argon2id$new", true).await.expect("set");

        let reloaded = store.find_by_id(user.id).await.expect("find").expect("present");
        assert_eq!(reloaded.secret_hash, "$argon2id$new");
        assert!(reloaded.must_change_secret);
    }

    #[tokio::test]
    async fn profile_has_no_secret() {
        let store = store();
        let user = store.create(new_user("33334444", Role::Admin)).await.expect("create");
        let json = serde_json::to_value(user.profile()).expect("json");
        assert!(json.get("secret_hash").is_none());
        assert_eq!(json["role"], "admin");
    }
}
