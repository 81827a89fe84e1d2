//! Durable permission rows (SQLite).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::defaults::default_grants;
use super::{Action, Module, PermissionGrant, PermissionTuple, RoleGrant};
use crate::auth::store::{is_unique_violation, parse_timestamp};
use crate::auth::Role;
use crate::control_db::ControlDb;

#[derive(Debug, thiserror::Error)]
pub enum PermissionStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("permission {0} not found")]
    NotFound(i64),
    #[error("permission {role}/{module}/{action} already exists")]
    Conflict {
        role: Role,
        module: Module,
        action: Action,
    },
    #[error("corrupt permission row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, PermissionStoreError>;

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// `None` when no row exists for the triple.
    async fn find_permission(&self, role: Role, module: Module, action: Action)
        -> Result<Option<bool>>;
    async fn get(&self, id: i64) -> Result<Option<PermissionTuple>>;
    /// All rows ordered by role, module, action.
    async fn list_all(&self) -> Result<Vec<PermissionTuple>>;
    async fn list_for_role(&self, role: Role) -> Result<Vec<PermissionTuple>>;
    async fn set_permitted(&self, id: i64, permitted: bool) -> Result<PermissionTuple>;
    async fn create(&self, grant: PermissionGrant) -> Result<PermissionTuple>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn delete_all_for_role(&self, role: Role) -> Result<usize>;
    /// Atomically swap a role's rows for `grants`. On error the previous rows are kept.
    async fn replace_all_for_role(&self, role: Role, grants: &[RoleGrant])
        -> Result<Vec<PermissionTuple>>;
    /// Atomically replace every row with the baseline set.
    async fn reset_to_defaults(&self) -> Result<Vec<PermissionTuple>>;
    /// Insert the baseline set if the table is empty. Returns whether it seeded.
    async fn seed_defaults_if_empty(&self) -> Result<bool>;
}

const PERMISSION_COLUMNS: &str = "id, role, module, action, permitted, updated_at";
const ORDER_BY: &str = "ORDER BY role ASC, module ASC, action ASC";

#[derive(Clone)]
pub struct SqlitePermissionStore {
    db: Arc<ControlDb>,
}

impl SqlitePermissionStore {
    pub fn new(db: Arc<ControlDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn find_permission(
        &self,
        role: Role,
        module: Module,
        action: Action,
    ) -> Result<Option<bool>> {
        let conn = self.db.lock_conn();
        let permitted = conn
            .query_row(
                "SELECT permitted FROM permissions WHERE role = ?1 AND module = ?2 AND action = ?3",
                params![role.as_str(), module.as_str(), action.as_str()],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(permitted)
    }

    async fn get(&self, id: i64) -> Result<Option<PermissionTuple>> {
        let conn = self.db.lock_conn();
        load_by_id(&conn, id)
    }

    async fn list_all(&self) -> Result<Vec<PermissionTuple>> {
        let conn = self.db.lock_conn();
        query_tuples(
            &conn,
            &format!("SELECT {PERMISSION_COLUMNS} FROM permissions {ORDER_BY}"),
            [],
        )
    }

    async fn list_for_role(&self, role: Role) -> Result<Vec<PermissionTuple>> {
        let conn = self.db.lock_conn();
        list_for_role(&conn, role)
    }

    async fn set_permitted(&self, id: i64, permitted: bool) -> Result<PermissionTuple> {
        let conn = self.db.lock_conn();
        let changed = conn.execute(
            "UPDATE permissions SET permitted = ?1, updated_at = ?2 WHERE id = ?3",
            params![permitted, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(PermissionStoreError::NotFound(id));
        }
        load_by_id(&conn, id)?.ok_or(PermissionStoreError::NotFound(id))
    }

    async fn create(&self, grant: PermissionGrant) -> Result<PermissionTuple> {
        let conn = self.db.lock_conn();
        insert_grant(&conn, grant)?;
        let id = conn.last_insert_rowid();
        load_by_id(&conn, id)?.ok_or(PermissionStoreError::NotFound(id))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.db.lock_conn();
        let changed = conn.execute("DELETE FROM permissions WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(PermissionStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_all_for_role(&self, role: Role) -> Result<usize> {
        let conn = self.db.lock_conn();
        let removed = conn.execute(
            "DELETE FROM permissions WHERE role = ?1",
            params![role.as_str()],
        )?;
        Ok(removed)
    }

    async fn replace_all_for_role(
        &self,
        role: Role,
        grants: &[RoleGrant],
    ) -> Result<Vec<PermissionTuple>> {
        let mut conn = self.db.lock_conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM permissions WHERE role = ?1",
            params![role.as_str()],
        )?;
        for grant in grants {
            // An early return drops `tx`, which rolls back the delete above.
            insert_grant(
                &tx,
                PermissionGrant {
                    role,
                    module: grant.module,
                    action: grant.action,
                    permitted: grant.permitted,
                },
            )?;
        }

        let rows = list_for_role(&tx, role)?;
        tx.commit()?;
        Ok(rows)
    }

    async fn reset_to_defaults(&self) -> Result<Vec<PermissionTuple>> {
        let mut conn = self.db.lock_conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM permissions", [])?;
        for grant in default_grants() {
            insert_grant(&tx, grant)?;
        }

        let rows = query_tuples(
            &tx,
            &format!("SELECT {PERMISSION_COLUMNS} FROM permissions {ORDER_BY}"),
            [],
        )?;
        tx.commit()?;
        Ok(rows)
    }

    async fn seed_defaults_if_empty(&self) -> Result<bool> {
        let mut conn = self.db.lock_conn();
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM permissions", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(false);
        }
        for grant in default_grants() {
            insert_grant(&tx, grant)?;
        }

        tx.commit()?;
        Ok(true)
    }
}

fn insert_grant(conn: &Connection, grant: PermissionGrant) -> Result<()> {
    let inserted = conn.execute(
        r#"
INSERT INTO permissions (role, module, action, permitted, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            grant.role.as_str(),
            grant.module.as_str(),
            grant.action.as_str(),
            grant.permitted,
            Utc::now().to_rfc3339(),
        ],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(PermissionStoreError::Conflict {
            role: grant.role,
            module: grant.module,
            action: grant.action,
        }),
        Err(err) => Err(err.into()),
    }
}

fn load_by_id(conn: &Connection, id: i64) -> Result<Option<PermissionTuple>> {
    let mut rows = query_tuples(
        conn,
        &format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ?1"),
        params![id],
    )?;
    Ok(rows.pop())
}

fn list_for_role(conn: &Connection, role: Role) -> Result<Vec<PermissionTuple>> {
    query_tuples(
        conn,
        &format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE role = ?1 {ORDER_BY}"),
        params![role.as_str()],
    )
}

fn query_tuples<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<PermissionTuple>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_row(row)?);
    }
    Ok(out)
}

fn read_row(row: &rusqlite::Row<'_>) -> Result<PermissionTuple> {
    let role: String = row.get(1)?;
    let module: String = row.get(2)?;
    let action: String = row.get(3)?;
    let updated_at: String = row.get(5)?;

    let corrupt = |e: crate::auth::UnknownLabel| PermissionStoreError::Corrupt(e.to_string());
    Ok(PermissionTuple {
        id: row.get(0)?,
        role: role.parse().map_err(corrupt)?,
        module: module.parse().map_err(corrupt)?,
        action: action.parse().map_err(corrupt)?,
        permitted: row.get(4)?,
        updated_at: parse_timestamp(&updated_at, "updated_at")
            .map_err(PermissionStoreError::Corrupt)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqlitePermissionStore {
        SqlitePermissionStore::new(Arc::new(ControlDb::in_memory().expect("db")))
    }

    fn grant(role: Role, module: Module, action: Action, permitted: bool) -> PermissionGrant {
        PermissionGrant {
            role,
            module,
            action,
            permitted,
        }
    }

    #[tokio::test]
    async fn absent_tuple_is_none() {
        let store = store();
        assert_eq!(
            store
                .find_permission(Role::FrontDesk, Module::Payments, Action::Delete)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = store();
        let created = store
            .create(grant(Role::Student, Module::Payments, Action::View, true))
            .await
            .unwrap();
        assert!(created.permitted);
        assert_eq!(
            store
                .find_permission(Role::Student, Module::Payments, Action::View)
                .await
                .unwrap(),
            Some(true)
        );
        assert_eq!(store.get(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn duplicate_triple_conflicts() {
        let store = store();
        store
            .create(grant(Role::Student, Module::Payments, Action::View, true))
            .await
            .unwrap();
        let err = store
            .create(grant(Role::Student, Module::Payments, Action::View, false))
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionStoreError::Conflict { .. }));
        assert_eq!(store.list_all().await.unwrap().len(), 1);
        // The first row is untouched.
        assert_eq!(
            store
                .find_permission(Role::Student, Module::Payments, Action::View)
                .await
                .unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn set_permitted_is_idempotent() {
        let store = store();
        let row = store
            .create(grant(Role::FrontDesk, Module::Reports, Action::View, false))
            .await
            .unwrap();
        let first = store.set_permitted(row.id, true).await.unwrap();
        let second = store.set_permitted(row.id, true).await.unwrap();
        assert!(first.permitted && second.permitted);
        assert_eq!(
            store
                .find_permission(Role::FrontDesk, Module::Reports, Action::View)
                .await
                .unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = store();
        assert!(matches!(
            store.set_permitted(42, true).await,
            Err(PermissionStoreError::NotFound(42))
        ));
        assert!(matches!(
            store.delete(42).await,
            Err(PermissionStoreError::NotFound(42))
        ));
        assert_eq!(store.get(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_makes_tuple_absent() {
        let store = store();
        let row = store
            .create(grant(Role::Student, Module::Attendance, Action::View, true))
            .await
            .unwrap();
        store.delete(row.id).await.unwrap();
        assert_eq!(
            store
                .find_permission(Role::Student, Module::Attendance, Action::View)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn replace_swaps_only_that_role() {
        let store = store();
        store.reset_to_defaults().await.unwrap();
        let admin_before = store.list_for_role(Role::Admin).await.unwrap().len();

        let rows = store
            .replace_all_for_role(
                Role::FrontDesk,
                &[
                    RoleGrant {
                        module: Module::Users,
                        action: Action::View,
                        permitted: true,
                    },
                    RoleGrant {
                        module: Module::Payments,
                        action: Action::Delete,
                        permitted: false,
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.role == Role::FrontDesk));
        assert_eq!(store.list_for_role(Role::FrontDesk).await.unwrap(), rows);
        assert_eq!(store.list_for_role(Role::Admin).await.unwrap().len(), admin_before);
        assert_eq!(
            store
                .find_permission(Role::FrontDesk, Module::Students, Action::View)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn failed_replace_keeps_original_rows() {
        let store = store();
        store.reset_to_defaults().await.unwrap();
        let before = store.list_for_role(Role::FrontDesk).await.unwrap();

        // The repeated pair violates UNIQUE after the delete has run.
        let dup = RoleGrant {
            module: Module::Users,
            action: Action::Delete,
            permitted: true,
        };
        let err = store
            .replace_all_for_role(Role::FrontDesk, &[dup, dup])
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionStoreError::Conflict { .. }));

        assert_eq!(store.list_for_role(Role::FrontDesk).await.unwrap(), before);
    }

    #[tokio::test]
    async fn replace_with_empty_set_clears_role() {
        let store = store();
        store.reset_to_defaults().await.unwrap();
        let rows = store.replace_all_for_role(Role::Student, &[]).await.unwrap();
        assert!(rows.is_empty());
        assert!(store.list_for_role(Role::Student).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_restores_baseline() {
        let store = store();
        store
            .create(grant(Role::Student, Module::Settings, Action::Delete, true))
            .await
            .unwrap();

        let rows = store.reset_to_defaults().await.unwrap();
        let expected = default_grants();
        assert_eq!(rows.len(), expected.len());
        for g in expected {
            assert_eq!(
                store.find_permission(g.role, g.module, g.action).await.unwrap(),
                Some(g.permitted)
            );
        }
        assert_eq!(
            store
                .find_permission(Role::Student, Module::Settings, Action::Delete)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn list_all_is_ordered() {
        let store = store();
        store.reset_to_defaults().await.unwrap();
        let rows = store.list_all().await.unwrap();
        let keys: Vec<_> = rows
            .iter()
            .map(|r| (r.role.as_str(), r.module.as_str(), r.action.as_str()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn seed_only_when_empty() {
        let store = store();
        assert!(store.seed_defaults_if_empty().await.unwrap());
        let count = store.list_all().await.unwrap().len();
        assert!(!store.seed_defaults_if_empty().await.unwrap());
        assert_eq!(store.list_all().await.unwrap().len(), count);
    }

    #[tokio::test]
    async fn delete_all_for_role_counts_rows() {
        let store = store();
        store.reset_to_defaults().await.unwrap();
        assert_eq!(store.delete_all_for_role(Role::Student).await.unwrap(), 3);
        assert_eq!(store.delete_all_for_role(Role::Student).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aulad.db");
        {
            let store = SqlitePermissionStore::new(Arc::new(ControlDb::new(&path).unwrap()));
            store
                .create(grant(Role::Student, Module::Reports, Action::View, true))
                .await
                .unwrap();
        }
        let store = SqlitePermissionStore::new(Arc::new(ControlDb::new(&path).unwrap()));
        assert_eq!(
            store
                .find_permission(Role::Student, Module::Reports, Action::View)
                .await
                .unwrap(),
            Some(true)
        );
    }
}
