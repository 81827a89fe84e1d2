//! Permission administration (super-role only). Every write clears the cache.

use std::collections::HashSet;
use std::sync::Arc;

use super::cache::PermissionCache;
use super::store::{PermissionStore, PermissionStoreError};
use super::{Action, Module, PermissionGrant, PermissionTuple, RoleGrant};
use crate::auth::{CredentialError, CredentialStore, Principal, Role};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Store(#[from] PermissionStoreError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("replacement set repeats {module}/{action}")]
    DuplicateGrant { module: Module, action: Action },
    #[error("user {0} not found")]
    UserNotFound(i64),
}

pub type Result<T> = std::result::Result<T, AdminError>;

#[derive(Clone)]
pub struct PermissionAdmin {
    store: Arc<dyn PermissionStore>,
    cache: Arc<dyn PermissionCache>,
    users: Arc<dyn CredentialStore>,
}

impl PermissionAdmin {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        cache: Arc<dyn PermissionCache>,
        users: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            store,
            cache,
            users,
        }
    }

    pub async fn list(&self) -> Result<Vec<PermissionTuple>> {
        Ok(self.store.list_all().await?)
    }

    pub async fn create(&self, grant: PermissionGrant) -> Result<PermissionTuple> {
        let result = self.store.create(grant).await;
        self.cache.invalidate_all();
        let row = result?;
        tracing::info!(
            id = row.id,
            role = %row.role,
            module = %row.module,
            action = %row.action,
            permitted = row.permitted,
            "Permission created"
        );
        Ok(row)
    }

    /// Set `permitted` on an existing row. Writing the current value is a
    /// no-op on the row but still clears the cache.
    pub async fn set_permitted(&self, id: i64, permitted: bool) -> Result<PermissionTuple> {
        let result = self.store.set_permitted(id, permitted).await;
        self.cache.invalidate_all();
        let row = result?;
        tracing::info!(id, permitted, "Permission updated");
        Ok(row)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = self.store.delete(id).await;
        self.cache.invalidate_all();
        result?;
        tracing::info!(id, "Permission deleted");
        Ok(())
    }

    pub async fn replace_for_role(
        &self,
        role: Role,
        grants: &[RoleGrant],
    ) -> Result<Vec<PermissionTuple>> {
        reject_duplicates(grants)?;
        let result = self.store.replace_all_for_role(role, grants).await;
        self.cache.invalidate_all();
        let rows = result?;
        tracing::info!(role = %role, count = rows.len(), "Role permissions replaced");
        Ok(rows)
    }

    /// Replace the permission set of the role held by `user_id`.
    ///
    /// Permissions are role-scoped, so this edits every user sharing that role.
    /// The resolved role is returned so callers can report it.
    pub async fn replace_for_user(
        &self,
        user_id: i64,
        grants: &[RoleGrant],
    ) -> Result<(Role, Vec<PermissionTuple>)> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AdminError::UserNotFound(user_id))?;
        let rows = self.replace_for_role(user.role, grants).await?;
        Ok((user.role, rows))
    }

    pub async fn reset_to_defaults(&self) -> Result<Vec<PermissionTuple>> {
        let result = self.store.reset_to_defaults().await;
        self.cache.invalidate_all();
        let rows = result?;
        tracing::info!(count = rows.len(), "Permissions reset to defaults");
        Ok(rows)
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
        tracing::info!("Permission cache cleared");
    }

    /// Pairs the principal may currently perform. The super-role gets every pair.
    pub async fn effective_for(&self, principal: &Principal) -> Result<Vec<(Module, Action)>> {
        if principal.role.is_super() {
            return Ok(Module::ALL
                .into_iter()
                .flat_map(|m| Action::ALL.into_iter().map(move |a| (m, a)))
                .collect());
        }

        Ok(self
            .store
            .list_for_role(principal.role)
            .await?
            .into_iter()
            .filter(|row| row.permitted)
            .map(|row| (row.module, row.action))
            .collect())
    }
}

fn reject_duplicates(grants: &[RoleGrant]) -> Result<()> {
    let mut seen = HashSet::new();
    for grant in grants {
        if !seen.insert((grant.module, grant.action)) {
            return Err(AdminError::DuplicateGrant {
                module: grant.module,
                action: grant.action,
            });
        }
    }
    Ok(())
}
