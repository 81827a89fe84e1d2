//! Granular `(role, module, action)` permissions

pub mod admin;
pub mod cache;
pub mod defaults;
pub mod gate;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{Role, UnknownLabel};

pub use admin::{AdminError, PermissionAdmin};
pub use cache::{PermissionCache, TtlPermissionCache};
pub use gate::{permission_layer, PermissionGate};
pub use store::{PermissionStore, PermissionStoreError, SqlitePermissionStore};

/// Functional area of the application guarded by permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Module {
    #[serde(rename = "usuarios")]
    Users,
    #[serde(rename = "estudiantes")]
    Students,
    #[serde(rename = "ciclos")]
    Cycles,
    #[serde(rename = "matriculas")]
    Enrollments,
    #[serde(rename = "pagos")]
    Payments,
    #[serde(rename = "asistencias")]
    Attendance,
    #[serde(rename = "reportes")]
    Reports,
    #[serde(rename = "configuracion")]
    Settings,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Module::Users,
        Module::Students,
        Module::Cycles,
        Module::Enrollments,
        Module::Payments,
        Module::Attendance,
        Module::Reports,
        Module::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "usuarios",
            Self::Students => "estudiantes",
            Self::Cycles => "ciclos",
            Self::Enrollments => "matriculas",
            Self::Payments => "pagos",
            Self::Attendance => "asistencias",
            Self::Reports => "reportes",
            Self::Settings => "configuracion",
        }
    }
}

impl std::str::FromStr for Module {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == label)
            .ok_or_else(|| UnknownLabel::new("module", s))
    }
}

impl TryFrom<String> for Module {
    type Error = UnknownLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation kind within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Action {
    #[serde(rename = "ver")]
    View,
    #[serde(rename = "crear")]
    Create,
    #[serde(rename = "editar")]
    Edit,
    #[serde(rename = "eliminar")]
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "ver",
            Self::Create => "crear",
            Self::Edit => "editar",
            Self::Delete => "eliminar",
        }
    }
}

impl std::str::FromStr for Action {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == label)
            .ok_or_else(|| UnknownLabel::new("action", s))
    }
}

impl TryFrom<String> for Action {
    type Error = UnknownLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionTuple {
    pub id: i64,
    pub role: Role,
    pub module: Module,
    pub action: Action,
    pub permitted: bool,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a single permission row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PermissionGrant {
    pub role: Role,
    pub module: Module,
    pub action: Action,
    #[serde(default = "default_permitted")]
    pub permitted: bool,
}

/// One entry of a role's replacement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub module: Module,
    pub action: Action,
    #[serde(default = "default_permitted")]
    pub permitted: bool,
}

fn default_permitted() -> bool {
    true
}
