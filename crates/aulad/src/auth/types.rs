//! Role labels and the per-request principal

use serde::{Deserialize, Serialize};

/// A label that did not match any known role, module or action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownLabel {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Application role, stored as its lowercase label in `users.role` and `permissions.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Role {
    /// Super-role: bypasses every granular permission check.
    #[serde(rename = "admin")]
    Admin,
    /// Front-desk staff.
    #[serde(rename = "secretaria")]
    FrontDesk,
    /// Self-service access for enrolled students.
    #[serde(rename = "estudiante")]
    Student,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::FrontDesk, Role::Student];

    /// The distinguished role that is always permitted.
    pub const SUPER: Role = Role::Admin;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::FrontDesk => "secretaria",
            Self::Student => "estudiante",
        }
    }

    pub fn is_super(&self) -> bool {
        *self == Self::SUPER
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "secretaria" => Ok(Self::FrontDesk),
            "estudiante" => Ok(Self::Student),
            _ => Err(UnknownLabel::new("role", s)),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated identity attached to a request by `require_auth`.
///
/// Built from the verified token's user id plus a fresh read of the user
/// row, so `role`, `display_name` and `active` reflect the current record
/// rather than what was true when the token was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub identifier: String,
    pub role: Role,
    pub display_name: String,
    pub active: bool,
}
