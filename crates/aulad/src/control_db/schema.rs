//! SQLite schema for aulad state (users, permissions, login throttling).

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS control_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Credential records. Never physically deleted; `active` is toggled instead.
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL UNIQUE,
    secret_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    display_name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    must_change_secret INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

-- (role, module, action) -> permitted. Absence means denied.
CREATE TABLE IF NOT EXISTS permissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role TEXT NOT NULL,
    module TEXT NOT NULL,
    action TEXT NOT NULL,
    permitted INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (role, module, action)
);

CREATE INDEX IF NOT EXISTS idx_permissions_role ON permissions(role);

-- Failed login attempts (sliding window per identifier)
CREATE TABLE IF NOT EXISTS login_failures (
    identifier TEXT NOT NULL,
    ts INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_login_failures_identifier_ts ON login_failures(identifier, ts);

INSERT OR REPLACE INTO control_metadata (key, value) VALUES ('schema_version', '1');
"#;
