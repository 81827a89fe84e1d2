//! Failed-login throttling per identifier (SQLite sliding window).

use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;

use crate::config::LoginThrottleConfig;
use crate::control_db::ControlDb;

#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("too many failed attempts (retry after {retry_after_secs}s)")]
    Locked { retry_after_secs: u64 },
}

pub type Result<T> = std::result::Result<T, ThrottleError>;

#[derive(Clone)]
pub struct LoginThrottle {
    db: Arc<ControlDb>,
    config: LoginThrottleConfig,
}

impl LoginThrottle {
    pub fn new(db: Arc<ControlDb>, config: LoginThrottleConfig) -> Self {
        Self { db, config }
    }

    /// Fails with [`ThrottleError::Locked`] once `max_failures` failures sit inside the window.
    pub fn check(&self, identifier: &str) -> Result<()> {
        self.check_at(identifier, Utc::now().timestamp())
    }

    pub fn record_failure(&self, identifier: &str) -> Result<()> {
        self.record_failure_at(identifier, Utc::now().timestamp())
    }

    /// Forget all failures for `identifier` (called after a successful login).
    pub fn clear(&self, identifier: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let conn = self.db.lock_conn();
        conn.execute(
            "DELETE FROM login_failures WHERE identifier = ?1",
            params![identifier],
        )?;
        Ok(())
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.config.window_secs.max(1)).unwrap_or(i64::MAX)
    }

    fn check_at(&self, identifier: &str, now: i64) -> Result<()> {
        // 0 means unlimited.
        if !self.config.enabled || self.config.max_failures == 0 {
            return Ok(());
        }

        let window_secs = self.window_secs();
        let cutoff = now.saturating_sub(window_secs);

        let conn = self.db.lock_conn();
        let (count, oldest): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MIN(ts) FROM login_failures WHERE identifier = ?1 AND ts >= ?2",
            params![identifier, cutoff],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if count >= i64::from(self.config.max_failures) {
            let retry_after_secs = oldest
                .map(|oldest| (window_secs - (now - oldest)).max(1) as u64)
                .unwrap_or(self.config.window_secs.max(1));
            return Err(ThrottleError::Locked { retry_after_secs });
        }

        Ok(())
    }

    fn record_failure_at(&self, identifier: &str, now: i64) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let cutoff = now.saturating_sub(self.window_secs());

        let mut conn = self.db.lock_conn();
        let tx = conn.transaction()?;

        // Global cleanup for the sliding window.
        tx.execute("DELETE FROM login_failures WHERE ts < ?1", params![cutoff])?;
        tx.execute(
            "INSERT INTO login_failures (identifier, ts) VALUES (?1, ?2)",
            params![identifier, now],
        )?;

        tx.commit()?;
        Ok(())
    }
}
