//! SQLite persistence.
//!
//! `Database` is cheap to clone; all clones share one connection behind a
//! mutex. Operations are split by entity across the submodules, each adding
//! an `impl Database` block.

mod ai_usage;
mod maintenance;
mod milestones;
mod notifications;
pub mod schema;
mod sprints;
mod stats;
mod tasks;
mod upgrades;
mod users;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;

pub use maintenance::{ExpiredSprint, SprintReminder};
pub use sprints::validate_new_sprint;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::StoreError::invalid(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open the database in the platform data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(default_path())
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(schema::SCHEMA)?;
        tracing::debug!("database schema up to date");
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn default_path() -> PathBuf {
    directories::ProjectDirs::from("app", "sprintify", "sprintify")
        .map(|dirs| dirs.data_dir().join("sprintify.db"))
        .unwrap_or_else(|| PathBuf::from("sprintify.db"))
}

// Column conversions shared by the entity modules.

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_opt_ts(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(idx, &s)).transpose()
}

pub(crate) fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_opt_date(idx: usize, s: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    s.map(|s| parse_date(idx, &s)).transpose()
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_ts() -> String {
    fmt_ts(Utc::now())
}

/// Checks if a rusqlite error is a uniqueness violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

pub(crate) fn enum_error(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}
