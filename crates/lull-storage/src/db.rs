use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::migrations;
use crate::models::{BreakLog, BreakOutcome};

/// Database connection wrapper
///
/// The connection is behind a mutex so the engine task and CLI handlers can
/// share one handle through an `Arc`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new database connection
    ///
    /// Passing `None` opens an in-memory database, used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, connection opening, or schema
    /// initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let conn = match db_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create database directory")?;
                }
                let conn =
                    Connection::open(&path).context("Failed to open database connection")?;
                log::info!("Database initialized at: {}", path.display());
                conn
            }
            None => Connection::open_in_memory().context("Failed to open in-memory database")?,
        };

        migrations::init_schema(&conn)?;
        migrations::insert_default_settings(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Default database path under the platform data directory
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("lull");
        path.push("lull.db");
        path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Settings ====================

    /// Get a setting value by key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a setting value, inserting or updating as needed
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = strftime('%s', 'now')",
            [key, value],
        )?;
        Ok(())
    }

    /// Get all settings as key/value pairs
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn get_all_settings(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    // ==================== Break log ====================

    /// Record a break reminder that was just surfaced
    ///
    /// Returns the row id so the outcome can be filled in later.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub fn log_break(&self, break_type: &str, duration_seconds: u32) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO logs (timestamp, break_type, duration_seconds)
             VALUES (?1, ?2, ?3)",
            params![Utc::now().timestamp(), break_type, duration_seconds],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark the outcome of a previously logged break
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub fn update_break_log(&self, id: i64, outcome: BreakOutcome) -> Result<()> {
        let sql = format!("UPDATE logs SET {} = 1 WHERE id = ?1", outcome.column());
        self.conn().execute(&sql, [id])?;
        Ok(())
    }

    /// Breaks surfaced since UTC midnight, most recent first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn breaks_today(&self) -> Result<Vec<BreakLog>> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(0, |t| t.and_utc().timestamp());

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, break_type, duration_seconds, completed, skipped, snoozed
             FROM logs WHERE timestamp >= ?1 ORDER BY timestamp DESC",
        )?;
        let logs = stmt
            .query_map([midnight], |row| {
                Ok(BreakLog {
                    id: row.get(0)?,
                    timestamp: Utc
                        .timestamp_opt(row.get::<_, i64>(1)?, 0)
                        .single()
                        .unwrap_or_else(Utc::now),
                    break_type: row.get(2)?,
                    duration_seconds: row.get(3)?,
                    completed: row.get::<_, i32>(4)? != 0,
                    skipped: row.get::<_, i32>(5)? != 0,
                    snoozed: row.get::<_, i32>(6)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_seeded() {
        let db = Database::new(None).unwrap();
        assert_eq!(
            db.get_setting("micro_break_interval").unwrap().as_deref(),
            Some("1200")
        );
        assert_eq!(
            db.get_setting("timer_mode").unwrap().as_deref(),
            Some("wall-clock")
        );
        assert_eq!(db.get_setting("no_such_key").unwrap(), None);
    }

    #[test]
    fn test_set_setting_overwrites() {
        let db = Database::new(None).unwrap();
        db.set_setting("idle_threshold", "60").unwrap();
        db.set_setting("idle_threshold", "90").unwrap();
        assert_eq!(
            db.get_setting("idle_threshold").unwrap().as_deref(),
            Some("90")
        );
    }

    #[test]
    fn test_defaults_do_not_overwrite_user_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lull.db");

        let db = Database::new(Some(path.clone())).unwrap();
        db.set_setting("macro_break_interval", "3600").unwrap();
        drop(db);

        // Re-opening runs the seeding again; user value must survive
        let db = Database::new(Some(path)).unwrap();
        assert_eq!(
            db.get_setting("macro_break_interval").unwrap().as_deref(),
            Some("3600")
        );
    }

    #[test]
    fn test_break_log_roundtrip() {
        let db = Database::new(None).unwrap();
        let id = db.log_break("micro", 20).unwrap();
        db.update_break_log(id, BreakOutcome::Completed).unwrap();

        let logs = db.breaks_today().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].break_type, "micro");
        assert!(logs[0].completed);
        assert!(!logs[0].skipped);
    }
}
