use anyhow::Result;
use rusqlite::Connection;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if database table creation or index creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Settings table - key/value store for engine configuration
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT UNIQUE NOT NULL,
            value TEXT NOT NULL,
            updated_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    // Logs table - history of break reminders and their outcomes
    conn.execute(
        "CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            break_type TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            snoozed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp)",
        [],
    )?;

    Ok(())
}

/// Seed default settings without overwriting user changes
///
/// # Errors
///
/// Returns an error if the insert fails or default serialization fails
pub fn insert_default_settings(conn: &Connection) -> Result<()> {
    let blocklist = serde_json::to_string(&[
        "league_of_legends.exe",
        "vlc.exe",
        "obs64.exe",
        "zoom.exe",
        "discord.exe",
    ])?;

    let defaults: [(&str, &str); 10] = [
        ("micro_break_interval", "1200"),
        ("micro_break_duration", "20"),
        ("macro_break_interval", "2700"),
        ("macro_break_duration", "180"),
        ("hydration_interval", "1800"),
        ("idle_threshold", "180"),
        ("timer_mode", "wall-clock"),
        ("session_state", "idle"),
        ("auto_detect_fullscreen", "true"),
        ("blocklist_processes", &blocklist),
    ];

    for (key, value) in defaults {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
    }

    Ok(())
}
