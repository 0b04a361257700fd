//! Database schema and version tracking.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// A database written with any other schema version is refused.
pub fn initialize(conn: &Connection) -> Result<()> {
    match get_schema_version(conn)? {
        0 => {
            // Fresh database - create all tables
            create_schema_v1(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Reference tables, one JSON document per row.
        -- Timestamps are unix milliseconds.
        CREATE TABLE IF NOT EXISTS entities (
            table_name TEXT NOT NULL,
            key TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER,
            body TEXT NOT NULL,
            PRIMARY KEY (table_name, key)
        );
        CREATE INDEX IF NOT EXISTS idx_entities_updated
            ON entities(table_name, updated_at);
        CREATE INDEX IF NOT EXISTS idx_entities_created
            ON entities(table_name, created_at);

        -- Sensor history, one row per sensor and day.
        -- Timestamps are unix seconds, day is a julian day number.
        CREATE TABLE IF NOT EXISTS history (
            sensor_id TEXT NOT NULL,
            day INTEGER NOT NULL,
            location_id TEXT NOT NULL,
            time_stamp INTEGER NOT NULL,
            uploaded_at INTEGER,
            raw_data BLOB NOT NULL,
            PRIMARY KEY (sensor_id, day)
        );
        CREATE INDEX IF NOT EXISTS idx_history_uploaded
            ON history(uploaded_at);

        -- Process-wide sync settings (credentials and watermarks)
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    Ok(())
}
