// Local DB module: <data_dir>/local.db
// Device-scoped key-value persistence. Stores: the serialized collection
// payload (kv_store) and app settings (app_settings).

use rusqlite::{params, Connection, OptionalExtension};
use anyhow::Result;

use super::migrations;

/// All local DB migrations in order.
const LOCAL_MIGRATIONS: &[&str] = &[
    // Migration L1: string-keyed, string-valued store
    r#"
    CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    "#,

    // Migration L2: app settings KV
    r#"
    CREATE TABLE IF NOT EXISTS app_settings (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );
    "#,
];

pub fn run_local_migrations(conn: &Connection) -> Result<()> {
    migrations::run_migrations(conn, LOCAL_MIGRATIONS, "Local DB")
}

/// Get a stored value by key.
pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        [key],
        |row| row.get(0),
    ).optional()?;
    Ok(value)
}

/// Set a stored value (upsert). A single statement, so readers never see a partial write.
pub fn set_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_value(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
    Ok(())
}

/// Get a setting value by key.
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn.query_row(
        "SELECT value FROM app_settings WHERE key = ?1",
        [key],
        |row| row.get(0),
    ).optional()?;
    Ok(value)
}

/// Set a setting value (upsert).
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}
