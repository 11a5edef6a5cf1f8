// Database module
// Two SQLite databases: the device-local store (collection payload + settings)
// and the document store backing the remote per-user collections.

pub mod migrations;
pub mod local_db;
pub mod document_db;

use std::path::{Path, PathBuf};
use rusqlite::Connection;
use anyhow::Result;

use crate::constants::{
    APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, BLOBS_FOLDER, DB_BUSY_TIMEOUT_MS,
    DOCUMENT_DB_FILENAME, LOCAL_DB_FILENAME,
};

/// Set per-connection pragmas
fn apply_pragmas(conn: &Connection) -> Result<()> {
    // Enable WAL mode for better concurrency
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(&format!("PRAGMA busy_timeout = {};", DB_BUSY_TIMEOUT_MS))?;
    Ok(())
}

fn open_at(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "Cannot create database directory {}: {}. Check directory permissions.",
                parent.display(),
                e
            )
        })?;
    }

    let conn = Connection::open(db_path)?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

/// Open or create the device-local database and run its migrations
pub fn open_local_db(db_path: &Path) -> Result<Connection> {
    let conn = open_at(db_path)?;
    local_db::run_local_migrations(&conn)?;
    Ok(conn)
}

/// Open or create the document store database and run its migrations
pub fn open_document_db(db_path: &Path) -> Result<Connection> {
    let conn = open_at(db_path)?;
    document_db::run_document_migrations(&conn)?;
    Ok(conn)
}

/// In-memory local database (tests, ephemeral sessions)
pub fn open_local_db_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    local_db::run_local_migrations(&conn)?;
    Ok(conn)
}

/// In-memory document database
pub fn open_document_db_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    document_db::run_document_migrations(&conn)?;
    Ok(conn)
}

/// Default data directory, e.g. ~/.local/share/plantscope on Linux
pub fn get_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn get_local_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOCAL_DB_FILENAME)
}

pub fn get_document_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DOCUMENT_DB_FILENAME)
}

pub fn get_blobs_path(data_dir: &Path) -> PathBuf {
    data_dir.join(BLOBS_FOLDER)
}
