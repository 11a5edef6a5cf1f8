// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// Get current schema version
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row(
        "PRAGMA user_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Run all pending migrations from `migrations` in order.
/// Uses PRAGMA user_version for version tracking.
pub fn run_migrations(conn: &Connection, migrations: &[&str], label: &str) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = migrations.len() as u32;

    if current_version > target_version {
        anyhow::bail!(
            "{} schema version {} is newer than this build supports (max {}). Please upgrade PlantScope.",
            label,
            current_version,
            target_version
        );
    }

    for (i, migration) in migrations.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;

        log::info!("Applied {} migration {}", label, migration_version);
    }

    Ok(())
}
