// Document DB module: <data_dir>/documents.db
// Backs the remote document store: per-user plant sub-collections and the
// friend links read by the social-graph view. Documents are opaque JSON bodies
// addressed by server-assigned ids.

use rusqlite::{params, Connection};
use anyhow::Result;

use super::migrations;

const DOCUMENT_MIGRATIONS: &[&str] = &[
    // Migration D1: plant documents per user
    r#"
    CREATE TABLE IF NOT EXISTS plant_documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        doc_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        identity_key TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_plant_documents_user ON plant_documents(user_id, id);
    CREATE INDEX IF NOT EXISTS idx_plant_documents_key ON plant_documents(user_id, identity_key);
    "#,

    // Migration D2: friend links (written by the social layer, read here)
    r#"
    CREATE TABLE IF NOT EXISTS friends (
        user_id TEXT NOT NULL,
        friend_id TEXT NOT NULL,
        username TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (user_id, friend_id)
    );
    "#,
];

pub fn run_document_migrations(conn: &Connection) -> Result<()> {
    migrations::run_migrations(conn, DOCUMENT_MIGRATIONS, "Document DB")
}

/// A stored plant document.
#[derive(Debug, Clone)]
pub struct PlantDocument {
    pub doc_id: String,
    pub user_id: String,
    pub identity_key: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FriendRow {
    pub friend_id: String,
    pub username: Option<String>,
}

pub fn insert_plant_document(
    conn: &Connection,
    user_id: &str,
    doc_id: &str,
    identity_key: &str,
    body: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO plant_documents (doc_id, user_id, identity_key, body) VALUES (?1, ?2, ?3, ?4)",
        params![doc_id, user_id, identity_key, body],
    )?;
    Ok(())
}

/// List a user's documents in creation order
pub fn list_plant_documents(conn: &Connection, user_id: &str) -> Result<Vec<PlantDocument>> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, user_id, identity_key, body, created_at
         FROM plant_documents WHERE user_id = ?1 ORDER BY id ASC"
    )?;

    let docs = stmt.query_map([user_id], |row| {
        Ok(PlantDocument {
            doc_id: row.get(0)?,
            user_id: row.get(1)?,
            identity_key: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?.collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(docs)
}

pub fn count_plant_documents(conn: &Connection, user_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM plant_documents WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Delete a document. Returns false when no such document exists for the user.
pub fn delete_plant_document(conn: &Connection, user_id: &str, doc_id: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM plant_documents WHERE user_id = ?1 AND doc_id = ?2",
        params![user_id, doc_id],
    )?;
    Ok(rows > 0)
}

/// Record a friend link (one direction).
pub fn insert_friend(conn: &Connection, user_id: &str, friend_id: &str, username: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT INTO friends (user_id, friend_id, username) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, friend_id) DO UPDATE SET username = excluded.username",
        params![user_id, friend_id, username],
    )?;
    Ok(())
}

pub fn list_friends(conn: &Connection, user_id: &str) -> Result<Vec<FriendRow>> {
    let mut stmt = conn.prepare(
        "SELECT friend_id, username FROM friends WHERE user_id = ?1 ORDER BY created_at ASC, friend_id ASC"
    )?;

    let rows = stmt.query_map([user_id], |row| {
        Ok(FriendRow {
            friend_id: row.get(0)?,
            username: row.get(1)?,
        })
    })?.collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
