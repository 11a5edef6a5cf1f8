// Remote store adapter
// Per-user collections of plant documents keyed by opaque, server-assigned ids.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, document_db};
use crate::error::{PlantScopeError, Result};
use crate::identity::derive_key;
use crate::model::{PlantRecord, UserId};

/// Remote per-user collection.
///
/// Read failures are `RemoteUnavailable`: callers must treat them as
/// "remote state unknown", never as an empty collection.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every document in the user's collection, each tagged with its `remote_doc_id`.
    async fn load_remote(&self, user: &UserId) -> Result<Vec<PlantRecord>>;

    /// Persist a new document and return its id.
    async fn create_remote(&self, user: &UserId, record: &PlantRecord) -> Result<String>;

    /// Delete a document. `Ok(false)` when the id does not exist.
    async fn delete_remote(&self, user: &UserId, doc_id: &str) -> Result<bool>;
}

/// Document store on a SQLite database.
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Arc::new(Mutex::new(conn)) }
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(db::open_document_db(db_path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(db::open_document_db_in_memory()?))
    }

    /// Run `f` against the connection. Any failure is mapped with `on_err`.
    pub(crate) fn with_conn<T>(
        &self,
        on_err: fn(String) -> PlantScopeError,
        f: impl FnOnce(&Connection) -> anyhow::Result<T>,
    ) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| on_err(format!("document store lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| on_err(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for DocumentStore {
    async fn load_remote(&self, user: &UserId) -> Result<Vec<PlantRecord>> {
        let docs = self.with_conn(PlantScopeError::RemoteUnavailable, |conn| {
            document_db::list_plant_documents(conn, user.as_str())
        })?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_str::<PlantRecord>(&doc.body) {
                Ok(mut record) => {
                    record.remote_doc_id = Some(doc.doc_id);
                    records.push(record);
                }
                Err(e) => {
                    log::warn!("Skipping unreadable document {} for {}: {}", doc.doc_id, user, e);
                }
            }
        }

        Ok(records)
    }

    async fn create_remote(&self, user: &UserId, record: &PlantRecord) -> Result<String> {
        let key = derive_key(&record.identity.scientific_name)?;
        let doc_id = Uuid::new_v4().simple().to_string();

        let mut stored = record.clone();
        stored.remote_doc_id = Some(doc_id.clone());
        let body = serde_json::to_string(&stored)
            .map_err(|e| PlantScopeError::RemoteWriteFailed(e.to_string()))?;

        self.with_conn(PlantScopeError::RemoteWriteFailed, |conn| {
            document_db::insert_plant_document(conn, user.as_str(), &doc_id, key.as_str(), &body)
        })?;

        Ok(doc_id)
    }

    async fn delete_remote(&self, user: &UserId, doc_id: &str) -> Result<bool> {
        self.with_conn(PlantScopeError::RemoteWriteFailed, |conn| {
            document_db::delete_plant_document(conn, user.as_str(), doc_id)
        })
    }
}
