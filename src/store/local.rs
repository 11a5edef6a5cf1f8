// Local store adapter
// The whole collection is one JSON payload under a single key. Saves overwrite
// the payload in one statement; writers serialize on `write_lock`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Deserialize;

use crate::constants::{CORRUPT_PAYLOAD_SUFFIX, DEFAULT_COLLECTION_KEY};
use crate::db::{self, local_db};
use crate::error::{PlantScopeError, Result};
use crate::media::is_durable_url;
use crate::model::{EncyclopediaSummary, PlantIdentity, PlantMedia, PlantRecord};
use crate::recognition::RecognitionCandidate;

/// Record shape written by older app builds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    plant_info: RecognitionCandidate,
    #[serde(default)]
    wiki_plant_details: Option<LegacyWikiDetails>,
    #[serde(default)]
    image_uri: Option<String>,
    #[serde(default)]
    doc_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyWikiDetails {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current(PlantRecord),
    Legacy(LegacyRecord),
}

impl From<LegacyRecord> for PlantRecord {
    fn from(legacy: LegacyRecord) -> Self {
        let species = legacy.plant_info.species;
        let media = match legacy.image_uri.filter(|u| !u.trim().is_empty()) {
            Some(uri) if is_durable_url(&uri) => PlantMedia { local_uri: None, remote_url: Some(uri) },
            Some(uri) => PlantMedia { local_uri: Some(uri), remote_url: None },
            None => PlantMedia::default(),
        };

        PlantRecord {
            identity: PlantIdentity {
                scientific_name: species.scientific_name.unwrap_or_default(),
                common_names: species.common_names,
                family: species.family.map(|t| t.scientific_name).unwrap_or_default(),
                genus: species.genus.map(|t| t.scientific_name).unwrap_or_default(),
            },
            confidence_score: legacy.plant_info.score.filter(|s| (0.0..=1.0).contains(s)),
            media,
            encyclopedia: legacy.wiki_plant_details.map(|w| EncyclopediaSummary {
                title: w.title,
                extract: w.extract.unwrap_or_default(),
                images: Vec::new(),
            }),
            remote_doc_id: legacy.doc_id,
        }
    }
}

impl From<StoredRecord> for PlantRecord {
    fn from(stored: StoredRecord) -> Self {
        match stored {
            StoredRecord::Current(record) => record,
            StoredRecord::Legacy(legacy) => legacy.into(),
        }
    }
}

/// Decode a stored payload. Older record shapes are upgraded in place.
pub fn decode_payload(payload: &str) -> Result<Vec<PlantRecord>> {
    let stored: Vec<StoredRecord> = serde_json::from_str(payload)?;
    Ok(stored.into_iter().map(PlantRecord::from).collect())
}

pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    write_lock: tokio::sync::Mutex<()>,
    key: String,
}

impl LocalStore {
    pub fn new(conn: Connection, key: impl Into<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock: tokio::sync::Mutex::new(()),
            key: key.into(),
        }
    }

    /// Open the local database at `db_path`
    pub fn open(db_path: &Path, key: impl Into<String>) -> Result<Self> {
        Ok(Self::new(db::open_local_db(db_path)?, key))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(db::open_local_db_in_memory()?, DEFAULT_COLLECTION_KEY))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shared connection, also used for settings.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PlantScopeError::Other(format!("local store lock poisoned: {}", e)))?;
        Ok(f(&conn)?)
    }

    /// Database failures are errors; only a corrupt payload reads as empty.
    fn read_records(&self) -> Result<Vec<PlantRecord>> {
        let payload = match self.with_conn(|conn| local_db::get_value(conn, &self.key))? {
            Some(payload) => payload,
            None => return Ok(Vec::new()),
        };

        let records = match decode_payload(&payload) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Local collection payload is corrupt, treating as empty: {}", e);
                let backup_key = format!("{}{}", self.key, CORRUPT_PAYLOAD_SUFFIX);
                if let Err(e) = self.with_conn(|conn| local_db::set_value(conn, &backup_key, &payload)) {
                    log::error!("Failed to back up corrupt payload: {}", e);
                }
                Vec::new()
            }
        };
        Ok(records)
    }

    fn write_records(&self, records: &[PlantRecord]) -> Result<()> {
        let payload = serde_json::to_string(records)?;
        self.with_conn(|conn| local_db::set_value(conn, &self.key, &payload))
    }

    /// Load the stored collection. Never fails: nothing stored, an unreadable
    /// database or a corrupt payload all read as an empty collection.
    pub async fn load_local(&self) -> Vec<PlantRecord> {
        self.read_records().unwrap_or_else(|e| {
            log::error!("Failed to read local collection: {}", e);
            Vec::new()
        })
    }

    /// Overwrite the entire stored collection.
    pub async fn save_local(&self, records: &[PlantRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_records(records)
    }

    /// Read-modify-write under the write lock. The payload is only rewritten
    /// when `f` actually changed the records. A failed read aborts before `f`
    /// runs, so an unreadable store is never overwritten.
    pub async fn update<T>(&self, f: impl FnOnce(&mut Vec<PlantRecord>) -> T) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let before = self.read_records()?;
        let mut records = before.clone();
        let result = f(&mut records);

        if records != before {
            self.write_records(&records)?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_store_loads_empty() {
        let store = LocalStore::in_memory().unwrap();
        assert!(store.load_local().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_whole_sequence() {
        let store = LocalStore::in_memory().unwrap();
        store
            .save_local(&[PlantRecord::new("Rosa canina"), PlantRecord::new("Quercus robur")])
            .await
            .unwrap();
        store.save_local(&[PlantRecord::new("Ficus carica")]).await.unwrap();

        let loaded = store.load_local().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].identity.scientific_name, "Ficus carica");
    }

    #[tokio::test]
    async fn test_corrupt_payload_reads_empty_and_is_backed_up() {
        let store = LocalStore::in_memory().unwrap();
        store
            .with_conn(|conn| local_db::set_value(conn, DEFAULT_COLLECTION_KEY, "{not json"))
            .unwrap();

        assert!(store.load_local().await.is_empty());

        let backup = store
            .with_conn(|conn| local_db::get_value(conn, "plantCollection.corrupt"))
            .unwrap();
        assert_eq!(backup.as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_legacy_records_are_upgraded() {
        let legacy = r#"[
            {
                "plantInfo": {
                    "score": 0.91,
                    "species": {
                        "scientificName": "Rosa canina",
                        "commonNames": ["Dog rose"],
                        "family": { "scientificName": "Rosaceae" },
                        "genus": { "scientificName": "Rosa" }
                    }
                },
                "wikiPlantDetails": { "title": "Rosa canina", "extract": "A wild rose." },
                "imageUri": "file:///photos/rose.jpg"
            },
            {
                "plantInfo": { "species": { "scientificName": "Quercus robur" } },
                "wikiPlantDetails": null,
                "imageUri": "https://cdn.example/oak.jpg",
                "docId": "abc"
            }
        ]"#;

        let records = decode_payload(legacy).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].identity.family, "Rosaceae");
        assert_eq!(records[0].confidence_score, Some(0.91));
        assert_eq!(records[0].media.local_uri.as_deref(), Some("file:///photos/rose.jpg"));
        assert_eq!(records[0].encyclopedia.as_ref().unwrap().extract, "A wild rose.");

        assert_eq!(records[1].media.remote_url.as_deref(), Some("https://cdn.example/oak.jpg"));
        assert_eq!(records[1].remote_doc_id.as_deref(), Some("abc"));
        assert!(records[1].encyclopedia.is_none());
    }

    #[tokio::test]
    async fn test_update_serializes_writers() {
        let store = Arc::new(LocalStore::in_memory().unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update(|records| records.push(PlantRecord::new(format!("Species {}", i))))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // No lost updates
        assert_eq!(store.load_local().await.len(), 16);
    }

    #[tokio::test]
    async fn test_update_fails_when_store_unreadable() {
        let store = LocalStore::in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE kv_store;")?;
                Ok(())
            })
            .unwrap();

        let mut ran = false;
        let result = store
            .update(|records| {
                ran = true;
                records.push(PlantRecord::new("Rosa canina"));
            })
            .await;

        assert!(result.is_err());
        assert!(!ran);
        assert!(store.load_local().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_without_change_does_not_write() {
        let store = LocalStore::in_memory().unwrap();
        let removed = store
            .update(|records| {
                let before = records.len();
                records.retain(|r| r.identity.scientific_name != "Nothing");
                before - records.len()
            })
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let stored = store
            .with_conn(|conn| local_db::get_value(conn, DEFAULT_COLLECTION_KEY))
            .unwrap();
        assert!(stored.is_none());
    }
}
