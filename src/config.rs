// Collection configuration
// Stored as JSON in the local app_settings table. Unknown or missing fields
// fall back to defaults so older builds' settings keep loading.

use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_SETTING_KEY, DEFAULT_BLOB_BASE_URL, DEFAULT_COLLECTION_KEY, DEFAULT_REMOTE_TIMEOUT_SECS,
    DEFAULT_UPLOAD_TIMEOUT_SECS,
};
use crate::db::local_db;
use crate::error::{PlantScopeError, Result};
use crate::reconcile::CallLimits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionConfig {
    pub remote_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub blob_base_url: String,
    pub collection_key: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            upload_timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
            blob_base_url: DEFAULT_BLOB_BASE_URL.to_string(),
            collection_key: DEFAULT_COLLECTION_KEY.to_string(),
        }
    }
}

impl CollectionConfig {
    pub fn call_limits(&self) -> CallLimits {
        CallLimits {
            remote_timeout: Duration::from_secs(self.remote_timeout_secs),
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote_timeout_secs == 0 || self.upload_timeout_secs == 0 {
            return Err(PlantScopeError::Config("timeouts must be at least 1 second".to_string()));
        }
        if self.collection_key.trim().is_empty() {
            return Err(PlantScopeError::Config("collection key is empty".to_string()));
        }
        if !crate::media::is_durable_url(&self.blob_base_url) {
            return Err(PlantScopeError::Config(format!(
                "blob base URL must be http(s): {}",
                self.blob_base_url
            )));
        }
        Ok(())
    }
}

/// Load config from the local DB. Missing or unreadable values give defaults.
pub fn load_config(conn: &Connection) -> Result<CollectionConfig> {
    let stored = local_db::get_setting(conn, CONFIG_SETTING_KEY)?;

    let config = match stored {
        Some(json) => serde_json::from_str::<CollectionConfig>(&json).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable collection config: {}", e);
            CollectionConfig::default()
        }),
        None => CollectionConfig::default(),
    };

    Ok(config)
}

pub fn save_config(conn: &Connection, config: &CollectionConfig) -> Result<()> {
    config.validate()?;
    let json = serde_json::to_string(config)?;
    local_db::set_setting(conn, CONFIG_SETTING_KEY, &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_defaults_when_unset() {
        let conn = db::open_local_db_in_memory().unwrap();
        let config = load_config(&conn).unwrap();
        assert_eq!(config, CollectionConfig::default());
        assert_eq!(config.call_limits().remote_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_round_trip_through_settings() {
        let conn = db::open_local_db_in_memory().unwrap();
        let config = CollectionConfig {
            remote_timeout_secs: 5,
            blob_base_url: "https://blobs.test/plants".to_string(),
            ..Default::default()
        };
        save_config(&conn, &config).unwrap();
        assert_eq!(load_config(&conn).unwrap(), config);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let conn = db::open_local_db_in_memory().unwrap();
        local_db::set_setting(&conn, CONFIG_SETTING_KEY, r#"{"uploadTimeoutSecs": 120}"#).unwrap();

        let config = load_config(&conn).unwrap();
        assert_eq!(config.upload_timeout_secs, 120);
        assert_eq!(config.remote_timeout_secs, DEFAULT_REMOTE_TIMEOUT_SECS);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let conn = db::open_local_db_in_memory().unwrap();
        let config = CollectionConfig { remote_timeout_secs: 0, ..Default::default() };
        assert!(matches!(save_config(&conn, &config), Err(PlantScopeError::Config(_))));

        let config = CollectionConfig { blob_base_url: "/tmp/blobs".to_string(), ..Default::default() };
        assert!(matches!(save_config(&conn, &config), Err(PlantScopeError::Config(_))));
    }
}
