// Collection data model

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::{derive_key, IdentityKey};
use crate::media::is_durable_url;

/// Taxonomy of an identified plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantIdentity {
    pub scientific_name: String,
    #[serde(default)]
    pub common_names: Vec<String>,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub genus: String,
}

/// Photo references. `local_uri` is set before upload, `remote_url` after.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantMedia {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl PlantMedia {
    /// Best reference to display or persist: the durable URL when we have one.
    pub fn best_reference(&self) -> Option<&str> {
        self.remote_url.as_deref().or(self.local_uri.as_deref())
    }

    /// True when there is local media that still has to be uploaded.
    pub fn needs_upload(&self) -> bool {
        match (&self.local_uri, &self.remote_url) {
            (Some(local), None) => !is_durable_url(local),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncyclopediaSummary {
    pub title: String,
    #[serde(default)]
    pub extract: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// One identified plant instance.
/// Mutable only via full replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantRecord {
    pub identity: PlantIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub media: PlantMedia,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encyclopedia: Option<EncyclopediaSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_doc_id: Option<String>,
}

impl PlantRecord {
    /// Minimal record with just a scientific name.
    pub fn new(scientific_name: impl Into<String>) -> Self {
        Self {
            identity: PlantIdentity {
                scientific_name: scientific_name.into(),
                common_names: Vec::new(),
                family: String::new(),
                genus: String::new(),
            },
            confidence_score: None,
            media: PlantMedia::default(),
            encyclopedia: None,
            remote_doc_id: None,
        }
    }

    pub fn identity_key(&self) -> Result<IdentityKey> {
        derive_key(&self.identity.scientific_name)
    }

    /// First common name, falling back to the scientific name.
    pub fn display_name(&self) -> &str {
        self.identity
            .common_names
            .first()
            .map(String::as_str)
            .unwrap_or(&self.identity.scientific_name)
    }

    pub fn is_local_only(&self) -> bool {
        self.remote_doc_id.is_none()
    }
}

/// Merged, de-duplicated, display-ordered collection. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionView {
    records: Vec<PlantRecord>,
}

impl CollectionView {
    /// Caller guarantees keys are unique; only the reconciliation engine builds views.
    pub(crate) fn from_unique(records: Vec<PlantRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[PlantRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PlantRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlantRecord> {
        self.records.iter()
    }

    pub fn find(&self, key: &IdentityKey) -> Option<&PlantRecord> {
        self.records
            .iter()
            .find(|r| r.identity_key().ok().as_ref() == Some(key))
    }

    pub fn contains_key(&self, key: &IdentityKey) -> bool {
        self.find(key).is_some()
    }

    pub fn keys(&self) -> Vec<IdentityKey> {
        self.records
            .iter()
            .filter_map(|r| r.identity_key().ok())
            .collect()
    }
}

impl<'a> IntoIterator for &'a CollectionView {
    type Item = &'a PlantRecord;
    type IntoIter = std::slice::Iter<'a, PlantRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Authenticated user id addressing the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed-in session passed explicitly into every collection call.
/// `None` at a call site means local-only mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: UserId,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: UserId::new(user_id) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let mut record = PlantRecord::new("Rosa canina");
        record.identity.common_names = vec!["Dog rose".to_string()];
        record.media.local_uri = Some("/photos/rose.jpg".to_string());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["identity"]["scientificName"], "Rosa canina");
        assert_eq!(json["media"]["localUri"], "/photos/rose.jpg");
        assert!(json.get("remoteDocId").is_none());

        let back: PlantRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_needs_upload() {
        let mut media = PlantMedia::default();
        assert!(!media.needs_upload());

        media.local_uri = Some("file:///tmp/a.jpg".to_string());
        assert!(media.needs_upload());

        media.local_uri = Some("https://cdn.example/a.jpg".to_string());
        assert!(!media.needs_upload());

        media.local_uri = Some("/tmp/a.jpg".to_string());
        media.remote_url = Some("https://cdn.example/a.jpg".to_string());
        assert!(!media.needs_upload());
        assert_eq!(media.best_reference(), Some("https://cdn.example/a.jpg"));
    }

    #[test]
    fn test_display_name_prefers_common_name() {
        let mut record = PlantRecord::new("Quercus robur");
        assert_eq!(record.display_name(), "Quercus robur");
        record.identity.common_names.push("English oak".to_string());
        assert_eq!(record.display_name(), "English oak");
    }
}
