// Reconciliation engine
// Merges the device-local collection with the remote one by identity key, and
// pushes local records the remote side is missing. Identity key equality always
// means "do not create a second record": whichever copy already exists wins and
// fields are never merged across two records.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::error::{PlantScopeError, Result};
use crate::identity::IdentityKey;
use crate::media::{suggested_media_name, MediaUploader};
use crate::model::{CollectionView, PlantRecord, UserId};
use crate::store::RemoteStore;

/// Upper bounds for individual network calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallLimits {
    pub remote_timeout: Duration,
    pub upload_timeout: Duration,
}

/// Remote collaborators for one reconciliation pass.
#[derive(Clone, Copy)]
pub struct RemoteTargets<'a> {
    pub remote: &'a dyn RemoteStore,
    pub uploader: &'a dyn MediaUploader,
    pub limits: CallLimits,
}

/// Run `fut` with a deadline. Expiry is reported through `on_timeout`.
pub async fn bounded<T, F>(
    fut: F,
    limit: Duration,
    on_timeout: fn(String) -> PlantScopeError,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!("timed out after {:?}", limit))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaOutcome {
    /// No local media, or it is already durable.
    NotNeeded,
    Uploaded { url: String },
    /// The local reference is kept and persisted as-is.
    UploadFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Created { doc_id: String },
    /// Local copy is kept; the next sync pass retries.
    RemoteWriteFailed { reason: String },
}

/// What happened to one record during a sync pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEntry {
    pub key: IdentityKey,
    /// The record as sent to the remote store, with `remote_url` and
    /// `remote_doc_id` filled in when those steps succeeded.
    pub record: PlantRecord,
    pub media: MediaOutcome,
    pub document: DocumentOutcome,
}

impl SyncEntry {
    pub fn is_created(&self) -> bool {
        matches!(self.document, DocumentOutcome::Created { .. })
    }
}

/// Outcome list of one sync pass for a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub entries: Vec<SyncEntry>,
}

impl SyncReport {
    pub fn created(&self) -> usize {
        self.entries.iter().filter(|e| e.is_created()).count()
    }

    pub fn write_failures(&self) -> usize {
        self.entries.len() - self.created()
    }

    pub fn upload_failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.media, MediaOutcome::UploadFailed { .. }))
            .count()
    }
}

fn key_or_warn(record: &PlantRecord, side: &str) -> Option<IdentityKey> {
    match record.identity_key() {
        Ok(key) => Some(key),
        Err(e) => {
            log::warn!("Ignoring {} record without identity: {}", side, e);
            None
        }
    }
}

/// Merge local and remote into one view.
///
/// Local records come first in their stored order, then remote-only records in
/// remote order. On a key collision the first occurrence is kept untouched.
pub fn merge_view(local: &[PlantRecord], remote: &[PlantRecord]) -> CollectionView {
    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(local.len() + remote.len());
    let mut merged = Vec::with_capacity(local.len() + remote.len());

    let tagged = local
        .iter()
        .map(|r| (r, "local"))
        .chain(remote.iter().map(|r| (r, "remote")));

    for (record, side) in tagged {
        if let Some(key) = key_or_warn(record, side) {
            if seen.insert(key) {
                merged.push(record.clone());
            }
        }
    }

    CollectionView::from_unique(merged)
}

/// Upload a record's pending local media, filling `remote_url` on success.
pub async fn push_media(targets: &RemoteTargets<'_>, user: &UserId, record: &mut PlantRecord) -> MediaOutcome {
    if !record.media.needs_upload() {
        return MediaOutcome::NotNeeded;
    }

    let local_uri = match record.media.local_uri.clone() {
        Some(uri) => uri,
        None => return MediaOutcome::NotNeeded,
    };
    let name = suggested_media_name(&record.identity.scientific_name);

    let upload = targets.uploader.upload(user, &local_uri, &name);
    match bounded(upload, targets.limits.upload_timeout, PlantScopeError::UploadFailed).await {
        Ok(url) => {
            record.media.remote_url = Some(url.clone());
            MediaOutcome::Uploaded { url }
        }
        Err(e) => {
            log::warn!("Upload of {} failed, keeping local reference: {}", local_uri, e);
            MediaOutcome::UploadFailed { reason: e.to_string() }
        }
    }
}

/// Create the remote document for `record`, filling `remote_doc_id` on success.
pub async fn push_document(targets: &RemoteTargets<'_>, user: &UserId, record: &mut PlantRecord) -> DocumentOutcome {
    record.remote_doc_id = None;

    let create = targets.remote.create_remote(user, record);
    match bounded(create, targets.limits.remote_timeout, PlantScopeError::RemoteWriteFailed).await {
        Ok(doc_id) => {
            record.remote_doc_id = Some(doc_id.clone());
            DocumentOutcome::Created { doc_id }
        }
        Err(e) => {
            log::warn!(
                "Remote write of {} failed: {}",
                record.identity.scientific_name,
                e
            );
            DocumentOutcome::RemoteWriteFailed { reason: e.to_string() }
        }
    }
}

/// Push every local record whose key is absent remotely.
///
/// Records are processed one at a time. A failure on one record never stops
/// the others, and partial progress is never rolled back. Keys created during
/// the pass join the remote key set, so a key is pushed at most once.
pub async fn sync_local_to_remote(
    targets: &RemoteTargets<'_>,
    user: &UserId,
    local: &[PlantRecord],
    remote: &[PlantRecord],
) -> Vec<SyncEntry> {
    let mut remote_keys: HashSet<IdentityKey> = remote
        .iter()
        .filter_map(|r| key_or_warn(r, "remote"))
        .collect();

    let missing: Vec<(IdentityKey, &PlantRecord)> = local
        .iter()
        .filter_map(|r| key_or_warn(r, "local").map(|k| (k, r)))
        .filter(|(k, _)| !remote_keys.contains(k))
        .collect();

    let mut entries = Vec::with_capacity(missing.len());

    for (key, record) in missing {
        if remote_keys.contains(&key) {
            continue;
        }

        let mut pending = record.clone();
        let media = push_media(targets, user, &mut pending).await;
        let document = push_document(targets, user, &mut pending).await;

        if matches!(document, DocumentOutcome::Created { .. }) {
            remote_keys.insert(key.clone());
        }

        entries.push(SyncEntry { key, record: pending, media, document });
    }

    entries
}
