// Collection mutation API
// Entry points called by screens: view, add, remove, sync. The signed-in
// session is passed explicitly; None means local-only and remote calls are
// skipped rather than attempted.


use std::sync::Arc;

use serde::Serialize;

use crate::error::{PlantScopeError, Result};
use crate::identity::{derive_key, IdentityKey};
use crate::locks::UserLocks;
use crate::media::MediaUploader;
use crate::model::{CollectionView, PlantRecord, UserId, UserSession};
use crate::reconcile::{
    bounded, merge_view, push_document, push_media, sync_local_to_remote, CallLimits,
    DocumentOutcome, MediaOutcome, RemoteTargets, SyncEntry, SyncReport,
};
use crate::store::{LocalStore, RemoteStore};
use crate::view::ViewState;

/// Remote half of an add.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteWrite {
    /// Not signed in, or the remote collection couldn't be read for the
    /// duplicate check. The record is local-only until the next sync.
    Skipped { reason: String },
    Attempted { media: MediaOutcome, document: DocumentOutcome },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddOutcome {
    Added { record: PlantRecord, remote: RemoteWrite },
    /// Expected outcome, not an error. Nothing was written.
    DuplicateRejected { existing: PlantRecord },
}

/// Identifies a record to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub remote_doc_id: Option<String>,
    pub scientific_name: String,
}

impl From<&PlantRecord> for RecordRef {
    fn from(record: &PlantRecord) -> Self {
        Self {
            remote_doc_id: record.remote_doc_id.clone(),
            scientific_name: record.identity.scientific_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteRemoval {
    Deleted,
    /// Signed in, but no matching remote document.
    Absent,
    /// Not signed in.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoveOutcome {
    Removed { local_removed: usize, remote: RemoteRemoval },
    NotFound,
}

pub struct Collection {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    uploader: Arc<dyn MediaUploader>,
    limits: CallLimits,
    locks: UserLocks,
}

fn has_key(record: &PlantRecord, key: &IdentityKey) -> bool {
    record.identity_key().ok().as_ref() == Some(key)
}

impl Collection {
    pub fn new(
        local: LocalStore,
        remote: Arc<dyn RemoteStore>,
        uploader: Arc<dyn MediaUploader>,
        limits: CallLimits,
    ) -> Self {
        Self {
            local,
            remote,
            uploader,
            limits,
            locks: UserLocks::new(),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    fn targets(&self) -> RemoteTargets<'_> {
        RemoteTargets {
            remote: self.remote.as_ref(),
            uploader: self.uploader.as_ref(),
            limits: self.limits,
        }
    }

    async fn load_remote(&self, user: &UserId) -> Result<Vec<PlantRecord>> {
        bounded(
            self.remote.load_remote(user),
            self.limits.remote_timeout,
            PlantScopeError::RemoteUnavailable,
        )
        .await
    }

    /// Remote records for the merged view. None when signed out or unreachable.
    async fn remote_snapshot(&self, session: Option<&UserSession>) -> Option<Vec<PlantRecord>> {
        let session = session?;
        match self.load_remote(&session.user_id).await {
            Ok(records) => Some(records),
            Err(e) => {
                log::warn!("Remote collection for {} unavailable, using local only: {}", session.user_id, e);
                None
            }
        }
    }

    /// Merged view of local and remote. Falls back to local-only when the
    /// remote side is unreachable.
    pub async fn view(&self, session: Option<&UserSession>) -> CollectionView {
        let local = self.local.load_local().await;
        let remote = self.remote_snapshot(session).await.unwrap_or_default();
        merge_view(&local, &remote)
    }

    /// Recompute the view into `state`. Returns false when the result was
    /// dropped because a newer refresh started or the owner closed the state.
    pub async fn refresh(&self, state: &ViewState, session: Option<&UserSession>) -> bool {
        let ticket = state.begin();
        let view = self.view(session).await;
        state.apply(ticket, view)
    }

    /// Add a newly identified plant.
    ///
    /// Fails with `InvalidIdentity` before any write when the scientific name
    /// is empty. A key already present in the merged view gives
    /// `DuplicateRejected`. Otherwise the record is always persisted locally;
    /// remote persistence is attempted when signed in and degrades to
    /// local-only on failure.
    pub async fn add_record(&self, session: Option<&UserSession>, candidate: PlantRecord) -> Result<AddOutcome> {
        let key = candidate.identity_key()?;
        let user = session.map(|s| &s.user_id);
        let _guard = self.locks.acquire(user).await;

        let local = self.local.load_local().await;
        let remote = self.remote_snapshot(session).await;
        let view = merge_view(&local, remote.as_deref().unwrap_or_default());

        if let Some(existing) = view.find(&key) {
            log::info!("Rejected duplicate {}", key);
            return Ok(AddOutcome::DuplicateRejected { existing: existing.clone() });
        }

        let mut record = candidate;
        record.remote_doc_id = None;

        let remote_write = match (user, remote.is_some()) {
            (None, _) => RemoteWrite::Skipped { reason: "not signed in".to_string() },
            (Some(_), false) => RemoteWrite::Skipped { reason: "remote collection unavailable".to_string() },
            (Some(user), true) => {
                let targets = self.targets();
                let media = push_media(&targets, user, &mut record).await;
                let document = push_document(&targets, user, &mut record).await;
                RemoteWrite::Attempted { media, document }
            }
        };

        // Final check inside the local critical section; writers outside this
        // user's lock slot may have added the same key meanwhile.
        let stored = record.clone();
        let check_key = key.clone();
        let inserted = self
            .local
            .update(move |records| {
                if records.iter().any(|r| has_key(r, &check_key)) {
                    false
                } else {
                    records.push(stored);
                    true
                }
            })
            .await?;

        if !inserted {
            if let (Some(user), Some(doc_id)) = (user, record.remote_doc_id.as_deref()) {
                self.delete_remote_doc(user, doc_id).await;
            }
            let existing = self
                .local
                .load_local()
                .await
                .into_iter()
                .find(|r| has_key(r, &key))
                .unwrap_or(record);
            log::info!("Rejected duplicate {} (added concurrently)", key);
            return Ok(AddOutcome::DuplicateRejected { existing });
        }

        log::info!("Added {} to collection", key);
        Ok(AddOutcome::Added { record, remote: remote_write })
    }

    async fn delete_remote_doc(&self, user: &UserId, doc_id: &str) -> RemoteRemoval {
        let delete = self.remote.delete_remote(user, doc_id);
        match bounded(delete, self.limits.remote_timeout, PlantScopeError::RemoteWriteFailed).await {
            Ok(true) => RemoteRemoval::Deleted,
            Ok(false) => RemoteRemoval::Absent,
            Err(e) => {
                log::warn!("Remote delete of {} failed: {}", doc_id, e);
                RemoteRemoval::Failed { reason: e.to_string() }
            }
        }
    }

    /// Delete every remote document sharing `key`.
    async fn delete_remote_by_key(&self, user: &UserId, key: &IdentityKey) -> RemoteRemoval {
        let records = match self.load_remote(user).await {
            Ok(records) => records,
            Err(e) => return RemoteRemoval::Failed { reason: e.to_string() },
        };

        let doc_ids: Vec<String> = records
            .iter()
            .filter(|r| has_key(r, key))
            .filter_map(|r| r.remote_doc_id.clone())
            .collect();

        let mut outcome = RemoteRemoval::Absent;
        for doc_id in doc_ids {
            match self.delete_remote_doc(user, &doc_id).await {
                RemoteRemoval::Deleted => {
                    if !matches!(outcome, RemoteRemoval::Failed { .. }) {
                        outcome = RemoteRemoval::Deleted;
                    }
                }
                failed @ RemoteRemoval::Failed { .. } => outcome = failed,
                _ => {}
            }
        }
        outcome
    }

    /// Remove a record from both stores.
    ///
    /// With a `remote_doc_id`, the remote document and every local copy
    /// carrying that id are deleted. Without one, local copies (and remote
    /// documents) matching the identity key are deleted. `NotFound` when
    /// nothing matched; both stores are then left untouched.
    pub async fn remove_record(&self, session: Option<&UserSession>, target: &RecordRef) -> Result<RemoveOutcome> {
        let doc_id = target.remote_doc_id.as_deref().filter(|id| !id.trim().is_empty());
        let key = match doc_id {
            Some(_) => None,
            None => Some(derive_key(&target.scientific_name)?),
        };

        let user = session.map(|s| &s.user_id);
        let _guard = self.locks.acquire(user).await;

        let remote = match (user, doc_id, &key) {
            (None, _, _) => RemoteRemoval::Skipped,
            (Some(user), Some(doc_id), _) => self.delete_remote_doc(user, doc_id).await,
            (Some(user), None, Some(key)) => self.delete_remote_by_key(user, key).await,
            (Some(_), None, None) => RemoteRemoval::Absent,
        };

        let local_removed = self
            .local
            .update(|records| {
                let before = records.len();
                records.retain(|r| match (doc_id, &key) {
                    (Some(id), _) => r.remote_doc_id.as_deref() != Some(id),
                    (None, Some(key)) => !has_key(r, key),
                    (None, None) => true,
                });
                before - records.len()
            })
            .await?;

        match (local_removed, &remote) {
            (0, RemoteRemoval::Deleted) => {}
            (0, RemoteRemoval::Failed { reason }) => {
                return Err(PlantScopeError::RemoteUnavailable(reason.clone()));
            }
            (0, _) => {
                log::info!("Nothing to remove for {}", target.scientific_name);
                return Ok(RemoveOutcome::NotFound);
            }
            _ => {}
        }

        log::info!(
            "Removed {} ({} local, remote {:?})",
            target.scientific_name,
            local_removed,
            remote
        );
        Ok(RemoveOutcome::Removed { local_removed, remote })
    }

    /// Push local records missing remotely for the signed-in user.
    ///
    /// Passes for the same user never overlap: a second call waits for the
    /// first and then works from freshly loaded state, so it can't create the
    /// same documents again. A remote read failure aborts the pass before any
    /// write.
    pub async fn sync(&self, session: &UserSession) -> Result<SyncReport> {
        let user = &session.user_id;
        let _guard = self.locks.acquire(Some(user)).await;

        let local = self.local.load_local().await;
        let remote = self.load_remote(user).await?;

        let entries = sync_local_to_remote(&self.targets(), user, &local, &remote).await;

        if let Err(e) = self.write_back(&entries, &remote).await {
            // Remote ids are adopted again on the next pass
            log::error!("Failed to record sync results locally for {}: {}", user, e);
        }

        let report = SyncReport { entries };
        log::info!(
            "Sync for {}: {} pushed, {} write failures, {} upload failures",
            user,
            report.created(),
            report.write_failures(),
            report.upload_failures()
        );
        Ok(report)
    }

    /// Sign-in event hook.
    pub async fn on_sign_in(&self, session: &UserSession) -> Result<SyncReport> {
        log::info!("Signed in as {}, reconciling collection", session.user_id);
        self.sync(session).await
    }

    pub fn is_syncing(&self, session: &UserSession) -> bool {
        self.locks.is_busy(Some(&session.user_id))
    }

    /// Record remote ids and URLs on the local copies: from documents created
    /// this pass, and from pre-existing remote documents with the same key.
    async fn write_back(&self, entries: &[SyncEntry], remote: &[PlantRecord]) -> Result<()> {
        let created: Vec<&SyncEntry> = entries.iter().filter(|e| e.is_created()).collect();
        let existing: Vec<(IdentityKey, &PlantRecord)> = remote
            .iter()
            .filter(|r| r.remote_doc_id.is_some())
            .filter_map(|r| r.identity_key().ok().map(|k| (k, r)))
            .collect();

        if created.is_empty() && existing.is_empty() {
            return Ok(());
        }

        self.local
            .update(|records| {
                for record in records.iter_mut() {
                    let key = match record.identity_key() {
                        Ok(key) => key,
                        Err(_) => continue,
                    };

                    if let Some(entry) = created.iter().find(|e| e.key == key) {
                        record.remote_doc_id = entry.record.remote_doc_id.clone();
                        if let MediaOutcome::Uploaded { url } = &entry.media {
                            record.media.remote_url = Some(url.clone());
                        }
                    } else if record.remote_doc_id.is_none() {
                        if let Some((_, remote_record)) = existing.iter().find(|(k, _)| *k == key) {
                            record.remote_doc_id = remote_record.remote_doc_id.clone();
                        }
                    }
                }
            })
            .await
    }
}
