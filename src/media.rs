// Media upload
// Moves a device-local photo into durable blob storage and hands back a URL
// other devices can fetch.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use crate::constants::{DEFAULT_MEDIA_EXTENSION, FILE_URI_SCHEME, TEMP_FILE_PREFIX};
use crate::error::{PlantScopeError, Result};
use crate::hash;
use crate::model::UserId;

static DURABLE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("valid durable url pattern"));

static UNSAFE_NAME_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid name pattern"));

/// Uploads local media bytes to durable storage.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Returns the durable URL of the stored blob.
    /// Fails with `UploadFailed` when the source can't be read or the write doesn't complete.
    async fn upload(&self, user: &UserId, local_uri: &str, suggested_name: &str) -> Result<String>;
}

/// True when a media reference is already a durable remote URL.
pub fn is_durable_url(uri: &str) -> bool {
    DURABLE_URL_RE.is_match(uri.trim())
}

/// Replace anything outside [A-Za-z0-9._-] so names are safe as path components.
pub fn sanitize_component(name: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS_RE.replace_all(name.trim(), "_").to_string();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        _ => cleaned,
    }
}

/// File name suggested for a plant photo, e.g. "Rosa_canina.jpg"
pub fn suggested_media_name(scientific_name: &str) -> String {
    format!("{}.{}", sanitize_component(scientific_name), DEFAULT_MEDIA_EXTENSION)
}

/// Blob key: {userId}/{timestamp}_{suggestedName}
pub fn blob_key(user: &UserId, timestamp_millis: i64, suggested_name: &str) -> String {
    format!(
        "{}/{}_{}",
        sanitize_component(user.as_str()),
        timestamp_millis,
        sanitize_component(suggested_name)
    )
}

/// Resolve a local media reference (plain path or file:// URI) to a path.
pub fn local_media_path(local_uri: &str) -> PathBuf {
    let trimmed = local_uri.trim();
    PathBuf::from(trimmed.strip_prefix(FILE_URI_SCHEME).unwrap_or(trimmed))
}

/// Blob store backed by a directory. The public URL of a blob is
/// `{base_url}/{key}`; the bytes live at `{root}/{key}`.
pub struct BlobUploader {
    root: PathBuf,
    base_url: String,
}

impl BlobUploader {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL produced by this store back to its on-disk location.
    pub fn blob_path(&self, url: &str) -> Option<PathBuf> {
        let key = url.strip_prefix(&self.base_url)?.trim_start_matches('/');
        Some(self.root.join(key))
    }

    /// Blobs are write-once: a taken key gets a numeric suffix.
    fn unique_key(&self, key: &str) -> Result<String> {
        if !self.root.join(key).exists() {
            return Ok(key.to_string());
        }

        // Only the file name changes; the folder stays the user's
        let (dir, file_name) = match key.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, key),
        };
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file_name, None),
        };

        for i in 1..1000 {
            let name = match ext {
                Some(ext) => format!("{}_{}.{}", stem, i, ext),
                None => format!("{}_{}", stem, i),
            };
            let candidate = match dir {
                Some(dir) => format!("{}/{}", dir, name),
                None => name,
            };
            if !self.root.join(&candidate).exists() {
                return Ok(candidate);
            }
        }

        Err(PlantScopeError::UploadFailed("could not generate unique blob key".to_string()))
    }

    /// Write to a temp file, read it back, compare hashes, then rename into place.
    async fn write_verified(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| PlantScopeError::UploadFailed("blob path has no parent".to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = parent.join(format!("{}{}", TEMP_FILE_PREFIX, file_name));

        let expected = hash::compute_full_hash_from_bytes(bytes);

        tokio::fs::write(&temp_path, bytes).await?;

        match hash::verify_hash(&temp_path, &expected) {
            Ok(true) => {}
            Ok(false) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(PlantScopeError::UploadFailed(format!(
                    "verification failed for {}",
                    dest.display()
                )));
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        }

        if let Err(e) = tokio::fs::rename(&temp_path, dest).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait]
impl MediaUploader for BlobUploader {
    async fn upload(&self, user: &UserId, local_uri: &str, suggested_name: &str) -> Result<String> {
        let source = local_media_path(local_uri);
        let bytes = tokio::fs::read(&source).await.map_err(|e| {
            PlantScopeError::UploadFailed(format!("cannot read {}: {}", source.display(), e))
        })?;

        let key = self.unique_key(&blob_key(user, Utc::now().timestamp_millis(), suggested_name))?;
        let dest = self.root.join(&key);

        self.write_verified(&dest, &bytes).await.map_err(|e| match e {
            PlantScopeError::UploadFailed(_) => e,
            other => PlantScopeError::UploadFailed(other.to_string()),
        })?;

        log::debug!("Uploaded {} ({} bytes) to {}", source.display(), bytes.len(), key);

        Ok(format!("{}/{}", self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_url_detection() {
        assert!(is_durable_url("https://cdn.example/a.jpg"));
        assert!(is_durable_url("HTTP://cdn.example/a.jpg"));
        assert!(!is_durable_url("file:///data/a.jpg"));
        assert!(!is_durable_url("/data/a.jpg"));
        assert!(!is_durable_url("content://media/42"));
    }

    #[test]
    fn test_blob_key_shape() {
        let user = UserId::new("user-1");
        assert_eq!(
            blob_key(&user, 1700000000000, &suggested_media_name("Rosa canina")),
            "user-1/1700000000000_Rosa_canina.jpg"
        );
        // No escaping the user's folder
        assert_eq!(blob_key(&UserId::new("../x"), 1, "a/b.jpg"), ".._x/1_a_b.jpg");
        assert_eq!(sanitize_component(".."), "_");
    }

    #[test]
    fn test_local_media_path_accepts_file_uri() {
        assert_eq!(local_media_path("file:///tmp/a.jpg"), PathBuf::from("/tmp/a.jpg"));
        assert_eq!(local_media_path("/tmp/a.jpg"), PathBuf::from("/tmp/a.jpg"));
    }

    #[tokio::test]
    async fn test_upload_writes_blob_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.jpg");
        std::fs::write(&photo, b"jpeg bytes").unwrap();

        let uploader = BlobUploader::new(dir.path().join("blobs"), "https://blobs.test/plants/");
        let user = UserId::new("alice");
        let url = uploader
            .upload(&user, &format!("file://{}", photo.display()), "Rosa_canina.jpg")
            .await
            .unwrap();

        assert!(url.starts_with("https://blobs.test/plants/alice/"));
        assert!(url.ends_with("_Rosa_canina.jpg"));

        let stored = uploader.blob_path(&url).unwrap();
        assert_eq!(std::fs::read(&stored).unwrap(), b"jpeg bytes");

        // No temp files left behind
        for entry in std::fs::read_dir(stored.parent().unwrap()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with(TEMP_FILE_PREFIX), "leftover temp file {}", name);
        }
    }

    #[test]
    fn test_same_key_twice_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = BlobUploader::new(dir.path(), "https://blobs.test");

        let first = uploader.unique_key("u/1_a.jpg").unwrap();
        std::fs::create_dir_all(dir.path().join("u")).unwrap();
        std::fs::write(dir.path().join(&first), b"x").unwrap();

        assert_eq!(uploader.unique_key("u/1_a.jpg").unwrap(), "u/1_a_1.jpg");
    }

    #[test]
    fn test_renamed_key_stays_in_user_folder() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = BlobUploader::new(dir.path(), "https://blobs.test");
        std::fs::create_dir_all(dir.path().join("john.doe")).unwrap();
        std::fs::write(dir.path().join("john.doe/1_photo"), b"x").unwrap();

        let key = uploader.unique_key("john.doe/1_photo").unwrap();
        assert_eq!(key, "john.doe/1_photo_1");
        assert!(key.starts_with("john.doe/"));
    }

    #[tokio::test]
    async fn test_missing_source_is_upload_failed() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = BlobUploader::new(dir.path(), "https://blobs.test");

        let err = uploader
            .upload(&UserId::new("alice"), "/definitely/not/here.jpg", "x.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, PlantScopeError::UploadFailed(_)));
    }
}
