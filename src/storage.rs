//! Object storage interface and the persisted-artifact layout.
//!
//! The pipeline reads videos from an [`ObjectStore`] and writes subtitle
//! artifacts either back to the store (`upload` mode) or under a local
//! storage root served by the HTTP boundary. Artifacts are append-only:
//! created once, read back on resume, never edited in place.

use crate::error::{Result, VidscribeError};
use crate::urls::{clean_filename, strip_extension};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read/write access to buckets of keyed objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every key under `prefix`.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Download `key` into the local file at `dest`.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<()>;

    /// Write `body` at `key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()>;
}

/// Filesystem-backed store: `root/bucket/key`. Used directly in
/// deployments that mount storage locally, and by tests.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let bucket_root = self.root.join(bucket);
        let start = bucket_root.join(prefix);
        let mut keys = Vec::new();
        let mut stack = vec![start];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| VidscribeError::Storage(format!("listing failed: {e}")))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&bucket_root) {
                    keys.push(rel.to_string_lossy().into_owned());
                }
            }
        }

        keys.sort();
        debug!("Listed {} keys under {}/{}", keys.len(), bucket, prefix);
        Ok(keys)
    }

    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let src = self.object_path(bucket, key);
        tokio::fs::copy(&src, dest).await.map_err(|e| {
            VidscribeError::Storage(format!("download of {bucket}/{key} failed: {e}"))
        })?;
        info!("Downloaded {}/{} to {}", bucket, key, dest.display());
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        let dest = self.object_path(bucket, key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, body)
            .await
            .map_err(|e| VidscribeError::Storage(format!("put of {bucket}/{key} failed: {e}")))?;
        info!("Stored {}/{} ({} bytes)", bucket, key, body.len());
        Ok(())
    }
}

/// Where one video's persisted artifacts live.
///
/// The directory is the raw extension-less key; the filename is the
/// parenthesis-stripped base. The same relative paths feed the resume
/// probes and the signed-URL issuer, so a probe can never miss a write.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
    base_key: String,
    filename_base: String,
}

impl ArtifactLayout {
    pub fn for_key(storage_root: &Path, key: &str) -> Self {
        let base_key = strip_extension(key).to_string();
        let file_name = base_key.rsplit('/').next().unwrap_or(&base_key);
        Self {
            root: storage_root.to_path_buf(),
            filename_base: clean_filename(file_name),
            base_key,
        }
    }

    pub fn base_key(&self) -> &str {
        &self.base_key
    }

    pub fn filename_base(&self) -> &str {
        &self.filename_base
    }

    fn file_name(&self, suffix: &str) -> String {
        format!("{}{}", self.filename_base, suffix)
    }

    /// Storage-relative path of an artifact, as used in signed URLs.
    pub fn relative(&self, suffix: &str) -> String {
        format!("{}/{}", self.base_key, self.file_name(suffix))
    }

    /// Absolute on-disk path of an artifact.
    pub fn path(&self, suffix: &str) -> PathBuf {
        self.root.join(&self.base_key).join(self.file_name(suffix))
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.path(".txt")
    }

    /// Subtitle path for the source track (`lang` = None) or a translation.
    pub fn subtitle_path(&self, lang: Option<&str>) -> PathBuf {
        match lang {
            Some(lang) => self.path(&format!("_{lang}.vtt")),
            None => self.path(".vtt"),
        }
    }

    pub fn subtitle_relative(&self, lang: Option<&str>) -> String {
        match lang {
            Some(lang) => self.relative(&format!("_{lang}.vtt")),
            None => self.relative(".vtt"),
        }
    }

    /// Write an artifact, creating the directory on first use.
    pub fn write(&self, suffix: &str, content: &str) -> Result<PathBuf> {
        let path = self.path(suffix);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        info!("Stored artifact at {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ArtifactLayout::for_key(Path::new("/srv/storage"), "course/lesson(1) intro.mp4");
        assert_eq!(layout.base_key(), "course/lesson(1) intro");
        assert_eq!(layout.filename_base(), "lesson1 intro");
        assert_eq!(
            layout.subtitle_path(None),
            PathBuf::from("/srv/storage/course/lesson(1) intro/lesson1 intro.vtt")
        );
        assert_eq!(
            layout.subtitle_path(Some("de")),
            PathBuf::from("/srv/storage/course/lesson(1) intro/lesson1 intro_de.vtt")
        );
        assert_eq!(
            layout.subtitle_relative(None),
            "course/lesson(1) intro/lesson1 intro.vtt"
        );
        assert_eq!(
            layout.transcript_path(),
            PathBuf::from("/srv/storage/course/lesson(1) intro/lesson1 intro.txt")
        );
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store.put("media", "a/b.mp4", b"video").await.unwrap();
        store.put("media", "a/c.txt", b"notes").await.unwrap();

        let keys = store.list_keys("media", "a").await.unwrap();
        assert_eq!(keys, vec!["a/b.mp4".to_string(), "a/c.txt".to_string()]);

        let dest = dir.path().join("out.mp4");
        store.download("media", "a/b.mp4", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_fs_store_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let dest = dir.path().join("out.bin");
        assert!(store.download("media", "missing", &dest).await.is_err());
    }
}
