use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::folder_metadata::FolderMetadata;
use super::handler::{FolderMetadataHandler, MetadataError};
use crate::crypto::{KeyChecksum, MetadataKey};
use crate::lock::memory::MemoryLockServer;
use crate::lock::LockToken;

/// In-memory metadata server
///
/// Documents are stored decrypted together with the checksum of the key they
/// were "encrypted" with, which is enough to catch a job reading with the wrong
/// key generation. When a [`MemoryLockServer`] is attached, uploads are only
/// accepted with a token holding the lock of the folder or one of its ancestors.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    inner: Arc<Mutex<MemoryMetadataStoreInner>>,
    locks: Option<MemoryLockServer>,
}

#[derive(Debug)]
struct StoredFolder {
    metadata: FolderMetadata,
    encrypted_with: KeyChecksum,
}

#[derive(Debug, Default)]
struct MemoryMetadataStoreInner {
    folders: BTreeMap<String, StoredFolder>,
    fetch_failures: HashMap<String, MetadataError>,
    upload_failures: HashMap<String, MetadataError>,
    listing_failures: HashMap<String, MetadataError>,
    upload_delays: HashMap<String, Duration>,
    fetches: Vec<String>,
    uploads: Vec<String>,
}

fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .map(|rest| rest.starts_with('/') || ancestor.ends_with('/'))
            .unwrap_or(false)
}

fn is_immediate_child(parent: &str, path: &str) -> bool {
    let parent = parent.trim_end_matches('/');
    match path.strip_prefix(parent).and_then(|r| r.strip_prefix('/')) {
        Some(rest) => !rest.is_empty() && !rest.contains('/'),
        None => false,
    }
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_server(mut self, locks: MemoryLockServer) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Store a document as if it had been uploaded earlier
    pub fn insert(&self, path: impl Into<String>, metadata: FolderMetadata) {
        let encrypted_with = metadata.key_checksum();
        self.inner.lock().folders.insert(
            path.into(),
            StoredFolder {
                metadata,
                encrypted_with,
            },
        );
    }

    pub fn metadata(&self, path: &str) -> Option<FolderMetadata> {
        self.inner
            .lock()
            .folders
            .get(path)
            .map(|f| f.metadata.clone())
    }

    pub fn fail_fetch(&self, path: impl Into<String>, error: MetadataError) {
        self.inner.lock().fetch_failures.insert(path.into(), error);
    }

    pub fn fail_upload(&self, path: impl Into<String>, error: MetadataError) {
        self.inner.lock().upload_failures.insert(path.into(), error);
    }

    pub fn fail_listing(&self, path: impl Into<String>, error: MetadataError) {
        self.inner.lock().listing_failures.insert(path.into(), error);
    }

    /// Hold back the answer to an upload of `path`
    pub fn delay_upload(&self, path: impl Into<String>, delay: Duration) {
        self.inner.lock().upload_delays.insert(path.into(), delay);
    }

    /// Paths fetched so far, in call order
    pub fn fetches(&self) -> Vec<String> {
        self.inner.lock().fetches.clone()
    }

    /// Paths successfully uploaded so far, in completion order
    pub fn uploads(&self) -> Vec<String> {
        self.inner.lock().uploads.clone()
    }
}

#[async_trait]
impl FolderMetadataHandler for MemoryMetadataStore {
    async fn fetch(
        &self,
        path: &str,
        decryption_key: Option<&MetadataKey>,
    ) -> Result<FolderMetadata, MetadataError> {
        let mut inner = self.inner.lock();
        inner.fetches.push(path.to_string());
        if let Some(error) = inner.fetch_failures.get(path) {
            return Err(error.clone());
        }
        let stored = inner
            .folders
            .get(path)
            .ok_or_else(|| MetadataError::NotFound(path.to_string()))?;

        match decryption_key {
            Some(key) if key.checksum() != stored.encrypted_with => Err(
                MetadataError::KeyMismatch(format!("wrong metadata key for {}", path)),
            ),
            None if !stored.metadata.is_top_level() => {
                Err(MetadataError::MissingKey(path.to_string()))
            }
            _ => Ok(stored.metadata.clone()),
        }
    }

    async fn upload(
        &self,
        path: &str,
        metadata: &FolderMetadata,
        token: &LockToken,
    ) -> Result<(), MetadataError> {
        let delay = self.inner.lock().upload_delays.get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(locks) = &self.locks {
            let folders: Vec<String> = self.inner.lock().folders.keys().cloned().collect();
            let held = folders
                .iter()
                .filter(|folder| is_ancestor_or_self(folder, path))
                .any(|folder| locks.holds(folder, token));
            if !held {
                return Err(MetadataError::Rejected {
                    status: 403,
                    message: format!("token does not hold a lock covering {}", path),
                });
            }
        }

        let mut inner = self.inner.lock();
        if let Some(error) = inner.upload_failures.get(path) {
            return Err(error.clone());
        }
        inner.folders.insert(
            path.to_string(),
            StoredFolder {
                metadata: metadata.clone(),
                encrypted_with: metadata.key_checksum(),
            },
        );
        inner.uploads.push(path.to_string());
        Ok(())
    }

    async fn encrypted_subfolders(&self, path: &str) -> Result<Vec<String>, MetadataError> {
        let inner = self.inner.lock();
        if let Some(error) = inner.listing_failures.get(path) {
            return Err(error.clone());
        }
        Ok(inner
            .folders
            .keys()
            .filter(|candidate| is_immediate_child(path, candidate))
            .cloned()
            .collect())
    }
}
