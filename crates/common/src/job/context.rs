use std::collections::BTreeSet;
use std::sync::Arc;

use crate::account::Account;
use crate::certificates::CertificateResolver;
use crate::config::JobConfig;
use crate::crypto::{KeyChecksum, MetadataKey};
use crate::journal::SyncJournal;
use crate::lock::FolderLockController;
use crate::metadata::FolderMetadataHandler;

/// Everything a job talks to, shared by a job and all of its sub-jobs
#[derive(Debug, Clone)]
pub struct JobContext {
    pub account: Account,
    pub journal: Arc<dyn SyncJournal>,
    pub locks: FolderLockController,
    pub certificates: CertificateResolver,
    pub metadata: Arc<dyn FolderMetadataHandler>,
    pub config: JobConfig,
}

/// The folder a job works on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTarget {
    /// Remote path of the sync folder, where the lock is taken
    pub root: String,
    /// Folder below `root` whose metadata is rewritten
    pub nested: Option<String>,
}

impl FolderTarget {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            nested: None,
        }
    }

    pub fn metadata_path(&self) -> &str {
        self.nested.as_deref().unwrap_or(&self.root)
    }

    pub fn is_nested(&self) -> bool {
        self.nested.is_some()
    }
}

/// Metadata keys handed from a job to its sub-jobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Key the current document generation was written with
    pub decryption: Option<MetadataKey>,
    /// Key the next generation is written with
    pub encryption: Option<MetadataKey>,
    /// Every key generation of the top-level folder
    pub checksums: BTreeSet<KeyChecksum>,
}
