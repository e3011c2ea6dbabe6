use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::provider::{EncryptionStatus, JournalError, SyncJournal, SyncRecordId};

/// In-memory sync journal
#[derive(Debug, Clone, Default)]
pub struct MemorySyncJournal {
    inner: Arc<RwLock<MemorySyncJournalInner>>,
}

#[derive(Debug, Default)]
struct MemorySyncJournalInner {
    /// path -> record id
    paths: HashMap<String, SyncRecordId>,
    /// record id -> encryption status
    statuses: HashMap<SyncRecordId, EncryptionStatus>,
    next_id: u64,
}

impl MemorySyncJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record for `path`, returning the existing id if there is one
    pub fn insert(&self, path: impl Into<String>) -> SyncRecordId {
        let mut inner = self.inner.write();
        let path = path.into();
        if let Some(id) = inner.paths.get(&path) {
            return *id;
        }
        inner.next_id += 1;
        let id = SyncRecordId(inner.next_id);
        inner.paths.insert(path, id);
        inner.statuses.insert(id, EncryptionStatus::default());
        id
    }

    pub fn encryption_status(&self, id: SyncRecordId) -> Option<EncryptionStatus> {
        self.inner.read().statuses.get(&id).copied()
    }
}

#[async_trait]
impl SyncJournal for MemorySyncJournal {
    async fn record_id(&self, path: &str) -> Result<Option<SyncRecordId>, JournalError> {
        Ok(self.inner.read().paths.get(path).copied())
    }

    async fn set_encryption_status(
        &self,
        id: SyncRecordId,
        status: EncryptionStatus,
    ) -> Result<(), JournalError> {
        let mut inner = self.inner.write();
        match inner.statuses.get_mut(&id) {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(JournalError::RecordNotFound(id)),
        }
    }
}
