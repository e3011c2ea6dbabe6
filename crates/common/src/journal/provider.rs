use std::fmt::{self, Debug};

use async_trait::async_trait;

/// Identifier of a record in the sync journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncRecordId(pub u64);

impl fmt::Display for SyncRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Encryption state of a synced folder as tracked by the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncryptionStatus {
    #[default]
    NotEncrypted,
    /// Encrypted with a pre-2.0 metadata document
    Encrypted,
    /// Encrypted with a 2.0 metadata document
    EncryptedMigratedV2_0,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    #[error("record not found: {0}")]
    RecordNotFound(SyncRecordId),
    #[error("journal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait SyncJournal: Send + Sync + Debug {
    /// Look up the record id for a remote path
    ///
    /// # Returns
    /// * `Ok(None)` - The path is not known to the journal
    async fn record_id(&self, path: &str) -> Result<Option<SyncRecordId>, JournalError>;

    /// Mark a record's encryption status
    ///
    /// Should fail with `JournalError::RecordNotFound` for unknown ids.
    async fn set_encryption_status(
        &self,
        id: SyncRecordId,
        status: EncryptionStatus,
    ) -> Result<(), JournalError>;
}
