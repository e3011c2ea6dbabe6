use std::fmt::Debug;

use async_trait::async_trait;

use super::folder_metadata::FolderMetadata;
use crate::crypto::MetadataKey;
use crate::lock::LockToken;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("no metadata for {0}")]
    NotFound(String),
    /// The document was written with a different metadata key generation
    #[error("metadata key does not match: {0}")]
    KeyMismatch(String),
    /// A nested document was fetched without its top-level folder's key
    #[error("no metadata key to decrypt {0}")]
    MissingKey(String),
    /// The server refused the write, e.g. because of a concurrent writer
    #[error("metadata write rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error {status}: {message}")]
    Transport { status: u16, message: String },
    #[error("{0} is not a top-level encrypted folder")]
    NotTopLevel(String),
    #[error("{0} is not a member of the folder")]
    UserNotMember(String),
}

/// Reads and writes encrypted folder metadata on the server
///
/// Implementations own the document encoding and every cryptographic operation:
/// decrypting with the given key (or the account's private key for top-level
/// folders), wrapping the metadata key for each member's certificate and
/// encrypting the document with [`FolderMetadata::metadata_key`] on upload.
#[async_trait]
pub trait FolderMetadataHandler: Send + Sync + Debug {
    /// Fetch and decrypt the metadata of `path`
    ///
    /// # Arguments
    /// * `path` - Remote path of the folder
    /// * `decryption_key` - Key of the current document generation, if known.
    ///    `None` means the implementation unwraps the key itself.
    async fn fetch(
        &self,
        path: &str,
        decryption_key: Option<&MetadataKey>,
    ) -> Result<FolderMetadata, MetadataError>;

    /// Encrypt and upload `metadata` for `path`
    ///
    /// `token` must be the token of the lock held on `path` or one of its ancestors.
    async fn upload(
        &self,
        path: &str,
        metadata: &FolderMetadata,
        token: &LockToken,
    ) -> Result<(), MetadataError>;

    /// Remote paths of the encrypted folders directly below `path`
    async fn encrypted_subfolders(&self, path: &str) -> Result<Vec<String>, MetadataError>;
}
