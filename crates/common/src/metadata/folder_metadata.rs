use std::collections::{BTreeMap, BTreeSet};

use super::handler::MetadataError;
use crate::crypto::{Certificate, KeyChecksum, MetadataKey};
use crate::journal::EncryptionStatus;

/// Format generation of a metadata document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataVersion {
    V1_2,
    V2_0,
}

/// A user allowed to decrypt a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderUser {
    pub user_id: String,
    pub certificate: Certificate,
}

/// Decrypted view of a folder's metadata document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMetadata {
    version: MetadataVersion,
    top_level: bool,
    /// user id -> member, empty for nested folders
    users: BTreeMap<String, FolderUser>,
    metadata_key: MetadataKey,
    /// every key generation this document has seen, always containing
    ///  the checksum of `metadata_key`
    key_checksums: BTreeSet<KeyChecksum>,
}

impl FolderMetadata {
    pub fn new_top_level(owner: FolderUser, metadata_key: MetadataKey) -> Self {
        let mut users = BTreeMap::new();
        users.insert(owner.user_id.clone(), owner);
        Self {
            version: MetadataVersion::V2_0,
            top_level: true,
            users,
            key_checksums: BTreeSet::from([metadata_key.checksum()]),
            metadata_key,
        }
    }

    pub fn new_nested(metadata_key: MetadataKey, key_checksums: BTreeSet<KeyChecksum>) -> Self {
        let mut key_checksums = key_checksums;
        key_checksums.insert(metadata_key.checksum());
        Self {
            version: MetadataVersion::V2_0,
            top_level: false,
            users: BTreeMap::new(),
            metadata_key,
            key_checksums,
        }
    }

    /// Mark the document as being in an older format
    pub fn with_version(mut self, version: MetadataVersion) -> Self {
        self.version = version;
        self
    }

    pub fn version(&self) -> MetadataVersion {
        self.version
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    pub fn users(&self) -> impl Iterator<Item = &FolderUser> {
        self.users.values()
    }

    pub fn user(&self, user_id: &str) -> Option<&FolderUser> {
        self.users.get(user_id)
    }

    pub fn metadata_key(&self) -> &MetadataKey {
        &self.metadata_key
    }

    pub fn key_checksum(&self) -> KeyChecksum {
        self.metadata_key.checksum()
    }

    pub fn key_checksums(&self) -> &BTreeSet<KeyChecksum> {
        &self.key_checksums
    }

    /// Add a member, replacing the certificate of an existing one
    pub fn add_user(&mut self, user: FolderUser) -> Result<(), MetadataError> {
        if !self.top_level {
            return Err(MetadataError::NotTopLevel(user.user_id));
        }
        self.users.insert(user.user_id.clone(), user);
        Ok(())
    }

    pub fn remove_user(&mut self, user_id: &str) -> Result<FolderUser, MetadataError> {
        if !self.top_level {
            return Err(MetadataError::NotTopLevel(user_id.to_string()));
        }
        self.users
            .remove(user_id)
            .ok_or_else(|| MetadataError::UserNotMember(user_id.to_string()))
    }

    /// Switch to a new key generation, returning the previous key
    pub fn rotate_key(&mut self, metadata_key: MetadataKey) -> MetadataKey {
        self.key_checksums.insert(metadata_key.checksum());
        std::mem::replace(&mut self.metadata_key, metadata_key)
    }

    /// Re-encrypt a nested document under its top-level folder's new key
    pub fn rekey(&mut self, metadata_key: MetadataKey, key_checksums: BTreeSet<KeyChecksum>) {
        self.key_checksums = key_checksums;
        self.rotate_key(metadata_key);
    }

    /// Documents are always written in the current format
    pub fn upgrade(&mut self) {
        self.version = MetadataVersion::V2_0;
    }

    pub fn encryption_status(&self) -> EncryptionStatus {
        match self.version {
            MetadataVersion::V1_2 => EncryptionStatus::Encrypted,
            MetadataVersion::V2_0 => EncryptionStatus::EncryptedMigratedV2_0,
        }
    }
}
