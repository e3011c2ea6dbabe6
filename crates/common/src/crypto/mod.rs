//! Key material handled by the folder users jobs
//!
//! The actual wrapping and encryption of metadata documents is done by the
//! [`FolderMetadataHandler`](crate::metadata::FolderMetadataHandler). This module
//! only provides the values the jobs move around:
//!
//! - **[`Certificate`]**: a user's public encryption certificate (PEM encoded)
//! - **[`MetadataKey`]**: the symmetric key a folder's metadata document is encrypted with
//! - **[`KeyChecksum`]**: the fingerprint of one generation of a metadata key
//!
//! # Key generations
//!
//! Every time the member list of a top-level encrypted folder changes, a new
//! metadata key is generated. Its checksum is appended to the document's checksum
//! set, so that a client holding a stale copy of the document can detect that
//! someone else rotated the key in between.

mod certificate;
mod metadata_key;

pub use certificate::{Certificate, CertificateParseError, CERTIFICATE_PEM_TAG};
pub use metadata_key::{KeyChecksum, MetadataKey, METADATA_KEY_SIZE};
