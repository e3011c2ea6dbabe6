//! Folder metadata documents
//!
//! Every encrypted folder has a metadata document listing who may decrypt it.
//! Top-level encrypted folders carry the member list and the metadata key
//! wrapped for every member's certificate; nested folders are encrypted with
//! their top-level folder's metadata key.
//!
//! ```text
//!  /enc            (top-level: users, key K, checksums {K})
//!   ├── /enc/a     (nested: encrypted with K)
//!   │    └── /enc/a/x  (nested: encrypted with K)
//!   └── /enc/b     (nested: encrypted with K)
//! ```
//!
//! Changing the member list of `/enc` rotates K, so every nested document has
//! to be rewritten with the new key.
//!
//! Reading, decrypting, encrypting and uploading documents is the job of a
//! [`FolderMetadataHandler`]; [`FolderMetadata`] is the decrypted, in-memory view
//! the jobs mutate.

mod folder_metadata;
mod handler;
pub mod memory;

pub use folder_metadata::{FolderMetadata, FolderUser, MetadataVersion};
pub use handler::{FolderMetadataHandler, MetadataError};
