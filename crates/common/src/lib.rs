/**
 * The account jobs act on behalf of.
 */
pub mod account;
/**
 * Resolving the certificates of users being
 *  added to a folder.
 *  Keychain first, then the server's directory.
 */
pub mod certificates;
/**
 * Job tunables, loadable from TOML.
 */
pub mod config;
/**
 * Certificates, metadata keys and key checksums.
 */
pub mod crypto;
/**
 * Folder membership jobs.
 *  Locks a folder, rewrites its metadata and
 *  re-encrypts every encrypted folder below it.
 */
pub mod job;
/**
 * The client's sync journal, as far as the
 *  jobs need it.
 */
pub mod journal;
/**
 * Server-side folder locks.
 */
pub mod lock;
/**
 * Encrypted folder metadata: the plaintext model
 *  and the interface to the server holding it.
 */
pub mod metadata;
/**
 * In-process harness wiring all the in-memory
 *  collaborators together.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::account::Account;
    pub use crate::config::JobConfig;
    pub use crate::crypto::{Certificate, KeyChecksum, MetadataKey};
    pub use crate::job::{
        FolderUsersMetadataJob, JobContext, JobError, JobEvent, JobReport, JobState,
        MembershipOperation, SharePermissions, Sharee, UserData,
    };
    pub use crate::journal::{EncryptionStatus, SyncJournal, SyncRecordId};
    pub use crate::lock::{FolderLockController, LockToken};
    pub use crate::metadata::{FolderMetadata, FolderMetadataHandler};
}
