/**
 * Folder membership jobs.
 *  A [`FolderUsersMetadataJob`] adds or removes a member of an
 *  end-to-end encrypted folder, or re-encrypts it under a new
 *  metadata key. Nested encrypted folders are re-encrypted by
 *  sub-jobs of the same type, all under the root job's lock.
 */
mod context;
mod error;
mod events;
mod folder_users;
mod operation;
mod records;
mod state;
mod sub_jobs;

pub use context::{FolderTarget, JobContext, KeyMaterial};
pub use error::{JobError, STATUS_OK};
pub use events::JobEvent;
pub use folder_users::{FolderUsersMetadataJob, JobReport};
pub use operation::{
    MembershipOperation, OperationKind, SharePermissions, Sharee, ShareeKind, UserData,
};
pub use records::SyncRecordTable;
pub use state::JobState;
