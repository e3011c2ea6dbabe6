use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::context::{FolderTarget, JobContext, KeyMaterial};
use super::error::{JobError, STATUS_OK};
use super::events::{EventEmitter, JobEvent};
use super::operation::{MembershipOperation, UserData};
use super::records::SyncRecordTable;
use super::state::JobState;
use super::sub_jobs::SubJobSet;
use crate::crypto::{Certificate, KeyChecksum, MetadataKey};
use crate::journal::{EncryptionStatus, SyncRecordId};
use crate::lock::LockToken;
use crate::metadata::FolderUser;

/// Outcome of a finished job
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Metadata path the job worked on
    pub path: String,
    pub result: Result<(), JobError>,
    /// Paths whose metadata was rewritten by this job and its sub-jobs
    pub records: BTreeMap<String, SyncRecordId>,
    /// Key material after the job ran
    pub keys: KeyMaterial,
    pub encryption_status: EncryptionStatus,
}

impl JobReport {
    pub(crate) fn failed(path: String, error: JobError) -> Self {
        Self {
            path,
            result: Err(error),
            records: BTreeMap::new(),
            keys: KeyMaterial::default(),
            encryption_status: EncryptionStatus::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn status_code(&self) -> u16 {
        match &self.result {
            Ok(()) => STATUS_OK,
            Err(error) => error.status_code(),
        }
    }

    pub fn message(&self) -> String {
        match &self.result {
            Ok(()) => String::new(),
            Err(error) => error.to_string(),
        }
    }
}

/// Changes the member list of an end-to-end encrypted folder
///
/// A job locks the sync folder it is given, rewrites the folder's metadata for
/// the requested [`MembershipOperation`] and then re-encrypts every encrypted
/// folder below it under the new metadata key. Each nested folder is handled by
/// a `ReEncrypt` sub-job of the same type which shares the parent's lock, so
/// the whole tree is written under a single lock.
///
/// Configure the job with the setters, then consume it with [`start`](Self::start).
///
/// ```ignore
/// let operation = MembershipOperation::Add(UserData::new(Sharee::user("bob"), SharePermissions::READ));
/// let mut job = FolderUsersMetadataJob::new(context, "/enc", operation);
/// let events = job.subscribe();
/// let report = job.start(false).await;
/// ```
pub struct FolderUsersMetadataJob {
    id: Uuid,
    context: JobContext,
    target: FolderTarget,
    operation: MembershipOperation,
    certificate: Option<Certificate>,
    folder_token: Option<LockToken>,
    keys: KeyMaterial,
    records: SyncRecordTable,
    events: EventEmitter,
    sub_jobs: Option<SubJobSet>,
    state: JobState,
    depth: usize,
    keep_lock: bool,
    encryption_status: EncryptionStatus,
}

impl FolderUsersMetadataJob {
    pub fn new(
        context: JobContext,
        root: impl Into<String>,
        operation: MembershipOperation,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            target: FolderTarget::new(root),
            operation,
            certificate: None,
            folder_token: None,
            keys: KeyMaterial::default(),
            records: SyncRecordTable::new(),
            events: EventEmitter::default(),
            sub_jobs: None,
            state: JobState::Created,
            depth: 0,
            keep_lock: false,
            encryption_status: EncryptionStatus::default(),
        }
    }

    /// Rewrite the metadata of `path`, a folder below the root, instead of the root's
    pub fn with_nested_path(mut self, path: impl Into<String>) -> Self {
        self.target.nested = Some(path.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Path of the folder whose metadata is rewritten
    pub fn path(&self) -> &str {
        self.target.metadata_path()
    }

    pub fn target(&self) -> &FolderTarget {
        &self.target
    }

    pub fn operation(&self) -> &MembershipOperation {
        &self.operation
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.operation.user_data()
    }

    pub fn folder_token(&self) -> Option<&LockToken> {
        self.folder_token.as_ref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn encryption_status(&self) -> EncryptionStatus {
        self.encryption_status
    }

    /// Replace the user an `Add` or `Remove` job acts on
    pub fn set_user_data(&mut self, user_data: UserData) -> Result<(), JobError> {
        match &mut self.operation {
            MembershipOperation::Add(current) | MembershipOperation::Remove(current) => {
                *current = user_data;
                Ok(())
            }
            MembershipOperation::ReEncrypt => Err(JobError::InvalidRequest(
                "re-encryption jobs do not carry user data".to_string(),
            )),
        }
    }

    /// Use `certificate` for the user being added instead of resolving it
    pub fn set_certificate(&mut self, certificate: Certificate) -> Result<(), JobError> {
        match &self.certificate {
            Some(current) if *current != certificate => Err(JobError::InvalidRequest(
                "certificate is already set".to_string(),
            )),
            _ => {
                self.certificate = Some(certificate);
                Ok(())
            }
        }
    }

    /// Work under a lock the caller already holds on the root
    pub fn set_folder_token(&mut self, token: LockToken) -> Result<(), JobError> {
        match &self.folder_token {
            Some(current) if *current != token => Err(JobError::InvalidRequest(
                "folder token is already set".to_string(),
            )),
            _ => {
                self.folder_token = Some(token);
                Ok(())
            }
        }
    }

    pub fn set_metadata_key_for_encryption(&mut self, key: MetadataKey) {
        self.keys.encryption = Some(key);
    }

    pub fn set_metadata_key_for_decryption(&mut self, key: MetadataKey) {
        self.keys.decryption = Some(key);
    }

    /// Key generations the fetched document may have been written with
    ///
    /// An empty set disables the check.
    pub fn set_key_checksums(&mut self, checksums: BTreeSet<KeyChecksum>) {
        self.keys.checksums = checksums;
    }

    /// Records already known for paths this job is going to rewrite
    pub fn set_sub_job_records(&mut self, records: BTreeMap<String, SyncRecordId>) {
        self.records.merge(&records);
    }

    pub fn subscribe(&mut self) -> flume::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Run the job to completion
    ///
    /// # Arguments
    /// * `keep_lock` - Leave the folder locked when done. Sub-jobs always keep
    ///    the lock since it belongs to their root job.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future aborts every running sub-job. The lock is
    /// not given back in that case and stays held until the server times it
    /// out. Metadata already uploaded is not rolled back.
    pub fn start(mut self, keep_lock: bool) -> BoxFuture<'static, JobReport> {
        self.keep_lock = keep_lock;
        Box::pin(self.run())
    }

    async fn run(mut self) -> JobReport {
        tracing::info!(
            "Starting {} job {} for {} (depth {})",
            self.operation.kind(),
            self.id,
            self.path(),
            self.depth
        );

        let mut failure: Option<JobError> = None;
        while !self.state.is_finished() {
            let next = self.step(&mut failure).await;
            if let Err(error) = self.transition(next) {
                tracing::error!("Job {} stopped: {}", self.id, error);
                failure.get_or_insert(error);
                self.halt().await;
            }
        }

        self.finish(failure).await
    }

    /// Do the work of the current state and pick the next one
    async fn step(&mut self, failure: &mut Option<JobError>) -> JobState {
        match self.state {
            JobState::Created => {
                if let Err(error) = self.validate() {
                    *failure = Some(error);
                    return JobState::Finished { success: false };
                }
                match self.folder_token {
                    Some(_) => self.state_after_lock(),
                    None => JobState::AcquiringLock,
                }
            }
            JobState::AcquiringLock => match self.acquire_lock().await {
                Ok(()) => self.state_after_lock(),
                Err(error) => {
                    *failure = Some(error);
                    JobState::Finished { success: false }
                }
            },
            JobState::ResolvingCertificate => next_or_abort(
                self.resolve_certificate().await,
                JobState::MutatingMetadata,
                failure,
            ),
            JobState::MutatingMetadata => next_or_abort(
                self.mutate_metadata().await,
                JobState::DiscoveringDescendants,
                failure,
            ),
            JobState::DiscoveringDescendants => match self.discover_descendants().await {
                Ok(0) => JobState::Unlocking,
                Ok(_) => JobState::AwaitingSubJobs,
                Err(error) => {
                    *failure = Some(error);
                    JobState::Aborting
                }
            },
            JobState::AwaitingSubJobs => {
                if let Err(error) = self.await_sub_jobs().await {
                    *failure = Some(error);
                }
                JobState::Unlocking
            }
            JobState::Unlocking => {
                self.release_lock().await;
                JobState::Finished {
                    success: failure.is_none(),
                }
            }
            JobState::Aborting => {
                self.release_lock().await;
                JobState::Finished { success: false }
            }
            JobState::Finished { .. } => self.state,
        }
    }

    /// Reject requests that cannot succeed before anything is locked
    fn validate(&self) -> Result<(), JobError> {
        let Some(nested) = &self.target.nested else {
            return Ok(());
        };
        if self.operation.changes_members() {
            return Err(JobError::InvalidRequest(format!(
                "members of {} are managed on its top-level folder {}",
                nested, self.target.root
            )));
        }
        if self.keys.decryption.is_none() {
            return Err(JobError::InvalidRequest(format!(
                "no metadata key to decrypt {} with",
                nested
            )));
        }
        Ok(())
    }

    fn state_after_lock(&self) -> JobState {
        match self.operation {
            MembershipOperation::Add(_) => JobState::ResolvingCertificate,
            _ => JobState::MutatingMetadata,
        }
    }

    fn transition(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Job {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.events.emit(JobEvent::StateChanged {
            path: self.path().to_string(),
            state: next,
        });
        Ok(())
    }

    /// Stop after a rejected transition
    async fn halt(&mut self) {
        self.release_lock().await;
        self.state = JobState::Finished { success: false };
        self.events.emit(JobEvent::StateChanged {
            path: self.path().to_string(),
            state: self.state,
        });
    }

    async fn acquire_lock(&mut self) -> Result<(), JobError> {
        let token = self
            .context
            .locks
            .acquire(&self.target.root)
            .await
            .map_err(JobError::from_lock)?;
        tracing::debug!("Job {} locked {}", self.id, self.target.root);
        self.folder_token = Some(token);
        Ok(())
    }

    async fn resolve_certificate(&mut self) -> Result<(), JobError> {
        let user_id = match self.operation.user_data() {
            Some(user_data) => user_data.user_id().to_string(),
            None => {
                return Err(JobError::InvalidRequest(
                    "no user to resolve a certificate for".to_string(),
                ))
            }
        };

        let certificate = match &self.certificate {
            Some(certificate) => certificate.clone(),
            None => {
                let certificate = self
                    .context
                    .certificates
                    .resolve(&user_id)
                    .await
                    .map_err(|e| JobError::from_certificate(&user_id, e))?;
                self.certificate = Some(certificate.clone());
                certificate
            }
        };

        self.events.emit(JobEvent::CertificateReady {
            user_id,
            fingerprint: certificate.fingerprint(),
        });
        Ok(())
    }

    async fn mutate_metadata(&mut self) -> Result<(), JobError> {
        let path = self.path().to_string();
        let token = self.folder_token.clone().ok_or_else(|| {
            JobError::InvalidRequest(format!("no lock held for {}", self.target.root))
        })?;

        let mut metadata = self
            .context
            .metadata
            .fetch(&path, self.keys.decryption.as_ref())
            .await
            .map_err(|e| JobError::from_metadata(&path, e))?;

        let checksum = metadata.key_checksum();
        if !self.keys.checksums.is_empty() && !self.keys.checksums.contains(&checksum) {
            return Err(JobError::StaleMetadataGeneration {
                path,
                reason: format!("key generation {} is not known", checksum),
            });
        }

        let previous_key = metadata.metadata_key().clone();
        match &self.operation {
            MembershipOperation::Add(user_data) => {
                let certificate = self.certificate.clone().ok_or_else(|| {
                    JobError::InvalidRequest(format!("no certificate for {}", user_data.user_id()))
                })?;
                metadata
                    .add_user(FolderUser {
                        user_id: user_data.user_id().to_string(),
                        certificate,
                    })
                    .map_err(|e| JobError::from_metadata(&path, e))?;
                metadata.rotate_key(self.next_key());
            }
            MembershipOperation::Remove(user_data) => {
                if user_data.user_id() == self.context.account.user_id {
                    return Err(JobError::InvalidRequest(format!(
                        "{} cannot remove itself from {}",
                        self.context.account.display_name(),
                        path
                    )));
                }
                metadata
                    .remove_user(user_data.user_id())
                    .map_err(|e| JobError::from_metadata(&path, e))?;
                metadata.rotate_key(self.next_key());
            }
            MembershipOperation::ReEncrypt if metadata.is_top_level() => {
                metadata.rotate_key(self.next_key());
            }
            MembershipOperation::ReEncrypt => {
                let key = self.keys.encryption.clone().ok_or_else(|| {
                    JobError::InvalidRequest(format!(
                        "no metadata key to re-encrypt {} with",
                        path
                    ))
                })?;
                metadata.rekey(key, self.keys.checksums.clone());
            }
        }
        metadata.upgrade();

        self.context
            .metadata
            .upload(&path, &metadata, &token)
            .await
            .map_err(|e| JobError::from_metadata(&path, e))?;
        tracing::info!("Job {} wrote metadata for {}", self.id, path);

        self.keys = KeyMaterial {
            decryption: Some(previous_key),
            encryption: Some(metadata.metadata_key().clone()),
            checksums: metadata.key_checksums().clone(),
        };
        self.encryption_status = metadata.encryption_status();
        self.record_path(&path).await;
        Ok(())
    }

    fn next_key(&self) -> MetadataKey {
        self.keys
            .encryption
            .clone()
            .unwrap_or_else(MetadataKey::generate)
    }

    /// Remember the journal record of a rewritten path
    async fn record_path(&self, path: &str) {
        if self.records.get(path).is_some() {
            return;
        }
        match self.context.journal.record_id(path).await {
            Ok(Some(id)) => {
                self.records.insert(path, id);
            }
            Ok(None) => tracing::debug!("No sync record for {}", path),
            Err(e) => tracing::warn!("Failed to look up sync record for {}: {}", path, e),
        }
    }

    /// Start a re-encryption sub-job for every encrypted folder below ours
    ///
    /// Returns how many sub-jobs were started.
    async fn discover_descendants(&mut self) -> Result<usize, JobError> {
        let path = self.path().to_string();
        let children = self
            .context
            .metadata
            .encrypted_subfolders(&path)
            .await
            .map_err(|e| JobError::from_metadata(&path, e))?;
        if children.is_empty() {
            return Ok(0);
        }

        let max_depth = self.context.config.max_depth;
        if self.depth + 1 > max_depth {
            return Err(JobError::InvalidRequest(format!(
                "encrypted folders below {} are nested deeper than {} levels",
                path, max_depth
            )));
        }

        tracing::info!(
            "Job {} re-encrypting {} folders below {}",
            self.id,
            children.len(),
            path
        );

        let permits = Arc::new(Semaphore::new(self.context.config.max_parallel_sub_jobs));
        let mut sub_jobs = SubJobSet::new();
        for child_path in children {
            let child = self.sub_job(&child_path);
            let permits = permits.clone();
            let parent_records = self.records.clone();
            sub_jobs.spawn(child_path, async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let report = child.start(true).await;
                if report.is_success() {
                    parent_records.merge(&report.records);
                }
                report
            });
        }

        let count = sub_jobs.len();
        self.sub_jobs = Some(sub_jobs);
        Ok(count)
    }

    fn sub_job(&self, path: &str) -> FolderUsersMetadataJob {
        let mut child = FolderUsersMetadataJob::new(
            self.context.clone(),
            self.target.root.clone(),
            MembershipOperation::ReEncrypt,
        )
        .with_nested_path(path);
        child.depth = self.depth + 1;
        child.folder_token = self.folder_token.clone();
        child.keys = self.keys.clone();
        child.records = SyncRecordTable::from_map(self.records.subset_below(path));
        child
    }

    async fn await_sub_jobs(&mut self) -> Result<(), JobError> {
        let Some(mut sub_jobs) = self.sub_jobs.take() else {
            return Ok(());
        };

        let reports = sub_jobs.join_all().await;
        let failed = reports.iter().filter(|report| !report.is_success()).count();
        if failed > 0 {
            tracing::warn!(
                "Job {}: {} of {} sub-jobs failed",
                self.id,
                failed,
                reports.len()
            );
        }

        // reports are in spawn order, so the first failure is deterministic
        match reports.into_iter().find(|report| !report.is_success()) {
            Some(JobReport {
                path,
                result: Err(error),
                ..
            }) => Err(JobError::SubJobFailed {
                path,
                error: Box::new(error),
            }),
            _ => Ok(()),
        }
    }

    async fn release_lock(&mut self) {
        if self.keep_lock {
            tracing::debug!("Job {} keeps the lock on {}", self.id, self.target.root);
            return;
        }
        let Some(token) = self.folder_token.clone() else {
            return;
        };

        match self.context.locks.release(&self.target.root, &token).await {
            Ok(()) => {
                self.folder_token = None;
                tracing::debug!("Job {} unlocked {}", self.id, self.target.root);
                self.events.emit(JobEvent::FolderUnlocked {
                    path: self.target.root.clone(),
                });
            }
            Err(e) => tracing::warn!(
                "Failed to unlock {}, the server lock will expire: {}",
                self.target.root,
                e
            ),
        }
    }

    /// Mark every rewritten folder of the tree in the sync journal
    async fn update_journal(&self) {
        for (path, id) in self.records.snapshot() {
            if let Err(e) = self
                .context
                .journal
                .set_encryption_status(id, self.encryption_status)
                .await
            {
                tracing::warn!("Failed to update sync record {} for {}: {}", id, path, e);
            }
        }
    }

    async fn finish(self, failure: Option<JobError>) -> JobReport {
        let result = match failure {
            Some(error) => Err(error),
            None => Ok(()),
        };

        if result.is_ok() && self.depth == 0 {
            self.update_journal().await;
        }

        let report = JobReport {
            path: self.path().to_string(),
            result,
            records: self.records.snapshot(),
            keys: self.keys.clone(),
            encryption_status: self.encryption_status,
        };

        match &report.result {
            Ok(()) => tracing::info!("Job {} for {} finished", self.id, report.path),
            Err(e) => tracing::warn!(
                "Job {} for {} failed ({}): {}",
                self.id,
                report.path,
                e.status_code(),
                e
            ),
        }

        self.events.emit(JobEvent::Finished {
            path: report.path.clone(),
            code: report.status_code(),
            message: report.message(),
        });
        report
    }
}

fn next_or_abort(
    result: Result<(), JobError>,
    next: JobState,
    failure: &mut Option<JobError>,
) -> JobState {
    match result {
        Ok(()) => next,
        Err(error) => {
            *failure = Some(error);
            JobState::Aborting
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::job::operation::{SharePermissions, Sharee};
    use crate::testkit::TestEnv;

    #[tokio::test]
    async fn test_state_sequence_for_add() {
        let env = TestEnv::new();
        env.create_top_level("/enc");
        env.add_keychain_certificate("bob");

        let mut job = env.job(
            "/enc",
            MembershipOperation::Add(UserData::new(Sharee::user("bob"), SharePermissions::READ)),
        );
        let events = job.subscribe();
        let report = job.start(false).await;
        assert!(report.is_success(), "{:?}", report.result);

        let states: Vec<JobState> = events
            .drain()
            .filter_map(|event| match event {
                JobEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                JobState::AcquiringLock,
                JobState::ResolvingCertificate,
                JobState::MutatingMetadata,
                JobState::DiscoveringDescendants,
                JobState::Unlocking,
                JobState::Finished { success: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_supplied_token_skips_locking() {
        let env = TestEnv::new();
        env.create_top_level("/enc");
        let token = env.locks().acquire("/enc").await.unwrap();

        let mut job = env.job("/enc", MembershipOperation::ReEncrypt);
        job.set_folder_token(token.clone()).unwrap();
        let report = job.start(true).await;

        assert!(report.is_success(), "{:?}", report.result);
        assert_eq!(env.lock_server.lock_calls(), 1);
        assert!(env.lock_server.holds("/enc", &token));
    }

    #[tokio::test]
    async fn test_setters_are_monotonic() {
        let env = TestEnv::new();
        let mut job = env.job("/enc", MembershipOperation::ReEncrypt);

        let first = LockToken::new(&b"first"[..]).unwrap();
        let second = LockToken::new(&b"second"[..]).unwrap();
        job.set_folder_token(first.clone()).unwrap();
        job.set_folder_token(first.clone()).unwrap();
        assert!(job.set_folder_token(second).is_err());
        assert_eq!(job.folder_token(), Some(&first));

        let user = UserData::new(Sharee::user("bob"), SharePermissions::READ);
        assert!(matches!(
            job.set_user_data(user),
            Err(JobError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_supplied_certificate_is_not_resolved() {
        let env = TestEnv::new();
        env.create_top_level("/enc");

        let mut job = env.job(
            "/enc",
            MembershipOperation::Add(UserData::new(Sharee::user("bob"), SharePermissions::READ)),
        );
        job.set_certificate(env.certificate_for("bob")).unwrap();
        let report = job.start(false).await;

        assert!(report.is_success(), "{:?}", report.result);
        assert_eq!(env.keychain.load_calls(), 0);
        assert_eq!(env.directory.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_transition_ends_with_failed_state() {
        let env = TestEnv::new();
        env.create_top_level("/enc");
        let token = env.locks().acquire("/enc").await.unwrap();

        let mut job = env.job("/enc", MembershipOperation::ReEncrypt);
        job.set_folder_token(token).unwrap();
        let events = job.subscribe();

        let error = job.transition(JobState::Unlocking).unwrap_err();
        assert!(matches!(
            error,
            JobError::IllegalTransition {
                from: JobState::Created,
                to: JobState::Unlocking
            }
        ));
        assert_eq!(error.status_code(), 500);
        assert_eq!(job.state(), JobState::Created);

        job.halt().await;
        assert_eq!(job.state(), JobState::Finished { success: false });
        assert!(!env.lock_server.is_locked("/enc"));
        assert_eq!(
            events.drain().collect::<Vec<_>>(),
            vec![
                JobEvent::FolderUnlocked {
                    path: "/enc".to_string()
                },
                JobEvent::StateChanged {
                    path: "/enc".to_string(),
                    state: JobState::Finished { success: false },
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let mut env = TestEnv::new();
        env.context.config.max_depth = 1;
        let key = env.create_top_level("/enc");
        env.create_nested("/enc/a", &key);
        env.create_nested("/enc/a/b", &key);

        let report = env
            .job("/enc", MembershipOperation::ReEncrypt)
            .start(false)
            .await;

        match report.result {
            Err(JobError::SubJobFailed { path, error }) => {
                assert_eq!(path, "/enc/a");
                assert!(matches!(*error, JobError::InvalidRequest(_)));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!env.lock_server.is_locked("/enc"));
    }
}
