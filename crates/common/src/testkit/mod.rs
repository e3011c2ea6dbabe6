/// In-process harness for folder membership jobs
///
/// Wires every collaborator of a [`JobContext`] to its in-memory
/// implementation and keeps handles to them, so tests can prepare server state,
/// inject failures and inspect what the jobs did.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestEnv;
///
/// #[tokio::test]
/// async fn test_add() {
///     let env = TestEnv::new();
///     env.create_top_level("/enc");
///     env.add_keychain_certificate("bob");
///
///     let report = env.job("/enc", add("bob")).start(false).await;
///     assert!(report.is_success());
/// }
/// ```
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::account::Account;
use crate::certificates::memory::{MemoryCertificateDirectory, MemoryKeychain};
use crate::certificates::CertificateResolver;
use crate::config::JobConfig;
use crate::crypto::{Certificate, MetadataKey};
use crate::job::{FolderUsersMetadataJob, JobContext, MembershipOperation};
use crate::journal::memory::MemorySyncJournal;
use crate::lock::memory::MemoryLockServer;
use crate::lock::FolderLockController;
use crate::metadata::memory::MemoryMetadataStore;
use crate::metadata::{FolderMetadata, FolderUser};

/// User id of the account every [`TestEnv`] acts as
pub const TEST_ACCOUNT: &str = "alice";

pub struct TestEnv {
    pub context: JobContext,
    pub lock_server: MemoryLockServer,
    pub keychain: MemoryKeychain,
    pub directory: MemoryCertificateDirectory,
    pub metadata: MemoryMetadataStore,
    pub journal: MemorySyncJournal,
    certificates: Arc<Mutex<HashMap<String, Certificate>>>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(JobConfig::default())
    }

    pub fn with_config(config: JobConfig) -> Self {
        let lock_server = MemoryLockServer::new();
        let keychain = MemoryKeychain::new();
        let directory = MemoryCertificateDirectory::new();
        let metadata = MemoryMetadataStore::new().with_lock_server(lock_server.clone());
        let journal = MemorySyncJournal::new();

        let server = Url::parse("https://cloud.example.com").expect("static url");
        let context = JobContext {
            account: Account::new(TEST_ACCOUNT, server),
            journal: Arc::new(journal.clone()),
            locks: FolderLockController::new(Arc::new(lock_server.clone())),
            certificates: CertificateResolver::new(
                Arc::new(keychain.clone()),
                Arc::new(directory.clone()),
            ),
            metadata: Arc::new(metadata.clone()),
            config,
        };

        Self {
            context,
            lock_server,
            keychain,
            directory,
            metadata,
            journal,
            certificates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn locks(&self) -> FolderLockController {
        self.context.locks.clone()
    }

    pub fn job(&self, root: &str, operation: MembershipOperation) -> FolderUsersMetadataJob {
        FolderUsersMetadataJob::new(self.context.clone(), root, operation)
    }

    /// Self-signed certificate of `user_id`, the same one on every call
    pub fn certificate_for(&self, user_id: &str) -> Certificate {
        self.certificates
            .lock()
            .entry(user_id.to_string())
            .or_insert_with(|| Self::issue_certificate(user_id))
            .clone()
    }

    /// A fresh self-signed certificate for `user_id`
    pub fn issue_certificate(user_id: &str) -> Certificate {
        let issued = rcgen::generate_simple_self_signed(vec![format!("{}.test", user_id)])
            .expect("certificate generation");
        Certificate::from_der(issued.cert.der()).expect("non-empty der")
    }

    pub fn add_keychain_certificate(&self, user_id: &str) -> Certificate {
        let certificate = self.certificate_for(user_id);
        self.keychain.insert(user_id, certificate.clone());
        certificate
    }

    pub fn add_server_certificate(&self, user_id: &str) -> Certificate {
        let certificate = self.certificate_for(user_id);
        self.directory.insert(user_id, certificate.clone());
        certificate
    }

    /// Store a top-level encrypted folder owned by the test account
    ///
    /// Returns the folder's metadata key.
    pub fn create_top_level(&self, path: &str) -> MetadataKey {
        let key = MetadataKey::generate();
        let owner = FolderUser {
            user_id: TEST_ACCOUNT.to_string(),
            certificate: self.certificate_for(TEST_ACCOUNT),
        };
        self.metadata
            .insert(path, FolderMetadata::new_top_level(owner, key.clone()));
        self.journal.insert(path);
        key
    }

    /// Store an encrypted folder below a top-level folder with key `top_level_key`
    pub fn create_nested(&self, path: &str, top_level_key: &MetadataKey) {
        let checksums = [top_level_key.checksum()].into_iter().collect();
        self.metadata.insert(
            path,
            FolderMetadata::new_nested(top_level_key.clone(), checksums),
        );
        self.journal.insert(path);
    }

    /// Add `user_id` as a member of the top-level folder at `path`
    pub fn add_member(&self, path: &str, user_id: &str) {
        let Some(mut metadata) = self.metadata.metadata(path) else {
            return;
        };
        let _ = metadata.add_user(FolderUser {
            user_id: user_id.to_string(),
            certificate: self.certificate_for(user_id),
        });
        self.metadata.insert(path, metadata);
    }
}
