//! Integration tests for adding users to encrypted folders

mod common;

use std::sync::Arc;

use crate::common::{add, init_tracing, states, two_children};

use ::common::certificates::{CertificateResolver, PinnedFingerprints};
use ::common::crypto::Certificate;
use ::common::job::{JobError, JobEvent, JobState, STATUS_OK};
use ::common::journal::EncryptionStatus;
use ::common::testkit::TestEnv;

#[tokio::test]
async fn test_add_with_keychain_certificate() {
    init_tracing();
    let env = TestEnv::new();
    let old_key = env.create_top_level("/enc");
    let certificate = env.add_keychain_certificate("bob");

    let mut job = env.job("/enc", add("bob"));
    let events = job.subscribe();
    let report = job.start(false).await;

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(report.status_code(), STATUS_OK);
    assert_eq!(report.message(), "");
    assert_eq!(env.directory.fetch_calls(), 0);

    let metadata = env.metadata.metadata("/enc").unwrap();
    assert_eq!(metadata.user("bob").unwrap().certificate, certificate);
    assert!(metadata.user("alice").is_some());
    // membership changes rotate the key and remember the old generation
    assert_ne!(metadata.metadata_key(), &old_key);
    assert!(metadata.key_checksums().contains(&old_key.checksum()));
    assert_eq!(report.keys.decryption.as_ref(), Some(&old_key));
    assert_eq!(report.keys.encryption.as_ref(), Some(metadata.metadata_key()));

    assert!(!env.lock_server.is_locked("/enc"));
    assert_eq!(report.encryption_status, EncryptionStatus::EncryptedMigratedV2_0);

    let events: Vec<JobEvent> = events.drain().collect();
    assert!(events.contains(&JobEvent::CertificateReady {
        user_id: "bob".to_string(),
        fingerprint: certificate.fingerprint(),
    }));
    assert!(events.contains(&JobEvent::FolderUnlocked {
        path: "/enc".to_string()
    }));
    assert_eq!(
        events.last(),
        Some(&JobEvent::Finished {
            path: "/enc".to_string(),
            code: 200,
            message: String::new(),
        })
    );
}

#[tokio::test]
async fn test_add_with_server_certificate() {
    let env = TestEnv::new();
    env.create_top_level("/enc");
    let certificate = env.add_server_certificate("bob");

    let report = env.job("/enc", add("bob")).start(false).await;

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(env.keychain.load_calls(), 1);
    assert_eq!(env.directory.fetch_calls(), 1);
    let metadata = env.metadata.metadata("/enc").unwrap();
    assert_eq!(metadata.user("bob").unwrap().certificate, certificate);
}

#[tokio::test]
async fn test_add_replaces_existing_member_certificate() {
    let env = TestEnv::new();
    env.create_top_level("/enc");
    env.add_member("/enc", "bob");
    let renewed = TestEnv::issue_certificate("bob");
    env.keychain.insert("bob", renewed.clone());

    let report = env.job("/enc", add("bob")).start(false).await;

    assert!(report.is_success(), "{:?}", report.result);
    let metadata = env.metadata.metadata("/enc").unwrap();
    assert_eq!(metadata.users().count(), 2);
    assert_eq!(metadata.user("bob").unwrap().certificate, renewed);
}

#[tokio::test]
async fn test_add_certificate_not_found() {
    let env = TestEnv::new();
    env.create_top_level("/enc");

    let mut job = env.job("/enc", add("bob"));
    let events = job.subscribe();
    let report = job.start(false).await;

    match &report.result {
        Err(JobError::CertificateResolutionFailed {
            user_id, status, ..
        }) => {
            assert_eq!(user_id, "bob");
            assert_eq!(*status, 404);
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(report.status_code(), 404);

    // the metadata was never touched
    assert!(env.metadata.fetches().is_empty());
    assert!(env.metadata.uploads().is_empty());
    // but the lock was given back
    assert!(!env.lock_server.is_locked("/enc"));
    assert_eq!(env.lock_server.unlock_calls(), 1);

    assert_eq!(
        states(&events, "/enc"),
        vec![
            JobState::AcquiringLock,
            JobState::ResolvingCertificate,
            JobState::Aborting,
            JobState::Finished { success: false },
        ]
    );
}

#[tokio::test]
async fn test_add_untrusted_server_certificate() {
    let mut env = TestEnv::new();
    env.create_top_level("/enc");
    env.add_server_certificate("bob");
    env.context.certificates = CertificateResolver::new(
        Arc::new(env.keychain.clone()),
        Arc::new(env.directory.clone()),
    )
    .with_trust_policy(Arc::new(PinnedFingerprints::new().pin("bob", "00ff")));

    let report = env.job("/enc", add("bob")).start(false).await;

    assert_eq!(report.status_code(), 403);
    assert!(matches!(
        report.result,
        Err(JobError::CertificateResolutionFailed { .. })
    ));
    assert!(env.metadata.uploads().is_empty());
    assert!(!env.lock_server.is_locked("/enc"));
}

#[tokio::test]
async fn test_add_to_locked_folder() {
    let env = TestEnv::new();
    env.create_top_level("/enc");
    env.add_keychain_certificate("bob");
    env.lock_server.lock_as_other_session("/enc");

    let mut job = env.job("/enc", add("bob"));
    let events = job.subscribe();
    let report = job.start(false).await;

    assert!(matches!(
        report.result,
        Err(JobError::LockUnavailable { .. })
    ));
    assert_eq!(report.status_code(), 423);
    assert_eq!(env.keychain.load_calls(), 0);
    assert!(env.metadata.fetches().is_empty());
    // the other session's lock is untouched
    assert!(env.lock_server.is_locked("/enc"));
    assert_eq!(env.lock_server.unlock_calls(), 0);
    assert_eq!(
        states(&events, "/enc"),
        vec![JobState::AcquiringLock, JobState::Finished { success: false }]
    );
}

#[tokio::test]
async fn test_add_to_nested_folder_is_rejected() {
    let env = TestEnv::new();
    let key = two_children(&env);
    env.add_keychain_certificate("bob");

    let mut job = env.job("/enc", add("bob")).with_nested_path("/enc/a");
    job.set_metadata_key_for_decryption(key);
    let events = job.subscribe();
    let report = job.start(false).await;

    // members are managed on the top-level folder only
    assert!(matches!(report.result, Err(JobError::InvalidRequest(_))));
    assert_eq!(report.status_code(), 400);
    assert_eq!(env.lock_server.lock_calls(), 0);
    assert_eq!(env.keychain.load_calls(), 0);
    assert!(env.metadata.fetches().is_empty());
    assert!(env.metadata.uploads().is_empty());
    assert!(!env.lock_server.is_locked("/enc"));
    assert_eq!(
        states(&events, "/enc/a"),
        vec![JobState::Finished { success: false }]
    );
}

#[tokio::test]
async fn test_add_with_garbage_server_certificate() {
    let env = TestEnv::new();
    env.create_top_level("/enc");
    env.directory
        .insert("bob", Certificate::from_der(b"junk").unwrap());

    let report = env.job("/enc", add("bob")).start(false).await;

    match &report.result {
        Err(JobError::CertificateResolutionFailed {
            user_id, status, ..
        }) => {
            assert_eq!(user_id, "bob");
            assert_eq!(*status, 403);
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(env.metadata.fetches().is_empty());
    assert!(env.metadata.uploads().is_empty());
    assert!(!env.lock_server.is_locked("/enc"));
}

#[tokio::test]
async fn test_add_re_encrypts_subfolders() {
    let env = TestEnv::new();
    let old_key = two_children(&env);
    env.add_keychain_certificate("bob");

    let report = env.job("/enc", add("bob")).start(false).await;

    assert!(report.is_success(), "{:?}", report.result);
    common::assert_tree_uses_root_key(&env, &["/enc/a", "/enc/b"]);
    let root = env.metadata.metadata("/enc").unwrap();
    assert_ne!(root.metadata_key(), &old_key);
    // only the root job resolved a certificate
    assert_eq!(env.keychain.load_calls(), 1);
}
