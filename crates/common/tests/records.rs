//! Integration tests for sync journal bookkeeping of rewritten folders

mod common;

use std::collections::BTreeMap;

use crate::common::{nested_tree, remove};

use ::common::job::MembershipOperation;
use ::common::journal::{EncryptionStatus, SyncJournal, SyncRecordId};
use ::common::testkit::TestEnv;

#[tokio::test]
async fn test_records_cover_the_whole_tree() -> anyhow::Result<()> {
    let env = TestEnv::new();
    nested_tree(&env);
    env.add_member("/enc", "bob");

    let report = env.job("/enc", remove("bob")).start(false).await;
    assert!(report.is_success(), "{:?}", report.result);

    let mut expected = BTreeMap::new();
    for path in ["/enc", "/enc/a", "/enc/a/x", "/enc/b"] {
        let id = env.journal.record_id(path).await?.expect("synced path");
        expected.insert(path.to_string(), id);
        assert_eq!(
            env.journal.encryption_status(id),
            Some(EncryptionStatus::EncryptedMigratedV2_0),
            "{}",
            path
        );
    }
    assert_eq!(report.records, expected);
    Ok(())
}

#[tokio::test]
async fn test_initial_records_take_precedence() -> anyhow::Result<()> {
    let env = TestEnv::new();
    nested_tree(&env);
    let journal_id = env.journal.record_id("/enc/a/x").await?.expect("synced path");
    let known = SyncRecordId(4242);

    let mut job = env.job("/enc", MembershipOperation::ReEncrypt);
    job.set_sub_job_records(BTreeMap::from([("/enc/a/x".to_string(), known)]));
    let report = job.start(false).await;

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(report.records.get("/enc/a/x"), Some(&known));
    assert_eq!(report.records.len(), 4);
    // the journal's own record for that path was left alone
    assert_eq!(
        env.journal.encryption_status(journal_id),
        Some(EncryptionStatus::NotEncrypted)
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_tree_leaves_journal_untouched() -> anyhow::Result<()> {
    let env = TestEnv::new();
    nested_tree(&env);
    env.metadata.fail_upload(
        "/enc/b",
        ::common::metadata::MetadataError::Transport {
            status: 500,
            message: "boom".to_string(),
        },
    );

    let report = env
        .job("/enc", MembershipOperation::ReEncrypt)
        .start(false)
        .await;

    assert!(!report.is_success());
    // the successful branch still reported back
    assert!(report.records.contains_key("/enc/a"));
    assert!(report.records.contains_key("/enc/a/x"));
    assert!(!report.records.contains_key("/enc/b"));
    for path in ["/enc", "/enc/a", "/enc/a/x", "/enc/b"] {
        let id = env.journal.record_id(path).await?.expect("synced path");
        assert_eq!(
            env.journal.encryption_status(id),
            Some(EncryptionStatus::NotEncrypted)
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_paths_have_no_record() {
    let env = TestEnv::new();
    let key = env.create_top_level("/enc");
    // stored on the server but never synced
    env.metadata.insert(
        "/enc/remote-only",
        ::common::metadata::FolderMetadata::new_nested(
            key.clone(),
            [key.checksum()].into_iter().collect(),
        ),
    );

    let report = env
        .job("/enc", MembershipOperation::ReEncrypt)
        .start(false)
        .await;

    assert!(report.is_success(), "{:?}", report.result);
    assert!(report.records.contains_key("/enc"));
    assert!(!report.records.contains_key("/enc/remote-only"));
}
