//! Shared helpers for folder membership job integration tests
#![allow(dead_code)]

use common::crypto::MetadataKey;
use common::job::{JobEvent, JobState, MembershipOperation, SharePermissions, Sharee, UserData};
use common::testkit::TestEnv;

/// Install a log subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn add(user_id: &str) -> MembershipOperation {
    MembershipOperation::Add(UserData::new(
        Sharee::user(user_id),
        SharePermissions::READ | SharePermissions::UPDATE,
    ))
}

pub fn remove(user_id: &str) -> MembershipOperation {
    MembershipOperation::Remove(UserData::new(Sharee::user(user_id), SharePermissions::READ))
}

/// `/enc` with two encrypted subfolders, `/enc/a` and `/enc/b`
pub fn two_children(env: &TestEnv) -> MetadataKey {
    let key = env.create_top_level("/enc");
    env.create_nested("/enc/a", &key);
    env.create_nested("/enc/b", &key);
    key
}

/// `/enc` with `/enc/a`, `/enc/a/x` and `/enc/b`
pub fn nested_tree(env: &TestEnv) -> MetadataKey {
    let key = two_children(env);
    env.create_nested("/enc/a/x", &key);
    key
}

/// States the job at `path` went through, in order
pub fn states(events: &flume::Receiver<JobEvent>, path: &str) -> Vec<JobState> {
    events
        .drain()
        .filter_map(|event| match event {
            JobEvent::StateChanged { path: p, state } if p == path => Some(state),
            _ => None,
        })
        .collect()
}

/// Assert every stored folder under `/enc` is written with the root's current key
pub fn assert_tree_uses_root_key(env: &TestEnv, paths: &[&str]) {
    let root = env.metadata.metadata("/enc").expect("root metadata");
    for path in paths {
        let nested = env.metadata.metadata(path).expect("nested metadata");
        assert_eq!(
            nested.metadata_key(),
            root.metadata_key(),
            "{} is not encrypted with the root's key",
            path
        );
        assert_eq!(nested.key_checksums(), root.key_checksums());
    }
}
