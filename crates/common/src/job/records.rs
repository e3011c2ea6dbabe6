use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::journal::SyncRecordId;

/// Remote paths whose metadata was rewritten, with their sync journal records
///
/// Shared between a job and the tasks driving its sub-jobs, which merge their
/// results in as they complete. Entries are only ever added and a path maps to
/// at most one record; the first record seen for a path wins.
#[derive(Debug, Clone, Default)]
pub struct SyncRecordTable {
    inner: Arc<Mutex<BTreeMap<String, SyncRecordId>>>,
}

impl SyncRecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(records: BTreeMap<String, SyncRecordId>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(records)),
        }
    }

    /// Returns false if `path` already had a record
    pub fn insert(&self, path: impl Into<String>, id: SyncRecordId) -> bool {
        let mut inner = self.inner.lock();
        let path = path.into();
        if inner.contains_key(&path) {
            return false;
        }
        inner.insert(path, id);
        true
    }

    pub fn merge(&self, records: &BTreeMap<String, SyncRecordId>) {
        let mut inner = self.inner.lock();
        for (path, id) in records {
            inner.entry(path.clone()).or_insert(*id);
        }
    }

    pub fn get(&self, path: &str) -> Option<SyncRecordId> {
        self.inner.lock().get(path).copied()
    }

    /// Records at `path` or anywhere below it
    pub fn subset_below(&self, path: &str) -> BTreeMap<String, SyncRecordId> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.inner
            .lock()
            .iter()
            .filter(|(candidate, _)| *candidate == path || candidate.starts_with(&prefix))
            .map(|(candidate, id)| (candidate.clone(), *id))
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, SyncRecordId> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
