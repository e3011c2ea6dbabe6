use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;

use super::error::JobError;
use super::folder_users::JobReport;

/// The running children of a job
///
/// Children are owned here and nowhere else. Dropping the set while children
/// are still running is a bug in the owner: it is reported and the children
/// are aborted.
pub(crate) struct SubJobSet {
    tasks: JoinSet<(usize, JobReport)>,
    /// spawn index -> path, for children that have not reported yet
    pending: BTreeMap<usize, String>,
    spawned: usize,
}

impl SubJobSet {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            pending: BTreeMap::new(),
            spawned: 0,
        }
    }

    pub fn spawn<F>(&mut self, path: String, job: F)
    where
        F: Future<Output = JobReport> + Send + 'static,
    {
        let index = self.spawned;
        self.spawned += 1;
        self.pending.insert(index, path.clone());
        self.tasks.spawn(async move {
            let report = match AssertUnwindSafe(job).catch_unwind().await {
                Ok(report) => report,
                Err(_) => {
                    tracing::error!("Sub-job for {} panicked", path);
                    JobReport::failed(
                        path,
                        JobError::TransportError {
                            status: 500,
                            message: "sub-job panicked".to_string(),
                        },
                    )
                }
            };
            (index, report)
        });
    }

    pub fn len(&self) -> usize {
        self.spawned
    }

    /// Wait for every child, returning the reports in spawn order
    pub async fn join_all(&mut self) -> Vec<JobReport> {
        let mut reports = BTreeMap::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    self.pending.remove(&index);
                    match &report.result {
                        Ok(()) => tracing::debug!("Sub-job for {} finished", report.path),
                        Err(e) => tracing::warn!("Sub-job for {} failed: {}", report.path, e),
                    }
                    reports.insert(index, report);
                }
                Err(e) => tracing::error!("Sub-job task failed to complete: {}", e),
            }
        }

        // tasks that were cancelled under us never reported
        for (index, path) in std::mem::take(&mut self.pending) {
            reports.insert(
                index,
                JobReport::failed(
                    path,
                    JobError::TransportError {
                        status: 500,
                        message: "sub-job was cancelled".to_string(),
                    },
                ),
            );
        }

        reports.into_values().collect()
    }
}

impl Drop for SubJobSet {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        tracing::error!(
            "Dropping a job with {} outstanding sub-jobs: {:?}",
            self.pending.len(),
            self.pending.values().collect::<Vec<_>>()
        );
    }
}
