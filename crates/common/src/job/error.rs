use super::state::JobState;
use crate::certificates::CertificateError;
use crate::lock::LockError;
use crate::metadata::MetadataError;

/// Status code reported for a successful job
pub const STATUS_OK: u16 = 200;

/// Why a folder users metadata job failed
///
/// Every variant maps to a status code via [`JobError::status_code`]; together
/// with the `Display` message this is the `(code, message)` pair the job reports.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("folder {path} is locked: {message}")]
    LockUnavailable { path: String, message: String },
    #[error("could not resolve certificate for {user_id}: {reason}")]
    CertificateResolutionFailed {
        user_id: String,
        status: u16,
        reason: String,
    },
    /// The document was written with a key generation we do not know about.
    ///  The caller has to restart with fresh checksums.
    #[error("stale metadata for {path}: {reason}")]
    StaleMetadataGeneration { path: String, reason: String },
    #[error("metadata write for {path} rejected ({status}): {message}")]
    MetadataWriteRejected {
        path: String,
        status: u16,
        message: String,
    },
    #[error("sub-job for {path} failed: {error}")]
    SubJobFailed {
        path: String,
        #[source]
        error: Box<JobError>,
    },
    #[error("transport error {status}: {message}")]
    TransportError { status: u16, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("illegal state transition from {from} to {to}")]
    IllegalTransition { from: JobState, to: JobState },
}

impl JobError {
    pub fn status_code(&self) -> u16 {
        match self {
            JobError::LockUnavailable { .. } => 423,
            JobError::CertificateResolutionFailed { status, .. } => *status,
            JobError::StaleMetadataGeneration { .. } => 412,
            JobError::MetadataWriteRejected { status, .. } => *status,
            JobError::SubJobFailed { error, .. } => error.status_code(),
            JobError::TransportError { status, .. } => *status,
            JobError::InvalidRequest(_) => 400,
            JobError::IllegalTransition { .. } => 500,
        }
    }

    /// The innermost failure, looking through nested sub-job failures
    pub fn root_cause(&self) -> &JobError {
        match self {
            JobError::SubJobFailed { error, .. } => error.root_cause(),
            other => other,
        }
    }

    pub(crate) fn from_lock(error: LockError) -> Self {
        match error {
            LockError::AlreadyLocked(path) => JobError::LockUnavailable {
                message: "locked by another session".to_string(),
                path,
            },
            LockError::Transport { status, message } => JobError::TransportError { status, message },
        }
    }

    pub(crate) fn from_certificate(user_id: &str, error: CertificateError) -> Self {
        let status = match &error {
            CertificateError::CertificateNotFound(_) => 404,
            CertificateError::CertificateUntrusted { .. } => 403,
            CertificateError::Transport { status, .. } => *status,
        };
        JobError::CertificateResolutionFailed {
            user_id: user_id.to_string(),
            status,
            reason: error.to_string(),
        }
    }

    pub(crate) fn from_metadata(path: &str, error: MetadataError) -> Self {
        match error {
            MetadataError::NotFound(_) => JobError::TransportError {
                status: 404,
                message: error.to_string(),
            },
            MetadataError::KeyMismatch(reason) => JobError::StaleMetadataGeneration {
                path: path.to_string(),
                reason,
            },
            MetadataError::Rejected { status, message } => JobError::MetadataWriteRejected {
                path: path.to_string(),
                status,
                message,
            },
            MetadataError::Transport { status, message } => {
                JobError::TransportError { status, message }
            }
            MetadataError::MissingKey(_)
            | MetadataError::NotTopLevel(_)
            | MetadataError::UserNotMember(_) => {
                JobError::InvalidRequest(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sub_job_failure_reports_child_code() {
        let child = JobError::TransportError {
            status: 503,
            message: "unavailable".to_string(),
        };
        let error = JobError::SubJobFailed {
            path: "/enc/a".to_string(),
            error: Box::new(JobError::SubJobFailed {
                path: "/enc/a/x".to_string(),
                error: Box::new(child.clone()),
            }),
        };
        assert_eq!(error.status_code(), 503);
        assert_eq!(error.root_cause(), &child);
        assert!(error.to_string().contains("/enc/a"));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(
            JobError::from_lock(LockError::AlreadyLocked("/enc".to_string())).status_code(),
            423
        );
        assert_eq!(
            JobError::from_certificate(
                "bob",
                CertificateError::CertificateNotFound("bob".to_string())
            )
            .status_code(),
            404
        );
        assert!(matches!(
            JobError::from_metadata(
                "/enc",
                MetadataError::Rejected {
                    status: 409,
                    message: "conflict".to_string()
                }
            ),
            JobError::MetadataWriteRejected { status: 409, .. }
        ));
        assert!(matches!(
            JobError::from_metadata("/enc/a", MetadataError::KeyMismatch("bad key".to_string())),
            JobError::StaleMetadataGeneration { .. }
        ));
        assert_eq!(
            JobError::from_metadata("/enc/a", MetadataError::MissingKey("/enc/a".to_string()))
                .status_code(),
            400
        );
        assert_eq!(
            JobError::from_metadata("/enc", MetadataError::UserNotMember("bob".to_string()))
                .status_code(),
            400
        );
    }
}
