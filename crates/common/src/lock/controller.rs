use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// Opaque proof of holding a folder lock
///
/// Only the server interprets the bytes. A token is never empty.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockToken(Bytes);

impl Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockToken({} bytes)", self.0.len())
    }
}

impl LockToken {
    /// Returns `None` for an empty token
    pub fn new(bytes: impl Into<Bytes>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return None;
        }
        Some(Self(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Errors reported by the lock endpoint of the server
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LockTransportError {
    /// Someone else holds the lock
    #[error("folder is locked")]
    Locked,
    /// No lock with that token exists (expired or already released)
    #[error("lock not found")]
    NotFound,
    #[error("transport error {status}: {message}")]
    Transport { status: u16, message: String },
}

/// Server lock endpoint
#[async_trait]
pub trait LockTransport: Send + Sync + Debug {
    async fn lock(&self, path: &str) -> Result<Bytes, LockTransportError>;

    async fn unlock(&self, path: &str, token: &LockToken) -> Result<(), LockTransportError>;
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("folder {0} is already locked by another session")]
    AlreadyLocked(String),
    #[error("transport error {status}: {message}")]
    Transport { status: u16, message: String },
}

impl LockError {
    pub fn status_code(&self) -> u16 {
        match self {
            LockError::AlreadyLocked(_) => 423,
            LockError::Transport { status, .. } => *status,
        }
    }
}

/// Acquires and releases folder locks
#[derive(Debug, Clone)]
pub struct FolderLockController {
    transport: Arc<dyn LockTransport>,
}

impl FolderLockController {
    pub fn new(transport: Arc<dyn LockTransport>) -> Self {
        Self { transport }
    }

    /// Acquire the exclusive lock for `path`
    pub async fn acquire(&self, path: &str) -> Result<LockToken, LockError> {
        tracing::debug!("Locking folder {}", path);
        let bytes = self.transport.lock(path).await.map_err(|e| match e {
            LockTransportError::Locked => LockError::AlreadyLocked(path.to_string()),
            // the folder vanished between listing and locking
            LockTransportError::NotFound => LockError::Transport {
                status: 404,
                message: format!("folder {} not found", path),
            },
            LockTransportError::Transport { status, message } => {
                LockError::Transport { status, message }
            }
        })?;

        LockToken::new(bytes).ok_or_else(|| LockError::Transport {
            status: 500,
            message: format!("server returned an empty lock token for {}", path),
        })
    }

    /// Release the lock for `path`
    ///
    /// Releasing an expired or already released lock is not an error.
    pub async fn release(&self, path: &str, token: &LockToken) -> Result<(), LockError> {
        tracing::debug!("Unlocking folder {}", path);
        match self.transport.unlock(path, token).await {
            Ok(()) => Ok(()),
            Err(LockTransportError::NotFound) => {
                tracing::debug!("Lock for {} was already released", path);
                Ok(())
            }
            Err(LockTransportError::Locked) => Err(LockError::AlreadyLocked(path.to_string())),
            Err(LockTransportError::Transport { status, message }) => {
                Err(LockError::Transport { status, message })
            }
        }
    }
}
