use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use super::controller::{LockToken, LockTransport, LockTransportError};

/// In-memory lock endpoint
///
/// Hands out random tokens and keeps one lock per path. Tests can simulate
/// other sessions, expiry and transport failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockServer {
    inner: Arc<Mutex<MemoryLockServerInner>>,
}

#[derive(Debug, Default)]
struct MemoryLockServerInner {
    /// path -> token of the current holder
    locks: HashMap<String, Bytes>,
    lock_calls: usize,
    unlock_calls: usize,
    /// status returned by every unlock, if set
    unlock_failure: Option<u16>,
    /// status returned by every lock, if set
    lock_failure: Option<u16>,
    empty_tokens: bool,
}

impl MemoryLockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, path: &str) -> bool {
        self.inner.lock().locks.contains_key(path)
    }

    /// Lock `path` with a token nobody else knows
    pub fn lock_as_other_session(&self, path: &str) {
        let token = Bytes::from(Uuid::new_v4().as_bytes().to_vec());
        self.inner.lock().locks.insert(path.to_string(), token);
    }

    /// Drop the lock on `path` as if the server-side timeout hit
    pub fn expire(&self, path: &str) {
        self.inner.lock().locks.remove(path);
    }

    pub fn fail_unlocks(&self, status: u16) {
        self.inner.lock().unlock_failure = Some(status);
    }

    pub fn fail_locks(&self, status: u16) {
        self.inner.lock().lock_failure = Some(status);
    }

    pub fn issue_empty_tokens(&self) {
        self.inner.lock().empty_tokens = true;
    }

    pub fn lock_calls(&self) -> usize {
        self.inner.lock().lock_calls
    }

    pub fn unlock_calls(&self) -> usize {
        self.inner.lock().unlock_calls
    }

    /// Whether `token` is the one currently holding `path`
    pub fn holds(&self, path: &str, token: &LockToken) -> bool {
        self.inner
            .lock()
            .locks
            .get(path)
            .map(|current| current.as_ref() == token.bytes())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LockTransport for MemoryLockServer {
    async fn lock(&self, path: &str) -> Result<Bytes, LockTransportError> {
        let mut inner = self.inner.lock();
        inner.lock_calls += 1;
        if let Some(status) = inner.lock_failure {
            return Err(LockTransportError::Transport {
                status,
                message: "lock request failed".to_string(),
            });
        }
        if inner.locks.contains_key(path) {
            return Err(LockTransportError::Locked);
        }
        if inner.empty_tokens {
            return Ok(Bytes::new());
        }
        let token = Bytes::from(Uuid::new_v4().simple().to_string().into_bytes());
        inner.locks.insert(path.to_string(), token.clone());
        Ok(token)
    }

    async fn unlock(&self, path: &str, token: &LockToken) -> Result<(), LockTransportError> {
        let mut inner = self.inner.lock();
        inner.unlock_calls += 1;
        if let Some(status) = inner.unlock_failure {
            return Err(LockTransportError::Transport {
                status,
                message: "unlock request failed".to_string(),
            });
        }
        match inner.locks.get(path) {
            None => Err(LockTransportError::NotFound),
            Some(current) if current.as_ref() == token.bytes() => {
                inner.locks.remove(path);
                Ok(())
            }
            Some(_) => Err(LockTransportError::Transport {
                status: 403,
                message: format!("token does not hold the lock on {}", path),
            }),
        }
    }
}
