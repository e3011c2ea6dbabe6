use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::resolver::{CertificateDirectory, DirectoryError, Keychain, KeychainError};
use crate::crypto::Certificate;

/// In-memory keychain
#[derive(Debug, Clone, Default)]
pub struct MemoryKeychain {
    inner: Arc<Mutex<MemoryKeychainInner>>,
}

#[derive(Debug, Default)]
struct MemoryKeychainInner {
    certificates: HashMap<String, Certificate>,
    fail_reads: bool,
    load_calls: usize,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, certificate: Certificate) {
        self.inner
            .lock()
            .certificates
            .insert(user_id.into(), certificate);
    }

    pub fn fail_reads(&self) {
        self.inner.lock().fail_reads = true;
    }

    pub fn load_calls(&self) -> usize {
        self.inner.lock().load_calls
    }
}

#[async_trait]
impl Keychain for MemoryKeychain {
    async fn load(&self, user_id: &str) -> Result<Option<Certificate>, KeychainError> {
        let mut inner = self.inner.lock();
        inner.load_calls += 1;
        if inner.fail_reads {
            return Err(KeychainError("keychain is locked".to_string()));
        }
        Ok(inner.certificates.get(user_id).cloned())
    }
}

/// In-memory public key directory
#[derive(Debug, Clone, Default)]
pub struct MemoryCertificateDirectory {
    inner: Arc<Mutex<MemoryCertificateDirectoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryCertificateDirectoryInner {
    certificates: HashMap<String, Certificate>,
    failure: Option<u16>,
    fetch_calls: usize,
}

impl MemoryCertificateDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, certificate: Certificate) {
        self.inner
            .lock()
            .certificates
            .insert(user_id.into(), certificate);
    }

    pub fn fail_fetches(&self, status: u16) {
        self.inner.lock().failure = Some(status);
    }

    pub fn fetch_calls(&self) -> usize {
        self.inner.lock().fetch_calls
    }
}

#[async_trait]
impl CertificateDirectory for MemoryCertificateDirectory {
    async fn fetch(&self, user_id: &str) -> Result<Option<Certificate>, DirectoryError> {
        let mut inner = self.inner.lock();
        inner.fetch_calls += 1;
        if let Some(status) = inner.failure {
            return Err(DirectoryError::Transport {
                status,
                message: "public key request failed".to_string(),
            });
        }
        Ok(inner.certificates.get(user_id).cloned())
    }
}
