use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::Certificate;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("keychain error: {0}")]
pub struct KeychainError(pub String);

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("transport error {status}: {message}")]
    Transport { status: u16, message: String },
}

/// Local secure store of certificates
#[async_trait]
pub trait Keychain: Send + Sync + Debug {
    async fn load(&self, user_id: &str) -> Result<Option<Certificate>, KeychainError>;
}

/// Server-side directory of the certificates users published
#[async_trait]
pub trait CertificateDirectory: Send + Sync + Debug {
    async fn fetch(&self, user_id: &str) -> Result<Option<Certificate>, DirectoryError>;
}

/// Decides whether a certificate handed out by the server may be used
pub trait TrustPolicy: Send + Sync + Debug {
    /// Returns the reason on rejection
    fn verify(&self, user_id: &str, certificate: &Certificate) -> Result<(), String>;
}

/// Accepts any parseable X.509 certificate within its validity window
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptWellFormed;

impl TrustPolicy for AcceptWellFormed {
    fn verify(&self, _user_id: &str, certificate: &Certificate) -> Result<(), String> {
        let (rest, parsed) = x509_parser::parse_x509_certificate(certificate.der())
            .map_err(|e| format!("not an x509 certificate: {}", e))?;
        if !rest.is_empty() {
            return Err(format!("{} trailing bytes after certificate", rest.len()));
        }
        let validity = parsed.validity();
        if !validity.is_valid() {
            return Err(format!(
                "certificate is only valid from {} to {}",
                validity.not_before, validity.not_after
            ));
        }
        Ok(())
    }
}

/// Pins users to known certificate fingerprints
///
/// Users without a pin fall back to [`AcceptWellFormed`].
#[derive(Debug, Clone, Default)]
pub struct PinnedFingerprints {
    pins: HashMap<String, String>,
}

impl PinnedFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(mut self, user_id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        let fingerprint: String = fingerprint.into();
        self.pins.insert(user_id.into(), fingerprint.to_lowercase());
        self
    }
}

impl TrustPolicy for PinnedFingerprints {
    fn verify(&self, user_id: &str, certificate: &Certificate) -> Result<(), String> {
        match self.pins.get(user_id) {
            Some(pinned) if *pinned != certificate.fingerprint() => Err(format!(
                "fingerprint {} does not match pinned {}",
                certificate.fingerprint(),
                pinned
            )),
            Some(_) => Ok(()),
            None => AcceptWellFormed.verify(user_id, certificate),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("no certificate found for {0}")]
    CertificateNotFound(String),
    #[error("certificate for {user_id} is not trusted: {reason}")]
    CertificateUntrusted { user_id: String, reason: String },
    #[error("transport error {status}: {message}")]
    Transport { status: u16, message: String },
}

/// Looks up a user's certificate, keychain first
///
/// Nothing is cached here; a keychain that wants to remember server answers
/// has to do so itself.
#[derive(Debug, Clone)]
pub struct CertificateResolver {
    keychain: Arc<dyn Keychain>,
    directory: Arc<dyn CertificateDirectory>,
    trust: Arc<dyn TrustPolicy>,
}

impl CertificateResolver {
    pub fn new(keychain: Arc<dyn Keychain>, directory: Arc<dyn CertificateDirectory>) -> Self {
        Self {
            keychain,
            directory,
            trust: Arc::new(AcceptWellFormed),
        }
    }

    pub fn with_trust_policy(mut self, trust: Arc<dyn TrustPolicy>) -> Self {
        self.trust = trust;
        self
    }

    pub async fn resolve(&self, user_id: &str) -> Result<Certificate, CertificateError> {
        match self.keychain.load(user_id).await {
            Ok(Some(certificate)) => {
                tracing::debug!("Certificate for {} found in keychain", user_id);
                return Ok(certificate);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    "Failed to read certificate for {} from keychain, asking server: {}",
                    user_id,
                    e
                );
            }
        }

        tracing::debug!("Fetching certificate for {} from server", user_id);
        let certificate = self
            .directory
            .fetch(user_id)
            .await
            .map_err(|e| match e {
                DirectoryError::Transport { status, message } => {
                    CertificateError::Transport { status, message }
                }
            })?
            .ok_or_else(|| CertificateError::CertificateNotFound(user_id.to_string()))?;

        self.trust
            .verify(user_id, &certificate)
            .map_err(|reason| CertificateError::CertificateUntrusted {
                user_id: user_id.to_string(),
                reason,
            })?;

        Ok(certificate)
    }
}
