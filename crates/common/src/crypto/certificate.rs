use std::fmt;

use sha2::{Digest, Sha256};

/// PEM tag every user certificate must carry
pub const CERTIFICATE_PEM_TAG: &str = "CERTIFICATE";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CertificateParseError {
    #[error("invalid pem: {0}")]
    Pem(String),
    #[error("unexpected pem tag: {0}")]
    UnexpectedTag(String),
    #[error("certificate is empty")]
    Empty,
}

/// A user's public encryption certificate
///
/// The certificate is kept as an opaque DER blob. Parsing and validation are
/// left to a [`TrustPolicy`](crate::certificates::TrustPolicy).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    der: Vec<u8>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl Certificate {
    /// Parse a certificate from a PEM string
    pub fn from_pem(pem: &str) -> Result<Self, CertificateParseError> {
        let parsed = pem::parse(pem).map_err(|e| CertificateParseError::Pem(e.to_string()))?;
        if parsed.tag() != CERTIFICATE_PEM_TAG {
            return Err(CertificateParseError::UnexpectedTag(parsed.tag().to_string()));
        }
        Self::from_der(parsed.contents())
    }

    /// Wrap raw DER bytes
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateParseError> {
        if der.is_empty() {
            return Err(CertificateParseError::Empty);
        }
        Ok(Self { der: der.to_vec() })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(CERTIFICATE_PEM_TAG, self.der.clone()))
    }

    /// Lowercase hex SHA-256 over the DER bytes
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pem_roundtrip() {
        let cert = Certificate::from_der(b"not really der").unwrap();
        let pem = cert.to_pem();
        assert!(pem.contains("BEGIN CERTIFICATE"));
        let parsed = Certificate::from_pem(&pem).unwrap();
        assert_eq!(cert, parsed);
        assert_eq!(cert.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_rejects_other_pem_tags() {
        let pem = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![1, 2, 3]));
        let result = Certificate::from_pem(&pem);
        assert_eq!(
            result.unwrap_err(),
            CertificateParseError::UnexpectedTag("PRIVATE KEY".to_string())
        );
    }

    #[test]
    fn test_rejects_empty_and_garbage() {
        assert_eq!(
            Certificate::from_der(&[]).unwrap_err(),
            CertificateParseError::Empty
        );
        assert!(matches!(
            Certificate::from_pem("definitely not pem"),
            Err(CertificateParseError::Pem(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let cert = Certificate::from_der(b"abc").unwrap();
        assert_eq!(
            cert.fingerprint(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
