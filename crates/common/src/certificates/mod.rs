//! Resolution of users' public certificates
//!
//! Adding a user to an encrypted folder means wrapping the folder's metadata key
//! for that user's public key. The certificate is looked up in the local
//! keychain first and, failing that, in the server's public key directory.
//! Certificates coming from the server are checked against a [`TrustPolicy`].

pub mod memory;
mod resolver;

pub use resolver::{
    AcceptWellFormed, CertificateDirectory, CertificateError, CertificateResolver,
    DirectoryError, Keychain, KeychainError, PinnedFingerprints, TrustPolicy,
};
