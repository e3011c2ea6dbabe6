use std::fmt;

use sha2::{Digest, Sha256};

/// Size of a metadata key in bytes (256 bits)
pub const METADATA_KEY_SIZE: usize = 32;

/// Symmetric key a folder metadata document is encrypted with
///
/// Nested folders of a top-level encrypted folder share the top-level folder's
/// key, which is why rotating it requires rewriting every descendant document.
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataKey([u8; METADATA_KEY_SIZE]);

// never print key bytes
impl fmt::Debug for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetadataKey({})", self.checksum())
    }
}

impl From<[u8; METADATA_KEY_SIZE]> for MetadataKey {
    fn from(bytes: [u8; METADATA_KEY_SIZE]) -> Self {
        MetadataKey(bytes)
    }
}

impl MetadataKey {
    /// Generate a new random key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; METADATA_KEY_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn checksum(&self) -> KeyChecksum {
        KeyChecksum(hex::encode(Sha256::digest(self.0)))
    }
}

/// Fingerprint identifying one generation of a metadata key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyChecksum(String);

impl KeyChecksum {
    /// Accepts the lowercase hex form produced by [`MetadataKey::checksum`].
    ///  Uppercase input is normalized.
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(Self(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
