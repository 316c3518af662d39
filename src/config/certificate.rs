// src/config/certificate.rs

use std::fmt;
use serde::{Serialize, Serializer};

use super::ConfigError;

/// A signing certificate of the owning application.
///
/// The bytes are opaque to this crate. The canonical text form is the
/// lowercase hex encoding of the bytes; parsing accepts either case.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    /// Encoded certificate bytes
    bytes: Vec<u8>,
}

impl Certificate {
    /// Creates a certificate from its encoded bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// Parses a certificate from its canonical text form
    pub fn from_chars(text: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(text).map_err(|e| ConfigError::MalformedField {
            key: super::persist::KEY_CERTS.to_string(),
            reason: format!("certificate is not valid hex: {}", e),
        })?;

        Ok(Self { bytes })
    }

    /// Returns the canonical text form
    pub fn to_chars_string(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Returns the encoded certificate bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the certificate carries no bytes at all
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({})", self.to_chars_string())
    }
}

impl Serialize for Certificate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_chars_string())
    }
}
