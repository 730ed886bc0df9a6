//! Digest and signature record types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::utils::{bytes_to_hex, constant_time_eq, hex_to_bytes};

/// Length of a [`DocumentHash`] in bytes (SHA-256).
pub const HASH_LEN: usize = 32;

/// SHA-256 digest of the exact bytes of a document.
///
/// Displays and serializes as lowercase hex. Equality is constant-time.
#[derive(Clone, Copy)]
pub struct DocumentHash([u8; HASH_LEN]);

impl DocumentHash {
    /// Wrap a raw digest.
    pub fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Wrap a digest slice, rejecting empty or wrongly-sized input.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::Validation("Digest is empty".to_string()));
        }
        let array: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
            Error::Validation(format!(
                "Digest must be {} bytes, got {}",
                HASH_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.0)
    }
}

impl AsRef<[u8]> for DocumentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for DocumentHash {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for DocumentHash {}

impl std::fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for DocumentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentHash({})", self.to_hex())
    }
}

impl FromStr for DocumentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex_to_bytes(s.trim())
            .ok_or_else(|| Error::Validation(format!("Invalid hex digest: {}", s)))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for DocumentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocumentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(serde::de::Error::custom)
    }
}

/// A signature together with the exact digest it covers.
///
/// PSS signatures are randomized: two records over the same digest carry
/// different bytes. Validity is established only by verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Raw signature bytes
    #[serde(with = "crate::utils::base64_bytes")]
    pub signature: Vec<u8>,
    /// Digest the signature was produced over
    pub hash: DocumentHash,
    /// Signature scheme label
    pub algorithm: String,
    /// Id of the key that produced the signature
    pub key_id: String,
    /// When the signature was produced
    pub signed_at: DateTime<Utc>,
}

impl SignatureRecord {
    /// Short, stable reference to this signature: hex of its first 16 bytes.
    pub fn reference(&self) -> String {
        let end = self.signature.len().min(16);
        bytes_to_hex(&self.signature[..end])
    }
}

impl std::fmt::Debug for SignatureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureRecord")
            .field("signature", &format!("{} bytes", self.signature.len()))
            .field("hash", &self.hash.to_hex())
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("signed_at", &self.signed_at)
            .finish()
    }
}
