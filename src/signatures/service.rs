//! Hashing, signing and signature verification.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use super::types::{DocumentHash, SignatureRecord};
use crate::error::{Error, Result};
use crate::keys::{verify_digest_with, KeyManager, SIGNATURE_ALGORITHM};

/// Computes document digests and produces or checks signatures over them
/// with the keys held by a shared [`KeyManager`].
///
/// Stateless apart from the key manager; safe to share across threads.
#[derive(Debug, Clone)]
pub struct SignatureService {
    keys: Arc<KeyManager>,
}

impl SignatureService {
    /// Create a service backed by `keys`.
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// The key manager backing this service.
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// SHA-256 of the exact document bytes.
    pub fn calculate_document_hash(bytes: &[u8]) -> DocumentHash {
        DocumentHash::new(Sha256::digest(bytes).into())
    }

    /// Sign a digest with the installed private key.
    ///
    /// Fails with a validation error if the digest is empty or not a SHA-256
    /// digest, and with a configuration error if no key is installed.
    pub fn sign_document(&self, digest: &[u8]) -> Result<SignatureRecord> {
        let hash = DocumentHash::from_slice(digest)?;
        let pair = self.keys.current()?;
        let signature = pair.sign_digest(hash.as_ref())?;
        log::debug!("Signed digest {} with key {}", hash, pair.key_id());

        Ok(SignatureRecord {
            signature,
            hash,
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            key_id: pair.key_id().to_string(),
            signed_at: Utc::now(),
        })
    }

    /// Check `record`'s signature over `digest`.
    ///
    /// The public key is chosen by the record's key id (installed or retired);
    /// records naming an unknown key are checked against the installed key.
    /// Fails with a validation error for empty input and a crypto error if
    /// the signature does not verify.
    pub fn verify_signature(&self, digest: &[u8], record: &SignatureRecord) -> Result<()> {
        if digest.is_empty() {
            return Err(Error::Validation("Digest is empty".to_string()));
        }
        if record.signature.is_empty() {
            return Err(Error::Validation("Signature is empty".to_string()));
        }
        if record.algorithm != SIGNATURE_ALGORITHM {
            return Err(Error::Crypto(format!(
                "Unsupported signature algorithm: {}",
                record.algorithm
            )));
        }

        match self.keys.verifying_key(&record.key_id) {
            Some(key) => verify_digest_with(&key, digest, &record.signature),
            None => {
                log::debug!(
                    "Key {} unknown, verifying against installed key",
                    record.key_id
                );
                self.keys.current()?.verify_digest(digest, &record.signature)
            },
        }
    }
}
