//! Tamper classification of submitted documents.
//!
//! A candidate file is checked against the record made when the document was
//! signed. The stored signature over the *original* hash is the trust anchor:
//! it is verified first and independently of the upload, then the upload's
//! hash is compared with the original.
//!
//! | signature verifies | hashes match | status     |
//! |--------------------|--------------|------------|
//! | no                 | either       | `Invalid`  |
//! | yes                | yes          | `Valid`    |
//! | yes                | no           | `Modified` |

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SealConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::signatures::{DocumentHash, SignatureService};
use crate::store::{DocumentRecord, DocumentStore, LookupContext};

/// Outcome of a verification.
///
/// `Pending` is the state before any check has run; the other three are
/// terminal and recomputed on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Not verified yet
    Pending,
    /// Signature verifies and content is unchanged
    Valid,
    /// Signature verifies but content differs from what was signed
    Modified,
    /// Stored signature does not verify
    Invalid,
}

impl VerificationStatus {
    /// Classify from the two checks. Signature validity dominates.
    pub fn classify(signature_valid: bool, hash_match: bool) -> Self {
        match (signature_valid, hash_match) {
            (false, _) => VerificationStatus::Invalid,
            (true, true) => VerificationStatus::Valid,
            (true, false) => VerificationStatus::Modified,
        }
    }

    /// Whether verification has produced an outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Valid => "VALID",
            VerificationStatus::Modified => "MODIFIED",
            VerificationStatus::Invalid => "INVALID",
        };
        f.write_str(label)
    }
}

/// Result of verifying one candidate against one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Document that was checked
    pub document_id: String,
    /// Classification
    pub status: VerificationStatus,
    /// Human-readable explanation
    pub message: String,
    /// Hash recorded at signing time
    pub original_hash: DocumentHash,
    /// Hash of the submitted candidate
    pub uploaded_hash: DocumentHash,
    /// Whether the stored signature verifies over the original hash
    pub signature_valid: bool,
    /// Whether the candidate hashes to the original hash
    pub hash_match: bool,
    /// When the check ran
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    /// Whether the document is authentic and unchanged.
    pub fn is_valid(&self) -> bool {
        self.status == VerificationStatus::Valid
    }
}

/// Verifies candidates against stored document records.
pub struct VerificationEngine {
    signatures: SignatureService,
    store: Arc<dyn DocumentStore>,
    max_document_size: usize,
}

impl VerificationEngine {
    /// Create an engine reading records from `store`.
    pub fn new(
        signatures: SignatureService,
        store: Arc<dyn DocumentStore>,
        config: &SealConfig,
    ) -> Self {
        Self {
            signatures,
            store,
            max_document_size: config.max_document_size,
        }
    }

    /// Verify `candidate` against the record for `document_id`.
    pub fn verify(&self, document_id: &str, candidate: &[u8]) -> Result<VerificationResult> {
        self.verify_with_context(document_id, candidate, &LookupContext::new())
    }

    /// Verify with a caller-supplied cancellation context for the record lookup.
    ///
    /// Fails with `NotFound` for an unknown id, `Validation` for empty or
    /// oversized input and `Cancelled` if `ctx` fires during the lookup. A
    /// signature that fails to verify is not an error; it yields `Invalid`.
    pub fn verify_with_context(
        &self,
        document_id: &str,
        candidate: &[u8],
        ctx: &LookupContext,
    ) -> Result<VerificationResult> {
        if document_id.trim().is_empty() {
            return Err(Error::Validation("Document id is empty".to_string()));
        }
        if candidate.is_empty() {
            return Err(Error::Validation("Candidate document is empty".to_string()));
        }
        if candidate.len() > self.max_document_size {
            return Err(Error::DocumentTooLarge {
                size: candidate.len(),
                limit: self.max_document_size,
            });
        }

        let record = self.store.get(document_id, ctx)?;

        let uploaded_hash = SignatureService::calculate_document_hash(candidate);
        let hash_match = uploaded_hash == record.original_hash;
        let (signature_valid, failure) = self.check_signature(&record)?;

        let status = VerificationStatus::classify(signature_valid, hash_match);
        let message = describe(status, failure.as_deref());

        match status {
            VerificationStatus::Valid => {
                log::info!("Document {} verified: {}", document_id, status)
            },
            _ => log::warn!("Document {} verified: {} ({})", document_id, status, message),
        }

        Ok(VerificationResult {
            document_id: document_id.to_string(),
            status,
            message,
            original_hash: record.original_hash,
            uploaded_hash,
            signature_valid,
            hash_match,
            verified_at: Utc::now(),
        })
    }

    /// Verify the stored signature over the stored original hash.
    ///
    /// Crypto and validation failures mean the record is not trustworthy and
    /// are reported as `false`; anything else (no key installed) propagates.
    fn check_signature(&self, record: &DocumentRecord) -> Result<(bool, Option<String>)> {
        if record.signature.hash != record.original_hash {
            log::warn!(
                "Record {} signature covers {} but original hash is {}",
                record.document_id,
                record.signature.hash,
                record.original_hash
            );
            return Ok((false, Some("signature covers a different hash".to_string())));
        }

        match self
            .signatures
            .verify_signature(record.original_hash.as_ref(), &record.signature)
        {
            Ok(()) => Ok((true, None)),
            Err(e) if matches!(e.kind(), ErrorKind::Crypto | ErrorKind::Validation) => {
                log::warn!("Signature check failed for {}: {}", record.document_id, e);
                Ok((false, Some(e.to_string())))
            },
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("signatures", &self.signatures)
            .field("max_document_size", &self.max_document_size)
            .finish_non_exhaustive()
    }
}

fn describe(status: VerificationStatus, failure: Option<&str>) -> String {
    match status {
        VerificationStatus::Valid => {
            "Document is authentic and unchanged since signing".to_string()
        },
        VerificationStatus::Modified => {
            "Signature is authentic but the document content differs from what was signed"
                .to_string()
        },
        VerificationStatus::Invalid => match failure {
            Some(reason) => format!("Stored signature is not valid: {}", reason),
            None => "Stored signature is not valid".to_string(),
        },
        VerificationStatus::Pending => "Verification has not run".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::QrPayload;
    use crate::keys::{KeyManager, KeyMaterial, KeyPair};
    use crate::store::{MemoryStore, RecordMetadata};

    const ISSUER_PKCS1: &str = include_str!("../tests/fixtures/issuer_pkcs1.pem");
    const STUB: &[u8] = b"%PDF-1.4\n<<stub>>";

    fn signatures() -> SignatureService {
        let pair = KeyPair::from_material(&KeyMaterial::new(ISSUER_PKCS1, None)).unwrap();
        SignatureService::new(Arc::new(KeyManager::with_key_pair(pair).unwrap()))
    }

    fn engine_with(
        signatures: &SignatureService,
        original: &[u8],
    ) -> (VerificationEngine, Arc<MemoryStore>) {
        engine_with_tampered(signatures, original, |_| {})
    }

    fn engine_with_tampered(
        signatures: &SignatureService,
        original: &[u8],
        tamper: impl FnOnce(&mut DocumentRecord),
    ) -> (VerificationEngine, Arc<MemoryStore>) {
        let hash = SignatureService::calculate_document_hash(original);
        let signature = signatures.sign_document(hash.as_ref()).unwrap();
        let mut record = DocumentRecord {
            document_id: "doc-1".to_string(),
            original_hash: hash,
            qr_payload: QrPayload::for_signature("doc-1", &signature),
            metadata: RecordMetadata {
                issuer: "Registrar".to_string(),
                title: "Stub".to_string(),
                key_id: signature.key_id.clone(),
                created_at: Utc::now(),
                page_count: 1,
                original_size: original.len(),
                stamped_hash: None,
            },
            signature,
        };
        tamper(&mut record);
        let store = Arc::new(MemoryStore::new());
        store.save(&record).unwrap();
        let engine =
            VerificationEngine::new(signatures.clone(), store.clone(), &SealConfig::default());
        (engine, store)
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(VerificationStatus::classify(true, true), VerificationStatus::Valid);
        assert_eq!(VerificationStatus::classify(true, false), VerificationStatus::Modified);
        assert_eq!(VerificationStatus::classify(false, true), VerificationStatus::Invalid);
        assert_eq!(VerificationStatus::classify(false, false), VerificationStatus::Invalid);
        assert!(!VerificationStatus::Pending.is_terminal());
    }

    #[test]
    fn test_unmodified_is_valid() {
        let (engine, _) = engine_with(&signatures(), STUB);
        let result = engine.verify("doc-1", STUB).unwrap();
        assert_eq!(result.status, VerificationStatus::Valid);
        assert!(result.signature_valid && result.hash_match);
        assert_eq!(result.original_hash, result.uploaded_hash);
    }

    #[test]
    fn test_appended_byte_is_modified() {
        let (engine, _) = engine_with(&signatures(), STUB);
        let mut candidate = STUB.to_vec();
        candidate.push(b'\n');
        let result = engine.verify("doc-1", &candidate).unwrap();
        assert_eq!(result.status, VerificationStatus::Modified);
        assert!(result.signature_valid);
        assert!(!result.hash_match);
    }

    #[test]
    fn test_corrupted_signature_is_invalid() {
        let (engine, _) = engine_with_tampered(&signatures(), STUB, |record| {
            record.signature.signature[0] ^= 0x01;
        });
        let result = engine.verify("doc-1", STUB).unwrap();
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert!(result.hash_match);
        assert!(!result.signature_valid);
    }

    #[test]
    fn test_signature_over_other_hash_is_invalid() {
        let (engine, _) = engine_with_tampered(&signatures(), STUB, |record| {
            record.original_hash = SignatureService::calculate_document_hash(b"forged");
        });
        let result = engine.verify("doc-1", b"forged").unwrap();
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert!(result.hash_match);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (engine, _) = engine_with(&signatures(), STUB);
        assert!(matches!(engine.verify("doc-2", STUB), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let signatures = signatures();
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let engine = VerificationEngine::new(
            signatures,
            store,
            &SealConfig::default().with_max_document_size(8),
        );
        assert!(matches!(engine.verify("doc-1", b""), Err(Error::Validation(_))));
        assert!(matches!(engine.verify("", STUB), Err(Error::Validation(_))));
        assert!(matches!(
            engine.verify("doc-1", STUB),
            Err(Error::DocumentTooLarge { .. })
        ));
    }

    #[test]
    fn test_no_key_installed_propagates() {
        let (_, store) = engine_with(&signatures(), STUB);
        let keyless = SignatureService::new(Arc::new(KeyManager::new()));
        let engine = VerificationEngine::new(keyless, store, &SealConfig::default());
        // The record's key id is unknown to an empty manager.
        let err = engine.verify("doc-1", STUB).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&VerificationStatus::Modified).unwrap(), "\"MODIFIED\"");
        assert_eq!(VerificationStatus::Invalid.to_string(), "INVALID");
    }
}
