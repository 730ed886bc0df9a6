//! Signing and verification entry points.

use std::sync::Arc;

use chrono::Utc;

use crate::config::SealConfig;
use crate::error::Result;
use crate::keys::{KeyManager, KeyMaterial, KeySource};
use crate::pdf::{LopdfEngine, PdfEngine};
use crate::signatures::SignatureService;
use crate::signer::{DocumentSigner, SignRequest, SignedDocument};
use crate::store::{DocumentRecord, DocumentStore, LookupContext, RecordMetadata};
use crate::verification::{VerificationEngine, VerificationResult};

/// Signs documents, records them, and verifies submitted copies.
///
/// Ties a [`KeyManager`], a [`DocumentSigner`], a [`VerificationEngine`] and
/// a [`DocumentStore`] together. All collaborators are passed in; nothing is
/// global.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use pdf_seal::{Notary, SealConfig, store::MemoryStore};
///
/// let notary = Notary::from_config(SealConfig::from_env()?, Arc::new(MemoryStore::new()))?;
/// let signed = notary.sign_pdf(&pdf_bytes, "Registrar", "Transcript")?;
/// let result = notary.verify_pdf(&signed.document_id, &pdf_bytes)?;
/// assert!(result.is_valid());
/// ```
pub struct Notary<E: PdfEngine = LopdfEngine> {
    keys: Arc<KeyManager>,
    signer: DocumentSigner<E>,
    verifier: VerificationEngine,
    store: Arc<dyn DocumentStore>,
    config: SealConfig,
}

impl Notary<LopdfEngine> {
    /// Load keys as configured and build a notary on the `lopdf` engine.
    ///
    /// Key loading failures are `Configuration` errors; the caller decides
    /// whether they are fatal.
    pub fn from_config(config: SealConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let keys = Arc::new(KeyManager::from_config(&config)?);
        Self::with_engine(LopdfEngine::new(), keys, store, config)
    }

    /// Build a notary on the `lopdf` engine with an existing key manager.
    pub fn new(
        keys: Arc<KeyManager>,
        store: Arc<dyn DocumentStore>,
        config: SealConfig,
    ) -> Result<Self> {
        Self::with_engine(LopdfEngine::new(), keys, store, config)
    }
}

impl<E: PdfEngine> Notary<E> {
    /// Build a notary on a specific PDF engine.
    pub fn with_engine(
        engine: E,
        keys: Arc<KeyManager>,
        store: Arc<dyn DocumentStore>,
        config: SealConfig,
    ) -> Result<Self> {
        let signatures = SignatureService::new(Arc::clone(&keys));
        let verifier = VerificationEngine::new(signatures.clone(), Arc::clone(&store), &config);
        let signer = DocumentSigner::new(engine, signatures, config.clone())?;
        Ok(Self {
            keys,
            signer,
            verifier,
            store,
            config,
        })
    }

    /// Sign a PDF for `issuer` and store its record.
    pub fn sign_pdf(&self, bytes: &[u8], issuer: &str, title: &str) -> Result<SignedDocument> {
        self.sign_pdf_with(bytes, title, SignRequest::new().with_issuer(issuer))
    }

    /// Sign with explicit per-document options and store the record.
    pub fn sign_pdf_with(
        &self,
        bytes: &[u8],
        title: &str,
        request: SignRequest,
    ) -> Result<SignedDocument> {
        let signed = self.signer.sign(bytes, &request)?;

        let record = DocumentRecord {
            document_id: signed.document_id.clone(),
            original_hash: signed.hash,
            signature: signed.signature.clone(),
            qr_payload: signed.payload.clone(),
            metadata: RecordMetadata {
                issuer: request.issuer.unwrap_or_default(),
                title: title.to_string(),
                key_id: signed.signature.key_id.clone(),
                created_at: Utc::now(),
                page_count: signed.page_count,
                original_size: bytes.len(),
                stamped_hash: Some(SignatureService::calculate_document_hash(&signed.signed_bytes)),
            },
        };
        self.store.save(&record)?;
        log::info!("Recorded document {} ({:?})", record.document_id, title);

        Ok(signed)
    }

    /// Verify a submitted copy of `document_id`.
    pub fn verify_pdf(&self, document_id: &str, candidate: &[u8]) -> Result<VerificationResult> {
        self.verifier.verify(document_id, candidate)
    }

    /// Verify with a cancellation context for the record lookup.
    pub fn verify_pdf_with_context(
        &self,
        document_id: &str,
        candidate: &[u8],
        ctx: &LookupContext,
    ) -> Result<VerificationResult> {
        self.verifier.verify_with_context(document_id, candidate, ctx)
    }

    /// Load and install keys from the first source that holds one.
    pub fn load_keys(&self, sources: &[KeySource]) -> Result<String> {
        self.keys.load_keys(sources)
    }

    /// Validate and install new key material, retiring the current pair.
    pub fn rotate_keys(&self, material: &KeyMaterial) -> Result<String> {
        self.keys.rotate_keys(material)
    }

    /// Whether the installed key is older than the configured maximum age.
    pub fn rotation_due(&self) -> bool {
        self.keys.should_rotate_key(self.config.key_max_age)
    }

    /// The key manager.
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// The record store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &SealConfig {
        &self.config
    }
}

impl<E: PdfEngine> std::fmt::Debug for Notary<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notary")
            .field("keys", &self.keys)
            .field("verifier", &self.verifier)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
