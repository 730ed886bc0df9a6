//! Signing and stamping PDF documents.
//!
//! [`DocumentSigner::sign`] validates the upload, hashes and signs it,
//! renders the verification QR code, and stamps that code onto the last page
//! of a copy of the document. The hash and signature always cover the
//! original bytes, never the stamped output.

use crate::barcode::{QrCodec, QrPayload};
use crate::config::SealConfig;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::pdf::{LopdfEngine, PageBox, PdfEngine, StampImage, PDF_HEADER};
use crate::signatures::{DocumentHash, SignatureRecord, SignatureService};

/// Per-document signing options.
#[derive(Debug, Clone, Default)]
pub struct SignRequest {
    /// Document id; a random UUID is assigned when absent
    pub document_id: Option<String>,
    /// Issuer embedded in the QR payload
    pub issuer: Option<String>,
    /// Stamp rectangle on the last page, overriding configuration
    pub stamp_rect: Option<Rect>,
    /// QR centre label, overriding configuration
    pub label: Option<String>,
}

impl SignRequest {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-chosen document id.
    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    /// Record an issuer in the QR payload.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Stamp at `rect` instead of the configured position.
    pub fn with_stamp_rect(mut self, rect: Rect) -> Self {
        self.stamp_rect = Some(rect);
        self
    }

    /// Draw `label` in the centre of the QR code.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Output of a successful signing.
#[derive(Clone)]
pub struct SignedDocument {
    /// Document id the record is stored under
    pub document_id: String,
    /// Stamped PDF
    pub signed_bytes: Vec<u8>,
    /// Hash of the original upload
    pub hash: DocumentHash,
    /// Signature over `hash`
    pub signature: SignatureRecord,
    /// QR code PNG drawn onto the last page
    pub qr_png: Vec<u8>,
    /// Payload encoded in the QR code
    pub payload: QrPayload,
    /// Pages in the document
    pub page_count: usize,
    /// Where the stamp was drawn on the last page
    pub stamp_rect: Rect,
}

impl std::fmt::Debug for SignedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedDocument")
            .field("document_id", &self.document_id)
            .field("signed_bytes", &format!("{} bytes", self.signed_bytes.len()))
            .field("hash", &self.hash)
            .field("signature", &self.signature)
            .field("qr_png", &format!("{} bytes", self.qr_png.len()))
            .field("page_count", &self.page_count)
            .field("stamp_rect", &self.stamp_rect)
            .finish()
    }
}

/// Signs PDF uploads and stamps them with a verification QR code.
pub struct DocumentSigner<E: PdfEngine = LopdfEngine> {
    engine: E,
    signatures: SignatureService,
    codec: QrCodec,
    config: SealConfig,
}

impl DocumentSigner<LopdfEngine> {
    /// Signer using the built-in `lopdf` engine.
    pub fn with_default_engine(signatures: SignatureService, config: SealConfig) -> Result<Self> {
        Self::new(LopdfEngine::new(), signatures, config)
    }
}

impl<E: PdfEngine> DocumentSigner<E> {
    /// Create a signer.
    ///
    /// Fails with a `Configuration` error if `engine` reports itself
    /// unavailable; malformed input is only detected per document.
    pub fn new(engine: E, signatures: SignatureService, config: SealConfig) -> Result<Self> {
        engine.availability()?;
        log::debug!("Document signer using PDF engine {}", engine.name());
        Ok(Self {
            engine,
            codec: QrCodec::new(config.qr.clone()),
            signatures,
            config,
        })
    }

    /// The PDF engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Check that `bytes` are an acceptable PDF and parse them.
    ///
    /// Rejects empty input, input over the size limit, input without the
    /// `%PDF-` header and input the engine cannot parse, in that order. No
    /// hashing happens before this passes.
    pub fn validate_pdf(&self, bytes: &[u8]) -> Result<E::Document> {
        if bytes.is_empty() {
            return Err(Error::Validation("Document is empty".to_string()));
        }
        if bytes.len() > self.config.max_document_size {
            return Err(Error::DocumentTooLarge {
                size: bytes.len(),
                limit: self.config.max_document_size,
            });
        }
        if !bytes.starts_with(PDF_HEADER) {
            let found = &bytes[..bytes.len().min(PDF_HEADER.len())];
            return Err(Error::InvalidHeader(String::from_utf8_lossy(found).into_owned()));
        }
        self.engine.load(bytes)
    }

    /// Sign `bytes` and return the stamped document with its hash,
    /// signature and QR code.
    pub fn sign(&self, bytes: &[u8], request: &SignRequest) -> Result<SignedDocument> {
        let source = self.validate_pdf(bytes)?;
        let page_count = self.engine.page_count(&source);

        let hash = SignatureService::calculate_document_hash(bytes);
        let signature = self.signatures.sign_document(hash.as_ref())?;

        let document_id = request
            .document_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let payload = self.build_payload(&document_id, &signature, request);

        let label = request.label.as_deref().or(self.config.qr_label.as_deref());
        let qr_png = match label {
            Some(label) => self.codec.generate_qr_code_with_label(&payload, label)?,
            None => self.codec.generate_qr_code(&payload)?,
        };
        let stamp = StampImage::from_png(&qr_png)?;

        let last_page = page_count.saturating_sub(1);
        let mut output = self.engine.copy_pages(&source)?;
        let page = self.engine.page_box(&output, last_page)?;
        let stamp_rect = self.stamp_rect(&page, request);
        self.engine.draw_image(&mut output, last_page, &stamp, stamp_rect)?;
        let signed_bytes = self.engine.serialize(&mut output)?;

        log::info!(
            "Signed document {} ({} pages, hash {}, key {})",
            document_id,
            page_count,
            hash,
            signature.key_id
        );

        Ok(SignedDocument {
            document_id,
            signed_bytes,
            hash,
            signature,
            qr_png,
            payload,
            page_count,
            stamp_rect,
        })
    }

    fn build_payload(
        &self,
        document_id: &str,
        signature: &SignatureRecord,
        request: &SignRequest,
    ) -> QrPayload {
        let mut payload = QrPayload::for_signature(document_id, signature);
        if let Some(issuer) = request.issuer.as_deref().filter(|s| !s.trim().is_empty()) {
            payload = payload.with_issuer(issuer);
        }
        if let Some(url) = &self.config.verification_url {
            payload = payload.with_verify_url(url);
        }
        payload
    }

    /// Request rectangle, then configured rectangle, then the bottom-right
    /// corner of the visible page area as displayed.
    fn stamp_rect(&self, page: &PageBox, request: &SignRequest) -> Rect {
        request
            .stamp_rect
            .or(self.config.stamp_rect)
            .unwrap_or_else(|| {
                page.bottom_right_square(self.config.stamp_size, self.config.stamp_margin)
            })
    }
}

impl<E: PdfEngine + std::fmt::Debug> std::fmt::Debug for DocumentSigner<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSigner")
            .field("engine", &self.engine)
            .field("signatures", &self.signatures)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
