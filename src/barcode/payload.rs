//! Verification payload carried by the QR code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::signatures::{DocumentHash, SignatureRecord};

/// What a verifier needs to look a document up: its id, the hash recorded
/// at signing time, a reference to the signature, and when it was signed.
///
/// Encoded as a JSON object; optional fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    /// Document identifier
    pub document_id: String,
    /// Hash recorded at signing time
    pub hash: DocumentHash,
    /// Short reference to the signature (hex of its first 16 bytes)
    pub signature_ref: String,
    /// Signing time
    pub timestamp: DateTime<Utc>,
    /// Issuer name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Where the document can be verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_url: Option<String>,
}

impl QrPayload {
    /// Build the payload for a freshly signed document.
    pub fn for_signature(document_id: impl Into<String>, record: &SignatureRecord) -> Self {
        Self {
            document_id: document_id.into(),
            hash: record.hash,
            signature_ref: record.reference(),
            timestamp: record.signed_at,
            issuer: None,
            verify_url: None,
        }
    }

    /// Set the issuer name.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the verification URL. The document id is appended as a path segment.
    pub fn with_verify_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.verify_url = Some(format!("{}/{}", base, self.document_id));
        self
    }

    /// Encode as compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON. Malformed input is a validation error.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("Invalid QR payload: {}", e)))
    }
}
