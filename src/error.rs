//! Error types for the signing and verification engine.
//!
//! Every failure the engine can report is a variant of [`Error`]. Variants are
//! grouped into coarse [`ErrorKind`]s so that callers can route failures
//! (reject the request, page an operator, write an audit entry) without
//! matching every variant.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid keys, unavailable PDF engine, bad settings.
    /// Fatal to the signing subsystem.
    Configuration,
    /// Malformed, oversized or non-PDF input, empty digests.
    Validation,
    /// Signature or key-pair mismatch. Audit-worthy.
    Crypto,
    /// Unknown document id.
    NotFound,
    /// The PDF engine could not perform an operation on otherwise valid input.
    Capability,
    /// The caller cancelled the record lookup or its deadline passed.
    Cancelled,
    /// The external record store failed.
    Store,
    /// Filesystem failure.
    Io,
}

impl ErrorKind {
    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// The engine never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Store | ErrorKind::Io | ErrorKind::Cancelled)
    }

    /// Whether the failure should be recorded in an audit trail.
    pub fn is_audit_worthy(&self) -> bool {
        matches!(self, ErrorKind::Crypto | ErrorKind::Configuration)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::Crypto => "crypto",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Capability => "capability",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Store => "store",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Error types that can occur while signing or verifying documents.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Missing or unusable configuration (keys, PDF engine, settings)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Key shorter than the accepted minimum
    #[error("Key too short: {bits} bits (minimum {minimum})")]
    KeyTooShort {
        /// Modulus length of the rejected key
        bits: usize,
        /// Minimum accepted modulus length
        minimum: usize,
    },

    /// Input rejected before processing
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Document exceeds the configured size limit
    #[error("Document too large: {size} bytes (limit {limit})")]
    DocumentTooLarge {
        /// Size of the submitted document
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Signature or key mismatch
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// No record for the given document id
    #[error("Document not found: {0}")]
    NotFound(String),

    /// PDF engine cannot perform the requested operation
    #[error("PDF capability error: {0}")]
    Capability(String),

    /// Record lookup was cancelled or timed out
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Record store failure
    #[error("Record store error: {0}")]
    Store(String),

    /// QR code encoding error
    #[error("Barcode error: {0}")]
    Barcode(String),

    /// Image encoding/decoding error
    #[error("Image error: {0}")]
    Image(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::KeyTooShort { .. } => ErrorKind::Configuration,
            Error::Validation(_) | Error::InvalidHeader(_) | Error::DocumentTooLarge { .. } => {
                ErrorKind::Validation
            },
            Error::Crypto(_) => ErrorKind::Crypto,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Capability(_) | Error::Barcode(_) | Error::Image(_) => ErrorKind::Capability,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Store(_) | Error::Json(_) => ErrorKind::Store,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Error::Crypto(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_error() {
        let err = Error::InvalidHeader("GIF89".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid PDF header"));
        assert!(msg.contains("GIF89"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_document_too_large_error() {
        let err = Error::DocumentTooLarge {
            size: 2048,
            limit: 1024,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_key_too_short_is_configuration() {
        let err = Error::KeyTooShort {
            bits: 1024,
            minimum: 2048,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("1024 bits"));
    }

    #[test]
    fn test_capability_distinct_from_validation() {
        let capability = Error::Capability("licence limit reached".to_string());
        let validation = Error::Validation("not a PDF".to_string());
        assert_ne!(capability.kind(), validation.kind());
    }

    #[test]
    fn test_kind_policies() {
        assert!(ErrorKind::Crypto.is_audit_worthy());
        assert!(!ErrorKind::Validation.is_audit_worthy());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(ErrorKind::Store.is_retryable());
        assert_eq!(ErrorKind::NotFound.to_string(), "not-found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.pem");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
