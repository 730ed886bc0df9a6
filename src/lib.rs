// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF Seal
//!
//! Sign PDF documents, stamp them with a verification QR code, and later
//! classify submitted copies as authentic, modified, or invalid.
//!
//! ## Core Features
//!
//! - **Key lifecycle**: RSA key pairs loaded from the environment or PEM
//!   files, validated with a sign/verify self-test, rotated atomically
//! - **Signatures**: SHA-256 document hashes signed with RSASSA-PSS
//! - **QR codes**: JSON verification payloads rendered as PNG, optionally
//!   with a centre label at high error correction
//! - **Stamping**: every page copied into a new document, QR drawn on the
//!   last page, behind a swappable PDF engine
//! - **Verification**: VALID / MODIFIED / INVALID classification anchored
//!   on the stored signature
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pdf_seal::{Notary, SealConfig};
//! use pdf_seal::store::JsonFileStore;
//!
//! # fn main() -> pdf_seal::Result<()> {
//! let store = Arc::new(JsonFileStore::open("records")?);
//! let notary = Notary::from_config(SealConfig::from_env()?, store)?;
//!
//! let pdf = std::fs::read("transcript.pdf")?;
//! let signed = notary.sign_pdf(&pdf, "Registrar", "Transcript")?;
//! std::fs::write("transcript.signed.pdf", &signed.signed_bytes)?;
//!
//! let result = notary.verify_pdf(&signed.document_id, &pdf)?;
//! println!("{}: {}", result.status, result.message);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Stamp placement
pub mod geometry;

// Key management
pub mod keys;

// Hashing and signatures
pub mod signatures;

// QR verification codes
pub mod barcode;

// PDF engine capability
pub mod pdf;

// Document records
pub mod store;

// Signing pipeline
pub mod signer;

// Tamper classification
pub mod verification;

// High-level API
pub mod notary;

// Internal utilities
pub(crate) mod utils;

// Re-exports
pub use config::SealConfig;
pub use error::{Error, ErrorKind, Result};
pub use notary::Notary;
pub use signer::{DocumentSigner, SignRequest, SignedDocument};
pub use verification::{VerificationEngine, VerificationResult, VerificationStatus};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
