//! Document hashing and detached signatures.
//!
//! Documents are hashed with SHA-256 over their exact bytes, and the digest
//! is signed with RSASSA-PSS using the installed key pair.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pdf_seal::keys::KeyManager;
//! use pdf_seal::signatures::SignatureService;
//!
//! let keys = Arc::new(KeyManager::from_config(&Default::default())?);
//! let service = SignatureService::new(keys);
//!
//! let hash = SignatureService::calculate_document_hash(&pdf_bytes);
//! let record = service.sign_document(hash.as_ref())?;
//! service.verify_signature(hash.as_ref(), &record)?;
//! ```

mod service;
mod types;

pub use service::SignatureService;
pub use types::{DocumentHash, SignatureRecord, HASH_LEN};
