//! Signing key management.
//!
//! Key material is loaded (environment first, then PEM files), validated by
//! a mandatory gate, and installed as an immutable [`KeyPair`] that the
//! [`KeyManager`] swaps atomically on rotation.
//!
//! ## Accepted formats
//!
//! - Private keys: PEM, PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`)
//! - Public keys: PEM, SubjectPublicKeyInfo (`PUBLIC KEY`) or PKCS#1
//! - Environment variables: PEM text, or base64 of PEM text
//!
//! ## Validation gate
//!
//! A pair is installed only if its modulus is at least 2048 bits, the public
//! modulus and exponent match the private key, and a sign-then-verify
//! self-test over a fixed message succeeds.
//!
//! ## Erasure
//!
//! Retired and cleared private keys are zeroized when dropped. This is
//! best-effort: copies left behind by moves or the allocator cannot be
//! reached.

mod manager;
mod material;
mod source;

pub use manager::KeyManager;
pub use material::{
    derive_key_id, generate_key_pair, parse_private_key_pem, parse_public_key_pem,
    GeneratedKeyPair, KeyMaterial, KeyPair, DEFAULT_KEY_BITS, KEY_ALGORITHM, MIN_KEY_BITS,
    SIGNATURE_ALGORITHM,
};
pub(crate) use material::verify_digest_with;
pub use source::{write_key_files, KeySource};
