//! RSA key material: parsing, generation, identity and the self-test gate.

use chrono::{DateTime, Utc};
use pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, LineEnding};
use pkcs8::DecodePrivateKey;
use rand::rngs::OsRng;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use signature::hazmat::{PrehashVerifier, RandomizedPrehashSigner};
use signature::SignatureEncoding;
use spki::{DecodePublicKey, EncodePublicKey};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::utils::bytes_to_hex;

/// Smallest accepted RSA modulus, in bits.
pub const MIN_KEY_BITS: usize = 2048;

/// Modulus length used when no size is requested.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Label of the key algorithm.
pub const KEY_ALGORITHM: &str = "RSA";

/// Label of the signature scheme.
pub const SIGNATURE_ALGORITHM: &str = "RSASSA-PSS-SHA256";

/// Message signed and verified before any key pair is installed.
const SELF_TEST_MESSAGE: &[u8] = b"pdf_seal key self-test: sign then verify";

/// PEM-encoded key material as supplied by an operator.
///
/// The public half is optional; it is derived from the private key when absent.
pub struct KeyMaterial {
    /// PEM private key, PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`)
    pub private_pem: Zeroizing<String>,
    /// PEM public key, SubjectPublicKeyInfo (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`)
    pub public_pem: Option<String>,
}

impl KeyMaterial {
    /// Wrap PEM strings.
    pub fn new(private_pem: impl Into<String>, public_pem: Option<String>) -> Self {
        Self {
            private_pem: Zeroizing::new(private_pem.into()),
            public_pem,
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_pem", &"[REDACTED]")
            .field("public_pem", &self.public_pem.as_ref().map(|p| format!("{} bytes", p.len())))
            .finish()
    }
}

/// A freshly generated key pair in PEM form. Not installed anywhere.
pub struct GeneratedKeyPair {
    /// PKCS#1 PEM private key
    pub private_pem: Zeroizing<String>,
    /// SubjectPublicKeyInfo PEM public key
    pub public_pem: String,
    /// Identifier derived from the public key
    pub key_id: String,
    /// Modulus length
    pub bits: usize,
}

impl GeneratedKeyPair {
    /// Convert into material for
    /// [`KeyManager::rotate_keys`](super::KeyManager::rotate_keys).
    pub fn into_material(self) -> KeyMaterial {
        KeyMaterial {
            private_pem: self.private_pem,
            public_pem: Some(self.public_pem),
        }
    }
}

impl std::fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("private_pem", &"[REDACTED]")
            .field("key_id", &self.key_id)
            .field("bits", &self.bits)
            .finish()
    }
}

/// An RSA key pair ready for signing.
///
/// Immutable once built; rotation replaces the whole value.
pub struct KeyPair {
    signing_key: BlindedSigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    key_id: String,
    created_at: DateTime<Utc>,
    algorithm: &'static str,
}

impl KeyPair {
    /// Build a key pair from PEM material.
    pub fn from_material(material: &KeyMaterial) -> Result<Self> {
        let private = parse_private_key_pem(&material.private_pem)?;
        let public = match &material.public_pem {
            Some(pem) => Some(parse_public_key_pem(pem)?),
            None => None,
        };
        Self::from_parts(private, public)
    }

    /// Build a key pair from parsed keys, deriving the public key if absent.
    ///
    /// No validation is performed here; see [`KeyPair::validate`].
    pub fn from_parts(private: RsaPrivateKey, public: Option<RsaPublicKey>) -> Result<Self> {
        let public = public.unwrap_or_else(|| private.to_public_key());
        let key_id = derive_key_id(&public)?;
        Ok(Self {
            signing_key: BlindedSigningKey::new(private),
            verifying_key: VerifyingKey::new(public),
            key_id,
            created_at: Utc::now(),
            algorithm: KEY_ALGORITHM,
        })
    }

    /// Generate a new key pair with a modulus of `bits` bits.
    pub fn generate(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(Error::KeyTooShort {
                bits,
                minimum: MIN_KEY_BITS,
            });
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits)?;
        Self::from_parts(private, None)
    }

    /// Identifier derived from the public key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// When this pair was loaded or generated.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Key algorithm label.
    pub fn algorithm(&self) -> &'static str {
        self.algorithm
    }

    /// Modulus length in bits.
    pub fn bits(&self) -> usize {
        self.public_key().n().bits()
    }

    /// The public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        self.verifying_key.as_ref()
    }

    /// The public half as SubjectPublicKeyInfo PEM.
    pub fn public_pem(&self) -> Result<String> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))
    }

    /// Run every installation check against this pair.
    ///
    /// Fails if the modulus is shorter than `min_bits` (never below
    /// [`MIN_KEY_BITS`]), if the public modulus or exponent differ from the
    /// private key's, if the private key is internally inconsistent, or if
    /// signing and verifying a fixed self-test message fails.
    pub fn validate(&self, min_bits: usize) -> Result<()> {
        let minimum = min_bits.max(MIN_KEY_BITS);
        let private: &RsaPrivateKey = self.signing_key.as_ref();
        let public = self.public_key();

        let bits = private.n().bits();
        if bits < minimum {
            return Err(Error::KeyTooShort { bits, minimum });
        }
        if private.n() != public.n() {
            return Err(Error::Crypto("Public key modulus does not match private key".to_string()));
        }
        if private.e() != public.e() {
            return Err(Error::Crypto(
                "Public key exponent does not match private key".to_string(),
            ));
        }
        private
            .validate()
            .map_err(|e| Error::Crypto(format!("Private key is inconsistent: {}", e)))?;

        let digest = Sha256::digest(SELF_TEST_MESSAGE);
        let signature = self.sign_digest(&digest)?;
        self.verify_digest(&digest, &signature)
            .map_err(|e| Error::Crypto(format!("Key self-test failed: {}", e)))
    }

    /// Produce a randomized PSS signature over a SHA-256 digest.
    pub(crate) fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self
            .signing_key
            .sign_prehash_with_rng(&mut OsRng, digest)
            .map_err(|e| Error::Crypto(format!("Signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }

    /// Verify a PSS signature over a SHA-256 digest with this pair's public key.
    pub(crate) fn verify_digest(&self, digest: &[u8], signature: &[u8]) -> Result<()> {
        verify_digest_with(&self.verifying_key, digest, signature)
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey<Sha256> {
        &self.verifying_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"[REDACTED]")
            .field("key_id", &self.key_id)
            .field("bits", &self.bits())
            .field("created_at", &self.created_at)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Verify a PSS signature over a SHA-256 digest.
pub(crate) fn verify_digest_with(
    key: &VerifyingKey<Sha256>,
    digest: &[u8],
    signature: &[u8],
) -> Result<()> {
    let signature = Signature::try_from(signature)
        .map_err(|e| Error::Crypto(format!("Malformed signature: {}", e)))?;
    key.verify_prehash(digest, &signature)
        .map_err(|_| Error::Crypto("Signature does not match digest".to_string()))
}

/// Parse a PEM private key, trying PKCS#1 first and PKCS#8 second.
pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey> {
    let pem = pem.trim();
    match RsaPrivateKey::from_pkcs1_pem(pem) {
        Ok(key) => Ok(key),
        Err(pkcs1_err) => {
            log::debug!("PKCS#1 private key parse failed ({}), trying PKCS#8", pkcs1_err);
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|pkcs8_err| {
                Error::Configuration(format!(
                    "Private key is neither PKCS#1 ({}) nor PKCS#8 ({})",
                    pkcs1_err, pkcs8_err
                ))
            })
        },
    }
}

/// Parse a PEM public key (SubjectPublicKeyInfo, falling back to PKCS#1).
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|spki_err| {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| {
                Error::Configuration(format!("Public key could not be parsed: {}", spki_err))
            })
        })
}

/// Derive a key id: lowercase hex SHA-256 of the DER SubjectPublicKeyInfo.
pub fn derive_key_id(public: &RsaPublicKey) -> Result<String> {
    let der = public
        .to_public_key_der()
        .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))?;
    Ok(bytes_to_hex(&Sha256::digest(der.as_bytes())))
}

/// Generate a PEM key pair without installing it.
pub fn generate_key_pair(bits: usize) -> Result<GeneratedKeyPair> {
    let pair = KeyPair::generate(bits)?;
    let private: &RsaPrivateKey = pair.signing_key.as_ref();
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| Error::Crypto(format!("Failed to encode private key: {}", e)))?;
    Ok(GeneratedKeyPair {
        private_pem: Zeroizing::new(private_pem.as_str().to_string()),
        public_pem: pair.public_pem()?,
        key_id: pair.key_id.clone(),
        bits: pair.bits(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER_PKCS1: &str = include_str!("../../tests/fixtures/issuer_pkcs1.pem");
    const ISSUER_PKCS8: &str = include_str!("../../tests/fixtures/issuer_pkcs8.pem");
    const ISSUER_PUBLIC: &str = include_str!("../../tests/fixtures/issuer_public.pem");
    const OTHER_PUBLIC: &str = include_str!("../../tests/fixtures/other_public.pem");
    const WEAK_1024: &str = include_str!("../../tests/fixtures/weak_1024.pem");
    const SHORT_2047: &str = include_str!("../../tests/fixtures/short_2047.pem");

    #[test]
    fn test_parse_pkcs1_and_pkcs8_agree() {
        let a = parse_private_key_pem(ISSUER_PKCS1).unwrap();
        let b = parse_private_key_pem(ISSUER_PKCS8).unwrap();
        assert_eq!(a.n(), b.n());
    }

    #[test]
    fn test_parse_private_rejects_garbage() {
        let err = parse_private_key_pem("-----BEGIN NOTHING-----\nAAAA\n-----END NOTHING-----")
            .unwrap_err();
        assert!(err.to_string().contains("PKCS#8"));
    }

    #[test]
    fn test_derived_public_key_matches_file() {
        let derived = KeyPair::from_material(&KeyMaterial::new(ISSUER_PKCS1, None)).unwrap();
        let explicit =
            KeyPair::from_material(&KeyMaterial::new(ISSUER_PKCS1, Some(ISSUER_PUBLIC.into())))
                .unwrap();
        assert_eq!(derived.key_id(), explicit.key_id());
    }

    #[test]
    fn test_key_id_is_deterministic() {
        let public = parse_public_key_pem(ISSUER_PUBLIC).unwrap();
        let first = derive_key_id(&public).unwrap();
        let second = derive_key_id(&public).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let other = derive_key_id(&parse_public_key_pem(OTHER_PUBLIC).unwrap()).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_validate_accepts_matching_pair() {
        let pair =
            KeyPair::from_material(&KeyMaterial::new(ISSUER_PKCS8, Some(ISSUER_PUBLIC.into())))
                .unwrap();
        pair.validate(MIN_KEY_BITS).unwrap();
        assert_eq!(pair.bits(), 2048);
        assert_eq!(pair.algorithm(), "RSA");
    }

    #[test]
    fn test_validate_rejects_mismatched_public_key() {
        let pair =
            KeyPair::from_material(&KeyMaterial::new(ISSUER_PKCS1, Some(OTHER_PUBLIC.into())))
                .unwrap();
        let err = pair.validate(MIN_KEY_BITS).unwrap_err();
        assert!(err.to_string().contains("modulus"));
    }

    #[test]
    fn test_validate_rejects_short_key() {
        let pair = KeyPair::from_material(&KeyMaterial::new(WEAK_1024, None)).unwrap();
        assert!(matches!(
            pair.validate(MIN_KEY_BITS),
            Err(Error::KeyTooShort { bits: 1024, minimum: 2048 })
        ));
    }

    #[test]
    fn test_bits_counts_the_modulus_not_its_bytes() {
        let pair = KeyPair::from_material(&KeyMaterial::new(SHORT_2047, None)).unwrap();
        assert_eq!(pair.bits(), 2047);
        assert!(matches!(
            pair.validate(MIN_KEY_BITS),
            Err(Error::KeyTooShort { bits: 2047, minimum: 2048 })
        ));
    }

    #[test]
    fn test_min_bits_cannot_be_lowered() {
        let pair = KeyPair::from_material(&KeyMaterial::new(WEAK_1024, None)).unwrap();
        assert!(pair.validate(512).is_err());
    }

    #[test]
    fn test_generate_rejects_short_modulus() {
        assert!(matches!(generate_key_pair(1024), Err(Error::KeyTooShort { .. })));
        assert!(matches!(KeyPair::generate(2047), Err(Error::KeyTooShort { .. })));
    }

    #[test]
    fn test_debug_redacts_private_material() {
        let material = KeyMaterial::new(ISSUER_PKCS1, None);
        let debug = format!("{:?}", material);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("BEGIN"));

        let pair = KeyPair::from_material(&material).unwrap();
        assert!(format!("{:?}", pair).contains("[REDACTED]"));
    }
}
