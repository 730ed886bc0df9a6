//! Installed key pair lifecycle: load, validate, rotate, clear.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Duration, Utc};
use rsa::pss::VerifyingKey;
use sha2::Sha256;

use super::material::{generate_key_pair, GeneratedKeyPair, KeyMaterial, KeyPair, MIN_KEY_BITS};
use super::source::KeySource;
use crate::config::SealConfig;
use crate::error::{Error, Result};

/// Owner of the installed signing key pair.
///
/// The pair is an immutable value behind an `Arc`. Readers clone the `Arc`
/// under a read lock and release the lock before doing any cryptography;
/// rotation validates the candidate first and then swaps the `Arc` under a
/// write lock. A concurrent signer therefore sees either the old pair or
/// the new one, never a mix.
///
/// The public halves of retired pairs are kept so that records signed before
/// a rotation still verify.
pub struct KeyManager {
    current: RwLock<Option<Arc<KeyPair>>>,
    retired: RwLock<HashMap<String, VerifyingKey<Sha256>>>,
    min_bits: usize,
}

impl KeyManager {
    /// Create a manager with no key installed.
    pub fn new() -> Self {
        Self::with_min_bits(MIN_KEY_BITS)
    }

    /// Create an empty manager enforcing `min_bits` (never below 2048).
    pub fn with_min_bits(min_bits: usize) -> Self {
        Self {
            current: RwLock::new(None),
            retired: RwLock::new(HashMap::new()),
            min_bits: min_bits.max(MIN_KEY_BITS),
        }
    }

    /// Create a manager and install `pair` after validating it.
    pub fn with_key_pair(pair: KeyPair) -> Result<Self> {
        let manager = Self::new();
        manager.install(pair)?;
        Ok(manager)
    }

    /// Create a manager from configuration, loading keys from the
    /// environment first and key files second.
    ///
    /// A missing or invalid key is a `Configuration` error; whether that is
    /// fatal is the caller's decision (see [`SealConfig::abort_on_key_failure`]).
    pub fn from_config(config: &SealConfig) -> Result<Self> {
        let manager = Self::with_min_bits(config.min_key_bits);
        manager.load_keys(&KeySource::chain(config))?;
        Ok(manager)
    }

    /// Load from the first source in `sources` that holds a private key,
    /// validate, and install.
    pub fn load_keys(&self, sources: &[KeySource]) -> Result<String> {
        for source in sources {
            let Some(material) = source.read()? else {
                log::debug!("No key material in {}", source.describe());
                continue;
            };
            let pair = KeyPair::from_material(&material)?;
            let key_id = pair.key_id().to_string();
            self.install(pair)?;
            log::info!("Loaded signing key {} from {}", key_id, source.describe());
            return Ok(key_id);
        }

        let tried: Vec<String> = sources.iter().map(KeySource::describe).collect();
        Err(Error::Configuration(format!(
            "No signing key found (tried: {})",
            tried.join(", ")
        )))
    }

    /// Validate `pair` and atomically make it the installed pair.
    ///
    /// On failure the installed pair is untouched.
    pub fn install(&self, pair: KeyPair) -> Result<()> {
        pair.validate(self.min_bits)?;
        let incoming = Arc::new(pair);

        // The outgoing public key is recorded before the new pair becomes
        // visible, so a verifier never finds neither of them.
        let previous = {
            let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(outgoing) = slot.as_ref() {
                self.keep_public_half(outgoing);
            }
            slot.replace(incoming)
        };

        if let Some(previous) = previous {
            Self::release(previous);
        }
        Ok(())
    }

    /// The installed pair.
    pub fn current(&self) -> Result<Arc<KeyPair>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::Configuration("No signing key installed".to_string()))
    }

    /// Re-run the installation checks against the installed pair.
    pub fn validate_keys(&self) -> Result<()> {
        self.current()?.validate(self.min_bits)
    }

    /// Generate a PEM key pair. Nothing is installed.
    pub fn generate_new_key_pair(bits: usize) -> Result<GeneratedKeyPair> {
        let generated = generate_key_pair(bits)?;
        log::info!("Generated {}-bit key pair {}", generated.bits, generated.key_id);
        Ok(generated)
    }

    /// Parse, validate and install `material`, retiring the current pair.
    ///
    /// Returns the id of the newly installed key. On any failure the
    /// installed pair is left in place.
    pub fn rotate_keys(&self, material: &KeyMaterial) -> Result<String> {
        let candidate = KeyPair::from_material(material)?;
        let key_id = candidate.key_id().to_string();
        let previous_id = self.current().ok().map(|pair| pair.key_id().to_string());

        self.install(candidate).map_err(|e| {
            log::warn!("Key rotation rejected: {}", e);
            e
        })?;

        log::info!(
            "Rotated signing key {} -> {}",
            previous_id.as_deref().unwrap_or("<none>"),
            key_id
        );
        Ok(key_id)
    }

    /// Drop the installed pair, erasing its secret components.
    ///
    /// Erasure is best-effort. The private exponent and primes are
    /// overwritten when the last `Arc` to the pair is dropped, which may be
    /// after this call returns if a signer is mid-operation. Copies made by
    /// the allocator or by earlier moves are outside our control.
    pub fn clear_keys(&self) {
        let previous = {
            let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(outgoing) = slot.as_ref() {
                self.keep_public_half(outgoing);
            }
            slot.take()
        };
        if let Some(previous) = previous {
            Self::release(previous);
        }
    }

    /// Time since the installed pair was created or loaded.
    pub fn key_age(&self) -> Option<Duration> {
        self.current().ok().map(|pair| Utc::now() - pair.created_at())
    }

    /// Whether the installed pair is older than `max_age`.
    pub fn should_rotate_key(&self, max_age: Duration) -> bool {
        self.key_age().is_some_and(|age| age > max_age)
    }

    /// Whether a pair is installed.
    pub fn has_keys(&self) -> bool {
        self.current.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Public key for `key_id`, installed or retired.
    pub(crate) fn verifying_key(&self, key_id: &str) -> Option<VerifyingKey<Sha256>> {
        if let Ok(pair) = self.current() {
            if pair.key_id() == key_id {
                return Some(pair.verifying_key().clone());
            }
        }
        self.retired
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key_id)
            .cloned()
    }

    /// Ids of retired keys still accepted for verification.
    pub fn retired_key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .retired
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Stop accepting signatures from a retired key.
    ///
    /// Retired public keys are otherwise kept for the life of the manager.
    /// Records signed under a forgotten key verify as INVALID afterwards.
    /// Returns whether the key was retired.
    pub fn forget_retired_key(&self, key_id: &str) -> bool {
        let removed = self
            .retired
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key_id)
            .is_some();
        if removed {
            log::info!("Forgot retired key {}", key_id);
        }
        removed
    }

    /// Record the public half of a pair that is about to be replaced.
    ///
    /// Called with the `current` write lock held; lock order is always
    /// `current` then `retired`.
    fn keep_public_half(&self, pair: &KeyPair) {
        self.retired
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pair.key_id().to_string(), pair.verifying_key().clone());
    }

    /// Drop a retired pair.
    fn release(pair: Arc<KeyPair>) {
        let key_id = pair.key_id().to_string();
        match Arc::try_unwrap(pair) {
            // Dropping the private key zeroizes its exponent and primes.
            Ok(pair) => {
                drop(pair);
                log::info!("Retired key {} and erased its private components", key_id);
            },
            Err(_) => {
                log::info!(
                    "Retired key {}; private components are erased once in-flight signing ends",
                    key_id
                );
            },
        }
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current().ok().map(|pair| pair.key_id().to_string());
        let retired = self.retired.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("KeyManager")
            .field("current", &current)
            .field("retired", &retired)
            .field("min_bits", &self.min_bits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER_PKCS1: &str = include_str!("../../tests/fixtures/issuer_pkcs1.pem");
    const OTHER_PKCS1: &str = include_str!("../../tests/fixtures/other_pkcs1.pem");
    const OTHER_PUBLIC: &str = include_str!("../../tests/fixtures/other_public.pem");
    const WEAK_1024: &str = include_str!("../../tests/fixtures/weak_1024.pem");

    fn issuer_manager() -> KeyManager {
        let pair = KeyPair::from_material(&KeyMaterial::new(ISSUER_PKCS1, None)).unwrap();
        KeyManager::with_key_pair(pair).unwrap()
    }

    #[test]
    fn test_empty_manager_has_no_keys() {
        let manager = KeyManager::new();
        assert!(!manager.has_keys());
        assert!(manager.validate_keys().is_err());
        assert!(manager.key_age().is_none());
        assert!(!manager.should_rotate_key(Duration::zero()));
    }

    #[test]
    fn test_rotation_installs_new_key() {
        let manager = issuer_manager();
        let old_id = manager.current().unwrap().key_id().to_string();

        let new_id = manager.rotate_keys(&KeyMaterial::new(OTHER_PKCS1, None)).unwrap();
        assert_ne!(old_id, new_id);
        assert_eq!(manager.current().unwrap().key_id(), new_id);
        assert!(manager.verifying_key(&old_id).is_some());
    }

    #[test]
    fn test_failed_rotation_keeps_current_key() {
        let manager = issuer_manager();
        let old_id = manager.current().unwrap().key_id().to_string();

        let weak = manager.rotate_keys(&KeyMaterial::new(WEAK_1024, None));
        assert!(matches!(weak, Err(Error::KeyTooShort { .. })));

        let mismatched =
            manager.rotate_keys(&KeyMaterial::new(ISSUER_PKCS1, Some(OTHER_PUBLIC.into())));
        assert!(mismatched.is_err());

        let garbage = manager.rotate_keys(&KeyMaterial::new("not a key", None));
        assert!(garbage.is_err());

        assert_eq!(manager.current().unwrap().key_id(), old_id);
    }

    #[test]
    fn test_clear_keys() {
        let manager = issuer_manager();
        let key_id = manager.current().unwrap().key_id().to_string();
        manager.clear_keys();
        assert!(!manager.has_keys());
        assert!(manager.current().is_err());
        assert!(manager.verifying_key(&key_id).is_some());
    }

    #[test]
    fn test_key_age() {
        let manager = issuer_manager();
        let age = manager.key_age().unwrap();
        assert!(age >= Duration::zero());
        assert!(!manager.should_rotate_key(Duration::days(90)));
        assert!(manager.should_rotate_key(Duration::milliseconds(-1)));
    }

    #[test]
    fn test_load_keys_reports_sources_tried() {
        let manager = KeyManager::new();
        let sources = vec![KeySource::Files {
            private_path: "/nonexistent/private.pem".into(),
            public_path: "/nonexistent/public.pem".into(),
        }];
        let err = manager.load_keys(&sources).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/private.pem"));
    }

    #[test]
    fn test_concurrent_readers_during_rotation() {
        let manager = Arc::new(issuer_manager());
        let ids: Vec<String> = vec![
            manager.current().unwrap().key_id().to_string(),
            KeyPair::from_material(&KeyMaterial::new(OTHER_PKCS1, None))
                .unwrap()
                .key_id()
                .to_string(),
        ];

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let ids = ids.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let pair = manager.current().unwrap();
                        assert!(ids.iter().any(|id| id == pair.key_id()));
                    }
                })
            })
            .collect();

        manager.rotate_keys(&KeyMaterial::new(OTHER_PKCS1, None)).unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(manager.current().unwrap().key_id(), ids[1]);
    }

    #[test]
    fn test_outgoing_key_resolvable_throughout_rotation() {
        for _ in 0..20 {
            let manager = Arc::new(issuer_manager());
            let old_id = manager.current().unwrap().key_id().to_string();
            let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

            let reader = {
                let manager = Arc::clone(&manager);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    while !done.load(std::sync::atomic::Ordering::Acquire) {
                        assert!(manager.verifying_key(&old_id).is_some());
                    }
                })
            };

            manager.rotate_keys(&KeyMaterial::new(OTHER_PKCS1, None)).unwrap();
            done.store(true, std::sync::atomic::Ordering::Release);
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_forget_retired_key() {
        let manager = issuer_manager();
        let old_id = manager.current().unwrap().key_id().to_string();
        assert!(manager.retired_key_ids().is_empty());

        manager.rotate_keys(&KeyMaterial::new(OTHER_PKCS1, None)).unwrap();
        assert_eq!(manager.retired_key_ids(), vec![old_id.clone()]);

        assert!(manager.forget_retired_key(&old_id));
        assert!(!manager.forget_retired_key(&old_id));
        assert!(manager.verifying_key(&old_id).is_none());
        assert!(manager.retired_key_ids().is_empty());
    }
}
