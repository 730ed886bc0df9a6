//! Configuration for signing and verification.

use std::path::PathBuf;

use chrono::Duration;

use crate::barcode::QrCodeOptions;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::keys::MIN_KEY_BITS;

/// Default environment variable holding the private key PEM.
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "PDF_SEAL_PRIVATE_KEY";

/// Default environment variable holding the public key PEM.
pub const DEFAULT_PUBLIC_KEY_ENV: &str = "PDF_SEAL_PUBLIC_KEY";

/// Default upper bound on document size (10 MiB).
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

/// Default key lifetime before rotation is due, in days.
pub const DEFAULT_KEY_MAX_AGE_DAYS: i64 = 90;

/// Signing and verification configuration.
#[derive(Debug, Clone)]
pub struct SealConfig {
    /// Environment variable holding the private key (PEM, optionally base64-wrapped).
    pub private_key_env: String,

    /// Environment variable holding the matching public key.
    pub public_key_env: String,

    /// Private key PEM file, used when the environment holds no key.
    pub private_key_path: PathBuf,

    /// Public key PEM file. Optional on disk; derived from the private key if absent.
    pub public_key_path: PathBuf,

    /// Minimum accepted RSA modulus size. Never below 2048.
    pub min_key_bits: usize,

    /// Key age after which rotation is due.
    pub key_max_age: Duration,

    /// Largest document accepted for signing or verification, in bytes.
    pub max_document_size: usize,

    /// QR rendering options.
    pub qr: QrCodeOptions,

    /// Centre label; when set, the labelled high-correction code is used.
    pub qr_label: Option<String>,

    /// Side of the QR stamp in PDF points.
    pub stamp_size: f32,

    /// Distance of the stamp from the page edges in PDF points.
    pub stamp_margin: f32,

    /// Explicit stamp rectangle, overriding the bottom-right default.
    pub stamp_rect: Option<Rect>,

    /// Base URL embedded in QR payloads.
    pub verification_url: Option<String>,

    /// Whether the binary exits when startup key validation fails.
    pub abort_on_key_failure: bool,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SealConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            private_key_env: DEFAULT_PRIVATE_KEY_ENV.to_string(),
            public_key_env: DEFAULT_PUBLIC_KEY_ENV.to_string(),
            private_key_path: PathBuf::from("keys/private.pem"),
            public_key_path: PathBuf::from("keys/public.pem"),
            min_key_bits: MIN_KEY_BITS,
            key_max_age: Duration::days(DEFAULT_KEY_MAX_AGE_DAYS),
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            qr: QrCodeOptions::default(),
            qr_label: None,
            stamp_size: 100.0,
            stamp_margin: 20.0,
            stamp_rect: None,
            verification_url: None,
            abort_on_key_failure: true,
        }
    }

    /// Defaults overlaid with `PDF_SEAL_*` environment variables.
    ///
    /// Recognised: `PDF_SEAL_MAX_DOCUMENT_SIZE`, `PDF_SEAL_PRIVATE_KEY_PATH`,
    /// `PDF_SEAL_PUBLIC_KEY_PATH`, `PDF_SEAL_KEY_MAX_AGE_DAYS`,
    /// `PDF_SEAL_VERIFICATION_URL` and `PDF_SEAL_ABORT_ON_KEY_FAILURE`.
    pub fn from_env() -> Result<Self> {
        Self::new().overlay(|name| std::env::var(name).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("PDF_SEAL_MAX_DOCUMENT_SIZE") {
            self.max_document_size = parse_var("PDF_SEAL_MAX_DOCUMENT_SIZE", &value)?;
        }
        if let Some(value) = lookup("PDF_SEAL_PRIVATE_KEY_PATH") {
            self.private_key_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("PDF_SEAL_PUBLIC_KEY_PATH") {
            self.public_key_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("PDF_SEAL_KEY_MAX_AGE_DAYS") {
            let days: i64 = parse_var("PDF_SEAL_KEY_MAX_AGE_DAYS", &value)?;
            if days <= 0 {
                return Err(Error::Configuration(
                    "PDF_SEAL_KEY_MAX_AGE_DAYS must be positive".to_string(),
                ));
            }
            self.key_max_age = Duration::days(days);
        }
        if let Some(value) = lookup("PDF_SEAL_VERIFICATION_URL") {
            self.verification_url = Some(value).filter(|v| !v.trim().is_empty());
        }
        if let Some(value) = lookup("PDF_SEAL_ABORT_ON_KEY_FAILURE") {
            self.abort_on_key_failure = parse_bool("PDF_SEAL_ABORT_ON_KEY_FAILURE", &value)?;
        }
        Ok(self)
    }

    /// Set the private key environment variable name.
    pub fn with_private_key_env(mut self, name: impl Into<String>) -> Self {
        self.private_key_env = name.into();
        self
    }

    /// Set the public key environment variable name.
    pub fn with_public_key_env(mut self, name: impl Into<String>) -> Self {
        self.public_key_env = name.into();
        self
    }

    /// Set the key file paths.
    pub fn with_key_paths(
        mut self,
        private: impl Into<PathBuf>,
        public: impl Into<PathBuf>,
    ) -> Self {
        self.private_key_path = private.into();
        self.public_key_path = public.into();
        self
    }

    /// Set the minimum key size. Values below 2048 are raised to 2048.
    pub fn with_min_key_bits(mut self, bits: usize) -> Self {
        self.min_key_bits = bits.max(MIN_KEY_BITS);
        self
    }

    /// Set the key age after which rotation is due.
    pub fn with_key_max_age(mut self, age: Duration) -> Self {
        self.key_max_age = age;
        self
    }

    /// Set the maximum document size in bytes.
    pub fn with_max_document_size(mut self, bytes: usize) -> Self {
        self.max_document_size = bytes;
        self
    }

    /// Set QR rendering options.
    pub fn with_qr_options(mut self, options: QrCodeOptions) -> Self {
        self.qr = options;
        self
    }

    /// Draw `label` in the centre of every QR code.
    pub fn with_qr_label(mut self, label: impl Into<String>) -> Self {
        self.qr_label = Some(label.into());
        self
    }

    /// Set the stamp size and margin in PDF points.
    pub fn with_stamp_size(mut self, size: f32, margin: f32) -> Self {
        self.stamp_size = size;
        self.stamp_margin = margin;
        self
    }

    /// Stamp at a fixed rectangle instead of the bottom-right corner.
    pub fn with_stamp_rect(mut self, rect: Rect) -> Self {
        self.stamp_rect = Some(rect);
        self
    }

    /// Embed a verification URL in QR payloads.
    pub fn with_verification_url(mut self, url: impl Into<String>) -> Self {
        self.verification_url = Some(url.into());
        self
    }

    /// Set whether startup key failures abort the binary.
    pub fn with_abort_on_key_failure(mut self, abort: bool) -> Self {
        self.abort_on_key_failure = abort;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("Invalid value for {}: {:?}", name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Configuration(format!("Invalid value for {}: {:?}", name, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overlay(vars: &[(&str, &str)]) -> Result<SealConfig> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        SealConfig::new().overlay(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = SealConfig::default();
        assert_eq!(config.private_key_env, "PDF_SEAL_PRIVATE_KEY");
        assert_eq!(config.private_key_path, PathBuf::from("keys/private.pem"));
        assert_eq!(config.min_key_bits, 2048);
        assert_eq!(config.key_max_age, Duration::days(90));
        assert_eq!(config.max_document_size, 10 * 1024 * 1024);
        assert_eq!(config.qr.size, 200);
        assert!(config.abort_on_key_failure);
        assert!(config.stamp_rect.is_none());
    }

    #[test]
    fn test_min_key_bits_clamped() {
        assert_eq!(SealConfig::new().with_min_key_bits(1024).min_key_bits, 2048);
        assert_eq!(SealConfig::new().with_min_key_bits(4096).min_key_bits, 4096);
    }

    #[test]
    fn test_env_overlay() {
        let config = overlay(&[
            ("PDF_SEAL_MAX_DOCUMENT_SIZE", "1024"),
            ("PDF_SEAL_PRIVATE_KEY_PATH", "/etc/seal/key.pem"),
            ("PDF_SEAL_KEY_MAX_AGE_DAYS", "30"),
            ("PDF_SEAL_VERIFICATION_URL", "https://verify.example.org"),
            ("PDF_SEAL_ABORT_ON_KEY_FAILURE", "no"),
        ])
        .unwrap();
        assert_eq!(config.max_document_size, 1024);
        assert_eq!(config.private_key_path, PathBuf::from("/etc/seal/key.pem"));
        assert_eq!(config.key_max_age, Duration::days(30));
        assert_eq!(config.verification_url.as_deref(), Some("https://verify.example.org"));
        assert!(!config.abort_on_key_failure);
    }

    #[test]
    fn test_invalid_env_is_configuration_error() {
        for vars in [
            [("PDF_SEAL_MAX_DOCUMENT_SIZE", "ten")],
            [("PDF_SEAL_KEY_MAX_AGE_DAYS", "0")],
            [("PDF_SEAL_ABORT_ON_KEY_FAILURE", "maybe")],
        ] {
            assert!(matches!(overlay(&vars), Err(Error::Configuration(_))));
        }
    }

    #[test]
    fn test_builders() {
        let rect = Rect::new(10.0, 10.0, 50.0, 50.0);
        let config = SealConfig::new()
            .with_qr_label("Registrar")
            .with_stamp_size(72.0, 36.0)
            .with_stamp_rect(rect)
            .with_key_paths("a.pem", "b.pem");
        assert_eq!(config.qr_label.as_deref(), Some("Registrar"));
        assert_eq!(config.stamp_size, 72.0);
        assert_eq!(config.stamp_rect, Some(rect));
        assert_eq!(config.public_key_path, PathBuf::from("b.pem"));
    }
}
