//! Where key material comes from.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use super::material::{GeneratedKeyPair, KeyMaterial};
use crate::config::SealConfig;
use crate::error::{Error, Result};

const PEM_MARKER: &str = "-----BEGIN";

/// A place key material can be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Environment variables holding PEM text, optionally base64-wrapped.
    Environment {
        /// Variable holding the private key
        private_var: String,
        /// Variable holding the public key (optional at runtime)
        public_var: String,
    },
    /// PEM files on disk.
    Files {
        /// Private key file
        private_path: PathBuf,
        /// Public key file (optional at runtime)
        public_path: PathBuf,
    },
}

impl KeySource {
    /// Sources in priority order: environment first, then files.
    pub fn chain(config: &SealConfig) -> Vec<KeySource> {
        vec![
            KeySource::Environment {
                private_var: config.private_key_env.clone(),
                public_var: config.public_key_env.clone(),
            },
            KeySource::Files {
                private_path: config.private_key_path.clone(),
                public_path: config.public_key_path.clone(),
            },
        ]
    }

    /// Read the material from this source.
    ///
    /// Returns `Ok(None)` if the source holds no private key (variable unset,
    /// file absent), so the next source in the chain can be tried.
    pub fn read(&self) -> Result<Option<KeyMaterial>> {
        match self {
            KeySource::Environment {
                private_var,
                public_var,
            } => {
                let Some(private_raw) = read_env(private_var) else {
                    return Ok(None);
                };
                let private_pem = unwrap_pem(&private_raw, private_var)?;
                let public_pem = match read_env(public_var) {
                    Some(raw) => Some(unwrap_pem(&raw, public_var)?.as_str().to_string()),
                    None => None,
                };
                Ok(Some(KeyMaterial {
                    private_pem,
                    public_pem,
                }))
            },
            KeySource::Files {
                private_path,
                public_path,
            } => {
                if !private_path.exists() {
                    return Ok(None);
                }
                let private_pem = Zeroizing::new(read_file(private_path)?);
                let public_pem = if public_path.exists() {
                    Some(read_file(public_path)?)
                } else {
                    None
                };
                Ok(Some(KeyMaterial {
                    private_pem,
                    public_pem,
                }))
            },
        }
    }

    /// Short description for logs. Never includes key material.
    pub fn describe(&self) -> String {
        match self {
            KeySource::Environment { private_var, .. } => format!("environment ${}", private_var),
            KeySource::Files { private_path, .. } => format!("file {}", private_path.display()),
        }
    }
}

fn read_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .map(Zeroizing::new)
        .filter(|value| !value.trim().is_empty())
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("Failed to read key file {}: {}", path.display(), e))
    })
}

/// Accept PEM as-is, or decode a base64 wrapper around PEM.
fn unwrap_pem(raw: &str, origin: &str) -> Result<Zeroizing<String>> {
    let trimmed = raw.trim();
    if trimmed.contains(PEM_MARKER) {
        return Ok(Zeroizing::new(trimmed.to_string()));
    }

    let compact: Zeroizing<String> =
        Zeroizing::new(trimmed.chars().filter(|c| !c.is_whitespace()).collect());
    let decoded = Zeroizing::new(STANDARD.decode(compact.as_bytes()).map_err(|e| {
        Error::Configuration(format!("${} is neither PEM nor base64: {}", origin, e))
    })?);
    let text = std::str::from_utf8(&decoded)
        .map_err(|_| Error::Configuration(format!("${} does not decode to text", origin)))?;
    if !text.contains(PEM_MARKER) {
        return Err(Error::Configuration(format!("${} does not contain a PEM block", origin)));
    }
    Ok(Zeroizing::new(text.trim().to_string()))
}

/// Write a generated pair as `private.pem` and `public.pem` under `dir`.
///
/// Neither file may already exist. The private key is created owner-only
/// (0600) on unix. If the public key cannot be written the new private key
/// file is removed again. Returns the private and public paths.
pub fn write_key_files(generated: &GeneratedKeyPair, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let private_path = dir.join("private.pem");
    let public_path = dir.join("public.pem");
    if public_path.exists() {
        return Err(already_exists(&public_path));
    }

    create_new(&private_path, generated.private_pem.as_bytes(), 0o600)?;
    if let Err(e) = create_new(&public_path, generated.public_pem.as_bytes(), 0o644) {
        let _ = fs::remove_file(&private_path);
        return Err(e);
    }

    log::info!("Wrote key {} to {}", generated.key_id, dir.display());
    Ok((private_path, public_path))
}

fn create_new(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => already_exists(path),
        _ => Error::Io(e),
    })?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

fn already_exists(path: &Path) -> Error {
    Error::Configuration(format!("{} already exists; refusing to overwrite", path.display()))
}
