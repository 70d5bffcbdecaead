//! Authorized key store
//!
//! Loads operator public keys from a directory, keyed by normalized
//! callsign. The callsign is the upper-cased filename stem; `.pem` files
//! are parsed as SubjectPublicKeyInfo EC keys (the curve is implied by
//! the key), `.asc` files are kept as opaque armored bytes for operators
//! that use an external verifier. Malformed files are logged and skipped;
//! an empty resulting store is fatal at startup (enforced by the caller
//! via [`KeyStore::ensure_nonempty`]).

use crate::error::{ConfigError, Result};
use p256::pkcs8::DecodePublicKey;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk format an operator key was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// PEM SubjectPublicKeyInfo
    Pem,
    /// ASCII-armored blob (opaque, external verifier)
    Armored,
}

/// Parsed key material for one operator
#[derive(Debug, Clone, PartialEq)]
pub enum KeyMaterial {
    /// NIST P-256 ECDSA verifying key
    P256(p256::ecdsa::VerifyingKey),
    /// NIST P-384 ECDSA verifying key
    P384(p384::ecdsa::VerifyingKey),
    /// Opaque bytes; plain ECDSA verification always fails closed
    Opaque(Vec<u8>),
}

impl KeyMaterial {
    /// Short curve/format label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::P256(_) => "ecdsa-p256",
            Self::P384(_) => "ecdsa-p384",
            Self::Opaque(_) => "opaque",
        }
    }
}

/// One operator's authorized public key
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedKey {
    /// Normalized (upper-cased) callsign the key belongs to
    pub callsign: String,
    /// Parsed key material
    pub material: KeyMaterial,
    /// Format the key was loaded from
    pub format: KeyFormat,
}

/// Immutable map of callsign → authorized key, loaded once at startup
/// (or again on SIGHUP, swapping the whole store)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyStore {
    keys: HashMap<String, AuthorizedKey>,
    directory: PathBuf,
}

impl KeyStore {
    /// Load every usable key file from a directory
    ///
    /// Fails soft per file: a malformed key is logged and skipped so one
    /// bad file cannot lock every operator out. Files with extensions
    /// other than `.pem`/`.asc` are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Unreadable`] if the directory itself
    /// cannot be listed.
    pub fn load(directory: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(directory).map_err(|e| ConfigError::Unreadable {
            path: directory.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut keys = HashMap::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(directory = %directory.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            match load_key_file(&path) {
                Ok(Some(key)) => {
                    debug!(
                        callsign = %key.callsign,
                        kind = key.material.kind(),
                        file = %path.display(),
                        "Loaded authorized key"
                    );
                    keys.insert(key.callsign.clone(), key);
                }
                Ok(None) => {} // unrelated file, ignored
                Err(reason) => {
                    warn!(file = %path.display(), reason = %reason, "Skipping malformed key file");
                }
            }
        }

        info!(
            directory = %directory.display(),
            count = keys.len(),
            "Authorized key store loaded"
        );

        Ok(Self {
            keys,
            directory: directory.to_path_buf(),
        })
    }

    /// Look up the key for a normalized callsign
    pub fn get(&self, callsign: &str) -> Option<&AuthorizedKey> {
        self.keys.get(callsign)
    }

    /// Number of loaded keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store holds no keys at all
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Directory this store was loaded from (used for reloads)
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Fail if no keys were loaded — an empty store means no command
    /// could ever be authorized, which is a startup misconfiguration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoAuthorizedKeys`] for an empty store.
    pub fn ensure_nonempty(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(ConfigError::NoAuthorizedKeys {
                path: self.directory.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Parse a single key file; `Ok(None)` means "not a key file"
fn load_key_file(path: &Path) -> std::result::Result<Option<AuthorizedKey>, String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let callsign = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "filename is not valid UTF-8".to_string())?
        .trim()
        .to_uppercase();

    if callsign.is_empty() {
        return Err("empty filename stem".to_string());
    }

    match extension.as_deref() {
        Some("pem") => {
            let pem = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            let material = parse_pem_key(&pem)?;
            Ok(Some(AuthorizedKey {
                callsign,
                material,
                format: KeyFormat::Pem,
            }))
        }
        Some("asc") => {
            let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
            if bytes.is_empty() {
                return Err("empty armored key file".to_string());
            }
            Ok(Some(AuthorizedKey {
                callsign,
                material: KeyMaterial::Opaque(bytes),
                format: KeyFormat::Armored,
            }))
        }
        _ => Ok(None),
    }
}

/// Decode a PEM SubjectPublicKeyInfo EC key; the curve is implied by the
/// key, not chosen by the caller
fn parse_pem_key(pem: &str) -> std::result::Result<KeyMaterial, String> {
    if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
        return Ok(KeyMaterial::P256(key));
    }

    if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_pem(pem) {
        return Ok(KeyMaterial::P384(key));
    }

    Err("not a supported EC public key (expected P-256 or P-384 SPKI)".to_string())
}
