//! ECDSA signature verification
//!
//! Verifies a DER-encoded ECDSA signature (SHA-256 digest) of the raw
//! command payload against an operator's authorized key. The verifier
//! never returns an error to the caller: any parse failure, wrong key
//! type, or mismatch yields `valid == false` plus a diagnostic reason,
//! and the gateway treats all of them identically (fail closed).

use super::keystore::{AuthorizedKey, KeyMaterial};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::signature::Verifier;
use sha2::{Digest, Sha256};

/// Outcome of a verification attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether the signature verified
    pub valid: bool,
    /// Diagnostic reason when `valid` is false (never shown to the
    /// remote operator beyond a generic failure message)
    pub reason: Option<String>,
}

impl Verdict {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Verify `signature` (DER) over the literal `message` bytes with `key`
///
/// The digest is always SHA-256, regardless of curve: P-256 verifies the
/// message directly (SHA-256 is its native digest), P-384 verifies the
/// SHA-256 prehash. Opaque (armored) key material fails closed.
pub fn verify_signature(key: &AuthorizedKey, message: &[u8], signature: &[u8]) -> Verdict {
    if signature.is_empty() {
        return Verdict::invalid("empty signature");
    }

    match &key.material {
        KeyMaterial::P256(verifying_key) => {
            let sig = match p256::ecdsa::Signature::from_der(signature) {
                Ok(sig) => sig,
                Err(e) => return Verdict::invalid(format!("DER decode failed: {}", e)),
            };
            match verifying_key.verify(message, &sig) {
                Ok(()) => Verdict::valid(),
                Err(_) => Verdict::invalid("signature mismatch (P-256)"),
            }
        }
        KeyMaterial::P384(verifying_key) => {
            let sig = match p384::ecdsa::Signature::from_der(signature) {
                Ok(sig) => sig,
                Err(e) => return Verdict::invalid(format!("DER decode failed: {}", e)),
            };
            let digest = Sha256::digest(message);
            match verifying_key.verify_prehash(&digest, &sig) {
                Ok(()) => Verdict::valid(),
                Err(_) => Verdict::invalid("signature mismatch (P-384)"),
            }
        }
        KeyMaterial::Opaque(_) => {
            Verdict::invalid("opaque key material requires an external verifier")
        }
    }
}
