//! Operator authentication
//!
//! This module owns the authorized key store (one public key file per
//! operator callsign) and ECDSA signature verification over raw command
//! bytes.

mod keystore;
mod verify;

pub use keystore::{AuthorizedKey, KeyFormat, KeyMaterial, KeyStore};
pub use verify::{verify_signature, Verdict};
