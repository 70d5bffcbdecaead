//! Replay and rate-limit guard
//!
//! Per-operator bounded history keyed by the SSID-stripped callsign, so
//! all sessions from one operator share the same budget. Checks run in a
//! fixed order: staleness, future skew, duplicate hash, then the rolling
//! one-minute rate. Duplicates are matched against the full replay window
//! so a replayed command cannot dodge rate limiting by waiting, while the
//! rate check uses a tighter one-minute window to catch bursts early.
//!
//! The guard is the only shared mutable state in the gateway; the run
//! loop keeps it behind a single mutex (see `gateway.rs`).

use crate::command::CommandEnvelope;
use crate::error::ReplayError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Rolling window for the per-minute rate check, seconds
const RATE_WINDOW_SECS: f64 = 60.0;

/// One accepted-for-checking command in an operator's history
#[derive(Debug, Clone, PartialEq)]
struct ReplayEntry {
    /// SHA-256 of the raw signed payload bytes
    command_hash: [u8; 32],
    /// Timestamp claimed by the command itself
    command_timestamp: f64,
    /// Wall-clock time the gateway received it
    received_at: f64,
}

/// Replay/rate policy configuration
#[derive(Debug, Clone, Copy)]
pub struct GuardPolicy {
    /// Replay window in seconds (duplicate and staleness horizon)
    pub replay_window: f64,
    /// Permitted clock skew for future-dated commands, seconds
    pub clock_skew: f64,
    /// Commands allowed per operator per rolling minute
    pub max_commands_per_minute: usize,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            replay_window: 300.0,
            clock_skew: 60.0,
            max_commands_per_minute: 10,
        }
    }
}

/// Per-operator replay histories plus the policy that prunes them
///
/// Owned by the gateway's command-processing loop and passed by
/// reference; there are deliberately no module-level globals here.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    policy: GuardPolicy,
    histories: HashMap<String, Vec<ReplayEntry>>,
}

impl ReplayGuard {
    /// Create a guard with the given policy
    pub fn new(policy: GuardPolicy) -> Self {
        Self {
            policy,
            histories: HashMap::new(),
        }
    }

    /// Check an envelope against replay and rate policy at wall-clock now
    ///
    /// # Errors
    ///
    /// Returns the first [`ReplayError`] the envelope trips. A rate-limit
    /// rejection still records the attempt: received-but-refused commands
    /// count toward history and dedup.
    pub fn check(&mut self, envelope: &CommandEnvelope) -> Result<(), ReplayError> {
        self.check_at(envelope, unix_now())
    }

    /// Policy check with an explicit clock (tests drive this directly)
    pub fn check_at(&mut self, envelope: &CommandEnvelope, now: f64) -> Result<(), ReplayError> {
        let command_hash: [u8; 32] = Sha256::digest(&envelope.raw_bytes).into();
        let window = self.policy.replay_window;

        let age = now - envelope.timestamp;
        if age > window {
            return Err(ReplayError::TooOld);
        }

        if envelope.timestamp > now + self.policy.clock_skew {
            return Err(ReplayError::FutureTimestamp);
        }

        let history = self
            .histories
            .entry(envelope.callsign_base.clone())
            .or_default();

        let duplicate = history
            .iter()
            .find(|e| e.command_hash == command_hash && e.received_at >= now - window);
        if let Some(original) = duplicate {
            debug!(
                operator = %envelope.callsign_base,
                original_timestamp = original.command_timestamp,
                "Duplicate command within window"
            );
            return Err(ReplayError::Duplicate);
        }

        history.push(ReplayEntry {
            command_hash,
            command_timestamp: envelope.timestamp,
            received_at: now,
        });

        history.retain(|e| e.received_at >= now - window);

        let recent = history
            .iter()
            .filter(|e| e.received_at > now - RATE_WINDOW_SECS)
            .count();
        if recent > self.policy.max_commands_per_minute {
            debug!(
                operator = %envelope.callsign_base,
                recent,
                limit = self.policy.max_commands_per_minute,
                "Rate limit tripped"
            );
            // The just-appended entry stays: the attempt itself counts
            return Err(ReplayError::RateLimited);
        }

        Ok(())
    }

    /// Number of operators with live history (for diagnostics)
    pub fn tracked_operators(&self) -> usize {
        self.histories.len()
    }
}

/// Wall-clock seconds since the Unix epoch as f64
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
