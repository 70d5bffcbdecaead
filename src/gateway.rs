//! The command-processing pipeline
//!
//! One frame travels a fixed path: decode, key lookup, replay/rate
//! guard, signature verification, execution, reply. The order is load
//! bearing — the replay guard records an attempt before the (expensive)
//! signature check runs, so a flood of forged frames for a known
//! callsign burns that operator's rate budget instead of CPU. A frame
//! that cannot even be decoded has no destination to answer and is
//! dropped after logging; every later rejection produces a failure
//! reply addressed to the claimed callsign.

use crate::auth::{verify_signature, AuthorizedKey, KeyStore};
use crate::command::CommandEnvelope;
use crate::config::GatewayConfig;
use crate::control::{Executor, RepeaterCommand};
use crate::error::{AuthError, Result, SignatureError};
use crate::guard::{GuardPolicy, ReplayGuard};
use crate::reply::{extract_parameter, Reply};
use crate::transport::{CommandSource, ParameterUpdate, ShutdownFlag};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Longest payload prefix quoted in log messages
const LOG_PREVIEW_BYTES: usize = 64;

/// Result of processing one frame: the reply to send, plus a
/// notification when a parameter actually changed
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Reply addressed to the command's operator
    pub reply: Reply,
    /// Present only after successful execution
    pub update: Option<ParameterUpdate>,
}

/// The authenticated command gateway
///
/// Owns the replay guard and the executor; shares the key store with the
/// SIGHUP reload task. One instance serves one transport loop.
pub struct Gateway {
    config: GatewayConfig,
    keystore: Arc<RwLock<KeyStore>>,
    guard: Mutex<ReplayGuard>,
    executor: Executor,
}

impl Gateway {
    /// Build a gateway from validated configuration and a loaded key store
    pub fn new(config: GatewayConfig, keystore: Arc<RwLock<KeyStore>>) -> Self {
        let policy = GuardPolicy {
            replay_window: config.replay_protection_window as f64,
            clock_skew: config.clock_skew as f64,
            max_commands_per_minute: config.max_commands_per_minute,
        };

        if config.allow_unsigned_testing {
            warn!("Unsigned testing mode is ON; commands with empty signatures will be accepted");
        }

        Self {
            executor: Executor::new(&config),
            guard: Mutex::new(ReplayGuard::new(policy)),
            keystore,
            config,
        }
    }

    /// Process one received frame through the full pipeline
    ///
    /// Returns `None` only for frames that cannot be decoded at all;
    /// every other outcome carries a reply for the claimed operator.
    pub async fn handle_frame(&self, payload: &[u8], signature: &[u8]) -> Option<ProcessOutcome> {
        let envelope = match CommandEnvelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %preview(payload),
                    "Dropping undecodable frame"
                );
                return None;
            }
        };

        let source = self.config.repeater_callsign.clone();
        let refuse = |error: String| ProcessOutcome {
            reply: Reply::failure(&envelope.callsign, &source, &envelope.command_text, error),
            update: None,
        };

        // Key lookup first: an unknown callsign short-circuits before any
        // state is recorded for it
        let Some(key) = self.lookup_key(&envelope) else {
            let e = AuthError::UnknownCallsign {
                callsign: envelope.callsign.clone(),
            };
            warn!(operator = %envelope.callsign, "Rejected: no authorized key");
            return Some(refuse(e.to_string()));
        };

        if let Err(e) = self.guard.lock().check(&envelope) {
            warn!(
                operator = %envelope.callsign,
                command = %envelope.command_text,
                code = e.code(),
                "Rejected by replay/rate policy"
            );
            return Some(refuse(e.to_string()));
        }

        if signature.is_empty() {
            if !self.config.allow_unsigned_testing {
                warn!(operator = %envelope.callsign, "Rejected: empty signature");
                return Some(refuse(SignatureError::EmptySignature.to_string()));
            }
            warn!(operator = %envelope.callsign, "Accepted unsigned command (testing mode)");
        } else {
            let verdict = verify_signature(&key, &envelope.raw_bytes, signature);
            if !verdict.valid {
                warn!(
                    operator = %envelope.callsign,
                    key = %key.callsign,
                    reason = verdict.reason.as_deref().unwrap_or("unknown"),
                    "Rejected: signature verification failed"
                );
                return Some(refuse("Signature verification failed".to_string()));
            }
        }

        let (name, args) = envelope.command_parts();
        let command = match RepeaterCommand::from_parts(&name, &args) {
            Ok(command) => command,
            Err(e) => {
                debug!(operator = %envelope.callsign, error = %e, "Invalid command arguments");
                return Some(refuse(e.to_string()));
            }
        };

        let outcome = self.executor.execute(&command).await;
        if !outcome.success {
            error!(
                operator = %envelope.callsign,
                command = %envelope.command_text,
                error = %outcome.message,
                "Command execution failed"
            );
            // Distinct from a policy refusal: the command was accepted
            // but the control plane could not carry it out
            return Some(ProcessOutcome {
                reply: Reply::error(
                    &envelope.callsign,
                    &source,
                    &envelope.command_text,
                    outcome.message,
                ),
                update: None,
            });
        }

        let (parameter, value) = extract_parameter(&envelope.command_text, &outcome.message);
        info!(
            operator = %envelope.callsign,
            command = %envelope.command_text,
            parameter = %parameter,
            value = %value,
            "Command executed"
        );

        let reply = Reply::success(
            &envelope.callsign,
            &source,
            &envelope.command_text,
            format!("{} = {}", parameter, value),
        );
        let update = ParameterUpdate {
            parameter,
            value,
            operator: envelope.callsign.clone(),
            command: envelope.command_text.clone(),
            timestamp: reply.timestamp,
        };

        Some(ProcessOutcome {
            reply,
            update: Some(update),
        })
    }

    /// Resolve the authorized key for an envelope: full callsign first,
    /// then the SSID-stripped base
    fn lookup_key(&self, envelope: &CommandEnvelope) -> Option<AuthorizedKey> {
        let store = self.keystore.read();
        store
            .get(&envelope.callsign)
            .or_else(|| store.get(&envelope.callsign_base))
            .cloned()
    }

    /// Drive one transport until shutdown is requested
    ///
    /// Per-frame errors are logged and the loop continues; only a bind
    /// failure before this point is fatal.
    pub async fn run<S: CommandSource + Send>(
        &self,
        source: &mut S,
        shutdown: &ShutdownFlag,
    ) -> Result<()> {
        info!(
            transport = source.name(),
            operators = self.keystore.read().len(),
            "Gateway listening"
        );

        while !shutdown.is_set() {
            let frame = match source.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!(transport = source.name(), error = %e, "Receive error");
                    continue;
                }
            };

            let Some(outcome) = self.handle_frame(&frame.payload, &frame.signature).await else {
                continue;
            };

            if let Err(e) = source.send_reply(&outcome.reply).await {
                warn!(transport = source.name(), error = %e, "Reply delivery failed");
            }

            if let Some(update) = outcome.update {
                if let Err(e) = source.publish_update(&update).await {
                    warn!(transport = source.name(), error = %e, "Update publish failed");
                }
            }
        }

        info!(transport = source.name(), "Gateway stopped");
        Ok(())
    }
}

fn preview(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(&raw[..raw.len().min(LOG_PREVIEW_BYTES)]);
    text.replace(['\r', '\n'], " ")
}
