//! Command parsing and callsign normalization
//!
//! Turns a raw transport payload into an immutable [`CommandEnvelope`].
//! Two wire shapes are accepted: the JSON pub/sub payload
//! `{"operator", "command", "timestamp"}` and the legacy text frame
//! `"<unix-timestamp>:<callsign[-ssid]>:<command text>"`. Both produce
//! the same envelope; the literal bytes that were signed are carried
//! along untouched for hashing and verification.

use crate::error::ParseError;

/// A parsed, normalized operator command
///
/// Created once by the parser and never mutated; consumed by the guard,
/// the verifier, and the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    /// Command timestamp, Unix seconds (fractional allowed)
    pub timestamp: f64,
    /// Normalized callsign including any `-<ssid>` suffix
    pub callsign: String,
    /// Callsign with the SSID suffix stripped; rate limits and replay
    /// history are shared across all of one operator's sessions
    pub callsign_base: String,
    /// Full command text, whitespace-trimmed
    pub command_text: String,
    /// The literal bytes that were authenticated end-to-end
    pub raw_bytes: Vec<u8>,
}

impl CommandEnvelope {
    /// Build an envelope from already-separated fields
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::EmptyCommand`] if the command text is blank.
    pub fn parse(
        callsign_raw: &str,
        command_str: &str,
        timestamp: f64,
        raw_bytes: Vec<u8>,
    ) -> Result<Self, ParseError> {
        let (callsign, callsign_base) = normalize_callsign(callsign_raw);
        if callsign.is_empty() {
            return Err(ParseError::InvalidField {
                field: "operator".to_string(),
                reason: "empty callsign".to_string(),
            });
        }

        let command_text = command_str.trim().to_string();
        if command_text.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        Ok(Self {
            timestamp,
            callsign,
            callsign_base,
            command_text,
            raw_bytes,
        })
    }

    /// Decode a transport payload (JSON or legacy text) into an envelope
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] describing the first defect found. A
    /// payload that fails here has no destination to reply to and is
    /// dropped by the gateway after logging.
    pub fn decode(raw: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(raw).map_err(|e| ParseError::UnrecognizedPayload {
            reason: format!("not UTF-8: {}", e),
        })?;

        if text.trim_start().starts_with('{') {
            Self::decode_json(text, raw)
        } else {
            Self::decode_text_frame(text, raw)
        }
    }

    /// JSON pub/sub payload: `{"operator", "command", "timestamp"}`
    fn decode_json(text: &str, raw: &[u8]) -> Result<Self, ParseError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ParseError::UnrecognizedPayload {
                reason: format!("invalid JSON: {}", e),
            })?;

        let operator = value
            .get("operator")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParseError::MissingField {
                field: "operator".to_string(),
            })?;

        let command = value
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParseError::MissingField {
                field: "command".to_string(),
            })?;

        let timestamp = value
            .get("timestamp")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ParseError::MissingField {
                field: "timestamp".to_string(),
            })?;

        Self::parse(operator, command, timestamp, raw.to_vec())
    }

    /// Legacy text frame: `"<unix-timestamp>:<callsign[-ssid]>:<command>"`
    fn decode_text_frame(text: &str, raw: &[u8]) -> Result<Self, ParseError> {
        let mut parts = text.trim_end_matches(['\r', '\n']).splitn(3, ':');

        let ts_field = parts.next().unwrap_or_default();
        let callsign = parts.next().ok_or_else(|| ParseError::UnrecognizedPayload {
            reason: "expected <timestamp>:<callsign>:<command>".to_string(),
        })?;
        let command = parts.next().ok_or_else(|| ParseError::UnrecognizedPayload {
            reason: "expected <timestamp>:<callsign>:<command>".to_string(),
        })?;

        let timestamp: f64 = ts_field
            .trim()
            .parse()
            .map_err(|e| ParseError::InvalidField {
                field: "timestamp".to_string(),
                reason: format!("{}", e),
            })?;

        Self::parse(callsign, command, timestamp, raw.to_vec())
    }

    /// Split the command text into an upper-cased name plus positional
    /// arguments (no quoting or escaping, matching the space-delimited
    /// over-the-air protocol)
    pub fn command_parts(&self) -> (String, Vec<String>) {
        let mut tokens = self.command_text.split_whitespace();
        let name = tokens.next().unwrap_or_default().to_uppercase();
        let args = tokens.map(|t| t.to_string()).collect();
        (name, args)
    }
}

/// Normalize a raw callsign field
///
/// Upper-cases and trims; if the callsign carries a numeric `-<ssid>`
/// suffix, the full string and the SSID-stripped base are returned
/// separately, otherwise both are the same string.
pub fn normalize_callsign(raw: &str) -> (String, String) {
    let callsign = raw.trim().to_uppercase();

    let base = match callsign.rsplit_once('-') {
        Some((base, ssid)) if !ssid.is_empty() && ssid.chars().all(|c| c.is_ascii_digit()) => {
            base.to_string()
        }
        _ => callsign.clone(),
    };

    (callsign, base)
}
