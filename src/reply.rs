//! Reply construction and serialization
//!
//! A [`Reply`] is built exactly once per processed command and never
//! mutated; two serializers turn it into the over-the-air text frame or
//! a JSON document for the pub/sub side. Parameter extraction from the
//! executor's free-text result is an explicitly best-effort heuristic —
//! it feeds the human-readable message and the parameter-update
//! notification, never authoritative state, and degrades to a generic
//! acknowledgment when nothing recognizable is found.

use crate::guard::unix_now;
use serde::Serialize;
use std::sync::OnceLock;

/// Reply status reported to the remote operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Command executed and took effect
    Success,
    /// Command was refused by gateway policy (authorization, replay,
    /// signature, or argument validation)
    Failure,
    /// Command passed every check but execution against the controller
    /// failed
    Error,
}

/// A structured reply to one processed command
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    /// Callsign the reply is addressed to
    pub destination: String,
    /// Repeater callsign the reply is sent from
    pub source: String,
    /// Human-readable result line
    pub message: String,
    /// Unix timestamp the reply was built
    pub timestamp: f64,
    /// The command this reply answers
    pub command: String,
    /// Outcome classification
    pub status: ReplyStatus,
    /// Failure detail, present only for non-success replies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// Build a success reply
    pub fn success(
        destination: impl Into<String>,
        source: impl Into<String>,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            source: source.into(),
            message: message.into(),
            timestamp: unix_now(),
            command: command.into(),
            status: ReplyStatus::Success,
            error: None,
        }
    }

    /// Build a failure reply carrying an error detail
    pub fn failure(
        destination: impl Into<String>,
        source: impl Into<String>,
        command: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            destination: destination.into(),
            source: source.into(),
            message: format!("Command failed: {}", error),
            timestamp: unix_now(),
            command: command.into(),
            status: ReplyStatus::Failure,
            error: Some(error),
        }
    }

    /// Build an error reply for a command that was accepted but whose
    /// execution failed
    pub fn error(
        destination: impl Into<String>,
        source: impl Into<String>,
        command: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            destination: destination.into(),
            source: source.into(),
            message: format!("Command failed: {}", error),
            timestamp: unix_now(),
            command: command.into(),
            status: ReplyStatus::Error,
            error: Some(error),
        }
    }

    /// Serialize as the over-the-air text frame:
    /// `"<timestamp with 3 decimals>:<source callsign>:<message>"`
    pub fn to_text_frame(&self) -> Vec<u8> {
        format!("{:.3}:{}:{}", self.timestamp, self.source, self.message).into_bytes()
    }

    /// Serialize as JSON bytes
    pub fn to_json(&self) -> Vec<u8> {
        // A Reply contains only strings and numbers; serialization of
        // such a value cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Extracted `(parameter, value)` pair for notifications and messages
pub type ParameterValue = (String, String);

fn number_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"-?\d+(?:\.\d+)?").expect("static regex must compile")
    })
}

/// Best-effort extraction of a parameter/value pair from an executor
/// result string
///
/// Keyed on a topic word (`squelch`, `power`, `timeout`, `restart`) found
/// in the command or the result text, followed by the first number in the
/// result (falling back to the command). Degrades to a generic
/// `("value", <n>)` or `("setting", "updated")` pair; callers must not
/// treat the output as authoritative controller state.
pub fn extract_parameter(command: &str, result: &str) -> ParameterValue {
    let haystack = format!("{} {}", command, result).to_lowercase();
    let number = number_pattern()
        .find(result)
        .or_else(|| number_pattern().find(command))
        .map(|m| m.as_str().to_string());

    if haystack.contains("squelch") {
        return match number {
            Some(n) => ("squelch".to_string(), format!("{} dB", n)),
            None => ("squelch".to_string(), "updated".to_string()),
        };
    }

    if haystack.contains("power") {
        return match number {
            Some(n) => ("power".to_string(), format!("{}%", n)),
            None => ("power".to_string(), "updated".to_string()),
        };
    }

    if haystack.contains("timeout") {
        return match number {
            Some(n) => ("timeout".to_string(), format!("{} s", n)),
            None => ("timeout".to_string(), "updated".to_string()),
        };
    }

    if haystack.contains("restart") {
        return ("restart".to_string(), "completed".to_string());
    }

    match number {
        Some(n) => ("value".to_string(), n),
        None => ("setting".to_string(), "updated".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame_format() {
        let mut reply = Reply::success("LA1ABC", "LD5RPT", "SET_SQUELCH -24", "squelch = -24 dB");
        reply.timestamp = 1700000000.5;

        let frame = String::from_utf8(reply.to_text_frame()).unwrap();
        assert_eq!(frame, "1700000000.500:LD5RPT:squelch = -24 dB");
    }

    #[test]
    fn test_json_success_omits_error() {
        let reply = Reply::success("LA1ABC", "LD5RPT", "RESTART", "restart completed");
        let value: serde_json::Value = serde_json::from_slice(&reply.to_json()).unwrap();

        assert_eq!(value["destination"], "LA1ABC");
        assert_eq!(value["source"], "LD5RPT");
        assert_eq!(value["status"], "success");
        assert_eq!(value["command"], "RESTART");
        assert!(value.get("error").is_none());
        assert!(value["timestamp"].is_f64());
    }

    #[test]
    fn test_json_failure_carries_error() {
        let reply = Reply::failure("LA1ABC", "LD5RPT", "RESTART", "Signature verification failed");
        let value: serde_json::Value = serde_json::from_slice(&reply.to_json()).unwrap();

        assert_eq!(value["status"], "failure");
        assert_eq!(value["error"], "Signature verification failed");
        assert!(value["message"]
            .as_str()
            .unwrap()
            .contains("Signature verification failed"));
    }

    #[test]
    fn test_json_error_status_for_execution_failure() {
        let reply = Reply::error(
            "LA1ABC",
            "LD5RPT",
            "SET_POWER 50",
            "Control connection to localhost:5210 failed: connect refused",
        );
        let value: serde_json::Value = serde_json::from_slice(&reply.to_json()).unwrap();

        assert_eq!(value["status"], "error");
        assert!(value["error"]
            .as_str()
            .unwrap()
            .contains("Control connection"));
    }

    #[test]
    fn test_extract_squelch() {
        let (param, value) =
            extract_parameter("SET_SQUELCH -24", "Squelch threshold set to -24 dB");
        assert_eq!(param, "squelch");
        assert_eq!(value, "-24 dB");
    }

    #[test]
    fn test_extract_power_and_timeout() {
        assert_eq!(
            extract_parameter("SET_POWER 50", "power now 50"),
            ("power".to_string(), "50%".to_string())
        );
        assert_eq!(
            extract_parameter("SET_TIMEOUT 120", "TIMEOUT=120 written"),
            ("timeout".to_string(), "120 s".to_string())
        );
    }

    #[test]
    fn test_extract_restart() {
        assert_eq!(
            extract_parameter("RESTART", "svxlink restarted via supervisor"),
            ("restart".to_string(), "completed".to_string())
        );
    }

    #[test]
    fn test_extract_generic_number() {
        assert_eq!(
            extract_parameter("CONNECT 9999", "node 9999 linked"),
            ("value".to_string(), "9999".to_string())
        );
    }

    #[test]
    fn test_extract_generic_fallback() {
        assert_eq!(
            extract_parameter("REREAD_CONFIG", "ok"),
            ("setting".to_string(), "updated".to_string())
        );
    }

    #[test]
    fn test_number_from_command_when_result_is_bare() {
        let (param, value) = extract_parameter("SET_SQUELCH -24", "OK");
        assert_eq!(param, "squelch");
        assert_eq!(value, "-24 dB");
    }
}
