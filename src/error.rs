//! Error types for the rfgate command gateway
//!
//! Each failure domain gets its own enum; `GatewayError` wraps them all.
//! Everything below `ConfigError` is converted into a failure `Reply` at
//! the point of detection — only startup configuration problems are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed frame or payload
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Operator is not authorized
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Replay or rate-limit policy rejection
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// Signature verification failed
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Control-plane execution failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Fatal configuration problem (startup only)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transient transport fault (logged, loop continues)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed frame or command payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Frame could not be decoded as JSON or legacy text
    #[error("Unrecognized payload format: {reason}")]
    UnrecognizedPayload {
        /// Why decoding failed
        reason: String,
    },

    /// A required field was missing from a JSON payload
    #[error("Missing field in command payload: {field}")]
    MissingField {
        /// Name of the missing field
        field: String,
    },

    /// A field had the wrong type or an unparseable value
    #[error("Invalid field value for {field}: {reason}")]
    InvalidField {
        /// Name of the offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The command text was empty after trimming
    #[error("Empty command text")]
    EmptyCommand,
}

/// Authorization failures (callsign has no registered key)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// No key is loaded for this callsign
    #[error("No authorized key for callsign {callsign}")]
    UnknownCallsign {
        /// The normalized callsign that failed lookup
        callsign: String,
    },
}

/// Replay and rate-limit policy rejections
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    /// Command timestamp is older than the replay window
    #[error("Command is older than the replay window")]
    TooOld,

    /// Command timestamp is too far in the future
    #[error("Command timestamp is in the future")]
    FutureTimestamp,

    /// Identical command already seen within the replay window
    #[error("Duplicate command within the replay window")]
    Duplicate,

    /// Operator exceeded the per-minute command budget
    #[error("Rate limit exceeded")]
    RateLimited,
}

impl ReplayError {
    /// Short machine-readable reason code used in audit logs and replies
    pub fn code(&self) -> &'static str {
        match self {
            Self::TooOld => "REPLAY_TOO_OLD",
            Self::FutureTimestamp => "REPLAY_FUTURE",
            Self::Duplicate => "REPLAY_DUPLICATE",
            Self::RateLimited => "RATE_LIMIT",
        }
    }
}

/// Signature verification failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    /// The signature did not verify against the operator's key
    #[error("Signature verification failed: {reason}")]
    VerificationFailed {
        /// Diagnostic reason (DER parse failure, mismatch, wrong key type)
        reason: String,
    },

    /// The signature was empty and unsigned commands are not allowed
    #[error("Empty signature rejected (unsigned testing mode is disabled)")]
    EmptySignature,
}

/// Control-plane execution failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Command arguments did not validate
    #[error("Invalid arguments for {command}: {reason}")]
    InvalidArguments {
        /// The command name
        command: String,
        /// Why validation failed
        reason: String,
    },

    /// TCP control connection failed or timed out
    #[error("Control connection to {address} failed: {reason}")]
    ControlUnreachable {
        /// host:port of the control socket
        address: String,
        /// Underlying failure
        reason: String,
    },

    /// Config-file fallback found no matching section/key
    #[error("No matching setting in {path}: {reason}")]
    NoMatchingSetting {
        /// Path of the controller config file
        path: PathBuf,
        /// What was searched for
        reason: String,
    },

    /// Restarting the controller process failed
    #[error("Controller restart failed: {reason}")]
    RestartFailed {
        /// Underlying failure
        reason: String,
    },
}

/// Fatal configuration problems (startup only)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Cannot read configuration file {path}: {reason}")]
    Unreadable {
        /// Path that was attempted
        path: PathBuf,
        /// Underlying I/O failure
        reason: String,
    },

    /// Configuration file could not be parsed
    #[error("Cannot parse configuration file {path}: {reason}")]
    Unparseable {
        /// Path that was attempted
        path: PathBuf,
        /// Parser diagnostic
        reason: String,
    },

    /// A configuration value failed validation
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Configuration key
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The authorized keys directory produced zero usable keys
    #[error("No authorized keys loaded from {path}")]
    NoAuthorizedKeys {
        /// The directory that was scanned
        path: PathBuf,
    },
}

/// Transient transport faults on the listener
#[derive(Error, Debug)]
pub enum TransportError {
    /// Binding a receive or publish endpoint failed
    #[error("Failed to bind {endpoint}: {reason}")]
    BindFailed {
        /// Endpoint string (zmq URI, pipe path, socket path)
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// A receive operation failed
    #[error("Receive failed: {reason}")]
    ReceiveFailed {
        /// Underlying failure
        reason: String,
    },

    /// A send/publish operation failed
    #[error("Send failed: {reason}")]
    SendFailed {
        /// Underlying failure
        reason: String,
    },

    /// A framed record exceeded the size limit
    #[error("Frame too large: {size} bytes")]
    FrameTooLarge {
        /// Declared frame length
        size: usize,
    },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
