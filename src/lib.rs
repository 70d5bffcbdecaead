//! # rfgate
//!
//! An authenticated command gateway for amateur-radio repeater control.
//! Operator commands arrive from the radio RX chain over local IPC
//! (ZeroMQ, a named pipe, or a Unix socket), are authenticated with
//! per-operator ECDSA keys, checked against replay and rate policy, and
//! executed against the SVXLink controller.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rfgate::{Gateway, GatewayConfig, KeyStore, ShutdownFlag, ZmqTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> rfgate::Result<()> {
//!     let config = GatewayConfig::load("/etc/rfgate/rfgate.yaml".as_ref())?;
//!     let keystore = KeyStore::load(&config.authorized_keys_dir)?;
//!     keystore.ensure_nonempty()?;
//!
//!     let mut transport = ZmqTransport::bind(&config).await?;
//!     let shutdown = ShutdownFlag::new();
//!     let gateway = Gateway::new(config, Arc::new(parking_lot::RwLock::new(keystore)));
//!     gateway.run(&mut transport, &shutdown).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod reply;
pub mod transport;

// Re-export main types
pub use auth::{verify_signature, AuthorizedKey, KeyFormat, KeyMaterial, KeyStore, Verdict};
pub use command::{normalize_callsign, CommandEnvelope};
pub use config::{ControlMode, GatewayConfig, IpcMechanism};
pub use control::{Executor, Outcome, RepeaterCommand};
pub use error::{
    AuthError, ConfigError, ExecutionError, GatewayError, ParseError, ReplayError, Result,
    SignatureError, TransportError,
};
pub use gateway::{Gateway, ProcessOutcome};
pub use guard::{GuardPolicy, ReplayGuard};
pub use reply::{extract_parameter, Reply, ReplyStatus};
pub use transport::{
    CommandSource, ParameterUpdate, PipeSource, ReceivedFrame, ShutdownFlag, UnixSocketSource,
    ZmqTransport,
};
