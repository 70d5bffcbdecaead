//! Gateway configuration
//!
//! Configuration is loaded once at startup from a YAML file. Every key is
//! optional and falls back to a documented default; a missing or
//! unparseable file is fatal (there is no sensible gateway without a key
//! directory and control endpoint to point at).

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// IPC mechanism used to receive `(payload, signature)` pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpcMechanism {
    /// ZeroMQ PULL receive socket plus PUB reply/parameter sockets
    #[default]
    Zmq,
    /// Named pipe carrying length-prefixed records
    Fifo,
    /// Unix stream socket carrying the same record format as the pipe
    Socket,
}

/// How the executor reaches the repeater controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// TCP control port first, config-file edit as fallback
    #[default]
    Tcp,
    /// Config-file edit only (controller has no TCP port enabled)
    Config,
    /// DTMF injection (reserved; treated as TCP with a warning)
    Dtmf,
}

/// Complete gateway configuration
///
/// Instances come from [`GatewayConfig::load`] and are validated before
/// the gateway starts. Defaults match a single-repeater SVXLink install.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Transport that feeds the command pipeline
    #[serde(default)]
    pub ipc_mechanism: IpcMechanism,

    /// ZeroMQ endpoint the receive (PULL) socket binds to
    /// (also accepted under its older name `zmq_rx_socket`)
    #[serde(default = "default_zmq_rx_bind", alias = "zmq_rx_socket")]
    pub zmq_rx_bind: String,

    /// ZeroMQ endpoint replies are published on
    /// (also accepted under its older name `zmq_tx_socket`)
    #[serde(default = "default_zmq_reply_bind", alias = "zmq_tx_socket")]
    pub zmq_reply_bind: String,

    /// ZeroMQ endpoint parameter-update notifications are published on
    #[serde(default = "default_zmq_param_bind")]
    pub zmq_param_bind: String,

    /// Path of the command FIFO (created if absent)
    #[serde(default = "default_fifo_path")]
    pub fifo_path: PathBuf,

    /// Path of the Unix stream socket (for `ipc_mechanism: socket`)
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Directory holding one public key file per operator
    #[serde(default = "default_authorized_keys_dir")]
    pub authorized_keys_dir: PathBuf,

    /// Replay window in seconds; older commands are rejected
    #[serde(default = "default_replay_window")]
    pub replay_protection_window: u64,

    /// Allowed clock skew in seconds for future-dated commands
    #[serde(default = "default_clock_skew")]
    pub clock_skew: u64,

    /// Per-operator command budget over a rolling minute
    #[serde(default = "default_max_commands_per_minute")]
    pub max_commands_per_minute: usize,

    /// Timeout in seconds for control-plane TCP operations
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    /// Control-plane strategy
    #[serde(default)]
    pub svxlink_control: ControlMode,

    /// Hostname of the SVXLink TCP control port
    #[serde(default = "default_svxlink_tcp_host")]
    pub svxlink_tcp_host: String,

    /// Port of the SVXLink TCP control port
    #[serde(default = "default_svxlink_tcp_port")]
    pub svxlink_tcp_port: u16,

    /// Path of the SVXLink configuration file (fallback edits)
    #[serde(default = "default_svxlink_config")]
    pub svxlink_config: PathBuf,

    /// Callsign used as the source of replies
    #[serde(default = "default_repeater_callsign")]
    pub repeater_callsign: String,

    /// Accept empty signatures (testing only, never enable in production)
    #[serde(default)]
    pub allow_unsigned_testing: bool,

    /// Transport poll timeout in seconds (shutdown flag check interval)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Log level filter (overridden by `RUST_LOG` when set)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_zmq_rx_bind() -> String {
    "tcp://127.0.0.1:5550".to_string()
}

fn default_zmq_reply_bind() -> String {
    "tcp://127.0.0.1:5551".to_string()
}

fn default_zmq_param_bind() -> String {
    "tcp://127.0.0.1:5552".to_string()
}

fn default_fifo_path() -> PathBuf {
    PathBuf::from("/tmp/rfgate.cmd")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/rfgate.sock")
}

fn default_authorized_keys_dir() -> PathBuf {
    PathBuf::from("./authorized_keys")
}

fn default_replay_window() -> u64 {
    300
}

fn default_clock_skew() -> u64 {
    60
}

fn default_max_commands_per_minute() -> usize {
    10
}

fn default_command_timeout() -> u64 {
    30
}

fn default_svxlink_tcp_host() -> String {
    "localhost".to_string()
}

fn default_svxlink_tcp_port() -> u16 {
    5210
}

fn default_svxlink_config() -> PathBuf {
    PathBuf::from("/etc/svxlink/svxlink.conf")
}

fn default_repeater_callsign() -> String {
    "REPEATER".to_string()
}

fn default_poll_interval() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ipc_mechanism: IpcMechanism::default(),
            zmq_rx_bind: default_zmq_rx_bind(),
            zmq_reply_bind: default_zmq_reply_bind(),
            zmq_param_bind: default_zmq_param_bind(),
            fifo_path: default_fifo_path(),
            socket_path: default_socket_path(),
            authorized_keys_dir: default_authorized_keys_dir(),
            replay_protection_window: default_replay_window(),
            clock_skew: default_clock_skew(),
            max_commands_per_minute: default_max_commands_per_minute(),
            command_timeout: default_command_timeout(),
            svxlink_control: ControlMode::default(),
            svxlink_tcp_host: default_svxlink_tcp_host(),
            svxlink_tcp_port: default_svxlink_tcp_port(),
            svxlink_config: default_svxlink_config(),
            repeater_callsign: default_repeater_callsign(),
            allow_unsigned_testing: false,
            poll_interval: default_poll_interval(),
            log_level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is missing, unparseable, or
    /// fails validation. All three are fatal at startup.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self =
            serde_yaml::from_str(&raw).map_err(|e| ConfigError::Unparseable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::InvalidValue`] for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.replay_protection_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "replay_protection_window".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.max_commands_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_commands_per_minute".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.command_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "command_timeout".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.poll_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.repeater_callsign.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repeater_callsign".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if self.authorized_keys_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "authorized_keys_dir".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Control-plane timeout as a [`Duration`]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    /// Transport poll timeout as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// `host:port` address of the SVXLink control socket
    pub fn svxlink_address(&self) -> String {
        format!("{}:{}", self.svxlink_tcp_host, self.svxlink_tcp_port)
    }
}
