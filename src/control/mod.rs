//! Control-plane executor
//!
//! Applies a parsed operator command to the repeater controller. The TCP
//! control port is always tried first (unless the gateway is configured
//! for config-only control); a refused or timed-out connection falls back
//! to editing the controller's config file and signaling a reload. No
//! execution path escalates to a crash — exhausting every strategy
//! produces a failure outcome that becomes a failure reply.

mod config_edit;
mod tcp;

pub use config_edit::{apply_setting, restart_controller, signal_reload, ControllerConfig};
pub use tcp::send_command;

use crate::config::{ControlMode, GatewayConfig};
use crate::error::ExecutionError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the controller process for reload signals and restarts
const CONTROLLER_PROCESS: &str = "svxlink";

/// A recognized repeater command, or a raw passthrough
///
/// Dynamic string dispatch is deliberately avoided: known commands are
/// validated into typed variants and matched exhaustively, everything
/// else travels verbatim to the control port.
#[derive(Debug, Clone, PartialEq)]
pub enum RepeaterCommand {
    /// Set the receiver squelch threshold, dB
    SetSquelch(f64),
    /// Set transmitter output power, percent
    SetPower(f64),
    /// Set the transmit timeout, seconds
    SetTimeout(u64),
    /// Restart the controller process
    Restart,
    /// Unrecognized command forwarded verbatim to the control port
    Raw {
        /// Upper-cased command name
        name: String,
        /// Positional arguments as received
        args: Vec<String>,
    },
}

impl RepeaterCommand {
    /// Validate a command name and its positional arguments
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::InvalidArguments`] when a known command
    /// gets the wrong argument count or an unparseable value. Unknown
    /// names are never an error — they become [`RepeaterCommand::Raw`].
    pub fn from_parts(name: &str, args: &[String]) -> Result<Self, ExecutionError> {
        let invalid = |reason: &str| ExecutionError::InvalidArguments {
            command: name.to_string(),
            reason: reason.to_string(),
        };

        match name {
            "SET_SQUELCH" => {
                let [value] = args else {
                    return Err(invalid("expected exactly one threshold in dB"));
                };
                let threshold: f64 = value
                    .parse()
                    .map_err(|_| invalid("threshold is not a number"))?;
                Ok(Self::SetSquelch(threshold))
            }
            "SET_POWER" => {
                let [value] = args else {
                    return Err(invalid("expected exactly one power percentage"));
                };
                let percent: f64 = value
                    .parse()
                    .map_err(|_| invalid("power is not a number"))?;
                Ok(Self::SetPower(percent))
            }
            "SET_TIMEOUT" => {
                let [value] = args else {
                    return Err(invalid("expected exactly one timeout in seconds"));
                };
                let seconds: u64 = value
                    .parse()
                    .map_err(|_| invalid("timeout is not a non-negative integer"))?;
                Ok(Self::SetTimeout(seconds))
            }
            "RESTART" => {
                if !args.is_empty() {
                    return Err(invalid("takes no arguments"));
                }
                Ok(Self::Restart)
            }
            _ => Ok(Self::Raw {
                name: name.to_string(),
                args: args.to_vec(),
            }),
        }
    }

    /// Command name for logs and replies
    pub fn name(&self) -> &str {
        match self {
            Self::SetSquelch(_) => "SET_SQUELCH",
            Self::SetPower(_) => "SET_POWER",
            Self::SetTimeout(_) => "SET_TIMEOUT",
            Self::Restart => "RESTART",
            Self::Raw { name, .. } => name,
        }
    }

    /// The line sent over the control-plane TCP protocol
    pub fn wire_format(&self) -> String {
        match self {
            Self::SetSquelch(db) => format!("SET_SQUELCH {}", db),
            Self::SetPower(percent) => format!("SET_POWER {}", percent),
            Self::SetTimeout(seconds) => format!("SET_TIMEOUT {}", seconds),
            Self::Restart => "RESTART".to_string(),
            Self::Raw { name, args } => {
                if args.is_empty() {
                    name.clone()
                } else {
                    format!("{} {}", name, args.join(" "))
                }
            }
        }
    }
}

/// Result of one execution attempt; failures carry a diagnostic message
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Whether the command took effect
    pub success: bool,
    /// Controller response or failure diagnostic
    pub message: String,
}

impl Outcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Control-plane executor bound to one controller instance
#[derive(Debug, Clone)]
pub struct Executor {
    address: String,
    timeout: Duration,
    mode: ControlMode,
    config_path: PathBuf,
}

impl Executor {
    /// Build an executor from gateway configuration
    pub fn new(config: &GatewayConfig) -> Self {
        if config.svxlink_control == ControlMode::Dtmf {
            warn!("DTMF control is not implemented; falling back to TCP");
        }
        Self {
            address: config.svxlink_address(),
            timeout: config.command_timeout(),
            mode: config.svxlink_control,
            config_path: config.svxlink_config.clone(),
        }
    }

    /// Execute a command, trying TCP first and the config-file edit as
    /// fallback; never returns an error, only an [`Outcome`]
    pub async fn execute(&self, command: &RepeaterCommand) -> Outcome {
        if let RepeaterCommand::Restart = command {
            return match restart_controller(CONTROLLER_PROCESS, self.timeout).await {
                Ok(message) => Outcome::ok(message),
                Err(e) => Outcome::failed(e.to_string()),
            };
        }

        let tcp_failure = if self.mode == ControlMode::Config {
            "TCP control disabled by configuration".to_string()
        } else {
            match send_command(&self.address, &command.wire_format(), self.timeout).await {
                Ok(response) => return Outcome::ok(response),
                Err(e) => {
                    debug!(command = command.name(), error = %e, "TCP control failed, trying config fallback");
                    e.to_string()
                }
            }
        };

        match self.config_fallback(command).await {
            Ok(message) => Outcome::ok(message),
            Err(e) => Outcome::failed(format!("{}; config fallback: {}", tcp_failure, e)),
        }
    }

    /// Config-file edit path for commands that map to a stored setting
    async fn config_fallback(&self, command: &RepeaterCommand) -> Result<String, ExecutionError> {
        let (prefix, key, value) = match command {
            RepeaterCommand::SetSquelch(db) => ("RX", "SQL_OPEN_THRESH", db.to_string()),
            RepeaterCommand::SetTimeout(seconds) => ("TX", "TIMEOUT", seconds.to_string()),
            RepeaterCommand::SetPower(_) => {
                return Err(ExecutionError::NoMatchingSetting {
                    path: self.config_path.clone(),
                    reason: "TX power has no config-file equivalent".to_string(),
                })
            }
            RepeaterCommand::Raw { name, .. } => {
                return Err(ExecutionError::NoMatchingSetting {
                    path: self.config_path.clone(),
                    reason: format!("{} has no config-file equivalent", name),
                })
            }
            RepeaterCommand::Restart => unreachable!("restart handled before fallback"),
        };

        let section = apply_setting(&self.config_path, prefix, key, &value)?;
        signal_reload(CONTROLLER_PROCESS).await;
        Ok(format!("{} updated to {} in [{}]", key, value, section))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_from_parts_known_commands() {
        assert_eq!(
            RepeaterCommand::from_parts("SET_SQUELCH", &args(&["-24"])).unwrap(),
            RepeaterCommand::SetSquelch(-24.0)
        );
        assert_eq!(
            RepeaterCommand::from_parts("SET_POWER", &args(&["50.5"])).unwrap(),
            RepeaterCommand::SetPower(50.5)
        );
        assert_eq!(
            RepeaterCommand::from_parts("SET_TIMEOUT", &args(&["300"])).unwrap(),
            RepeaterCommand::SetTimeout(300)
        );
        assert_eq!(
            RepeaterCommand::from_parts("RESTART", &[]).unwrap(),
            RepeaterCommand::Restart
        );
    }

    #[test]
    fn test_from_parts_validation() {
        assert!(RepeaterCommand::from_parts("SET_SQUELCH", &[]).is_err());
        assert!(RepeaterCommand::from_parts("SET_SQUELCH", &args(&["abc"])).is_err());
        assert!(RepeaterCommand::from_parts("SET_TIMEOUT", &args(&["-5"])).is_err());
        assert!(RepeaterCommand::from_parts("RESTART", &args(&["now"])).is_err());
    }

    #[test]
    fn test_unknown_command_is_raw_passthrough() {
        let cmd = RepeaterCommand::from_parts("CONNECT", &args(&["echolink", "123"])).unwrap();
        assert_eq!(
            cmd,
            RepeaterCommand::Raw {
                name: "CONNECT".to_string(),
                args: args(&["echolink", "123"]),
            }
        );
        assert_eq!(cmd.wire_format(), "CONNECT echolink 123");
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(
            RepeaterCommand::SetSquelch(-24.0).wire_format(),
            "SET_SQUELCH -24"
        );
        assert_eq!(RepeaterCommand::Restart.wire_format(), "RESTART");
    }
}
