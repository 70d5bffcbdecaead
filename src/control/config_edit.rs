//! Config-file fallback for an unreachable control port
//!
//! SVXLink's configuration is INI-shaped: `[Section]` headers followed
//! by `KEY=VALUE` lines. The fallback parses the file, updates the first
//! section whose name matches a command-specific prefix and already
//! carries the key, backs up the original, writes the new file
//! atomically, and signals the running controller to reload. Only a
//! found-and-written key counts as success.

use crate::error::ExecutionError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bound on reload/restart helper processes
const SIGNAL_TIMEOUT: Duration = Duration::from_secs(5);

/// An SVXLink-style INI file, kept as raw lines so comments, blank lines
/// and ordering survive the rewrite
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    lines: Vec<String>,
}

impl ControllerConfig {
    /// Parse from file contents
    pub fn parse(contents: &str) -> Self {
        Self {
            lines: contents.lines().map(|l| l.to_string()).collect(),
        }
    }

    /// Update `key` in the first section whose name starts with `prefix`
    /// (case-insensitive) and already contains the key
    ///
    /// Returns the section name that was updated.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a search description if no matching
    /// section/key pair exists; nothing is modified in that case.
    pub fn update_key(
        &mut self,
        prefix: &str,
        key: &str,
        value: &str,
    ) -> Result<String, String> {
        let prefix_upper = prefix.to_uppercase();
        let mut current_section: Option<String> = None;
        let mut target_line: Option<(usize, String)> = None;

        for (index, line) in self.lines.iter().enumerate() {
            let trimmed = line.trim();

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                current_section = Some(trimmed[1..trimmed.len() - 1].to_string());
                continue;
            }

            let section = match &current_section {
                Some(name) if name.to_uppercase().starts_with(&prefix_upper) => name.clone(),
                _ => continue,
            };

            if let Some((line_key, _)) = trimmed.split_once('=') {
                if line_key.trim().eq_ignore_ascii_case(key) {
                    target_line = Some((index, section));
                    break;
                }
            }
        }

        match target_line {
            Some((index, section)) => {
                self.lines[index] = format!("{}={}", key, value);
                Ok(section)
            }
            None => Err(format!(
                "no [{}*] section with key {} found",
                prefix_upper, key
            )),
        }
    }

    /// Serialize back to file contents
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Apply one setting to the controller config file on disk
///
/// Reads, updates, backs up the original to `<path>.bak`, then writes
/// via a temporary file and rename. Returns the updated section name.
///
/// # Errors
///
/// Returns [`ExecutionError::NoMatchingSetting`] if the file cannot be
/// read/written or no matching section/key exists.
pub fn apply_setting(
    path: &Path,
    prefix: &str,
    key: &str,
    value: &str,
) -> Result<String, ExecutionError> {
    let no_match = |reason: String| ExecutionError::NoMatchingSetting {
        path: path.to_path_buf(),
        reason,
    };

    let contents =
        std::fs::read_to_string(path).map_err(|e| no_match(format!("cannot read: {}", e)))?;

    let mut config = ControllerConfig::parse(&contents);
    let section = config
        .update_key(prefix, key, value)
        .map_err(no_match)?;

    let backup = path.with_extension("bak");
    std::fs::copy(path, &backup).map_err(|e| no_match(format!("backup failed: {}", e)))?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, config.render())
        .map_err(|e| no_match(format!("write failed: {}", e)))?;
    std::fs::rename(&tmp, path).map_err(|e| no_match(format!("rename failed: {}", e)))?;

    info!(
        file = %path.display(),
        section = %section,
        key,
        value,
        backup = %backup.display(),
        "Controller config updated"
    );

    Ok(section)
}

/// Ask the running controller process to reload its configuration
///
/// Best effort: a missing process is logged, not an error — the edit on
/// disk is still the source of truth for the next start.
pub async fn signal_reload(process_name: &str) {
    match run_bounded("pkill", &["-HUP", "-x", process_name]).await {
        Ok(true) => info!(process = process_name, "Sent reload signal"),
        Ok(false) => warn!(process = process_name, "No running process to signal"),
        Err(reason) => warn!(process = process_name, reason = %reason, "Reload signal failed"),
    }
}

/// Restart the controller via the process supervisor, falling back to a
/// hard kill-and-relaunch when the supervised restart fails
///
/// # Errors
///
/// Returns [`ExecutionError::RestartFailed`] only when every path fails.
pub async fn restart_controller(
    process_name: &str,
    timeout: Duration,
) -> Result<String, ExecutionError> {
    match run_bounded_with("systemctl", &["restart", process_name], timeout).await {
        Ok(true) => {
            info!(process = process_name, "Supervised restart complete");
            return Ok(format!("{} restarted via supervisor", process_name));
        }
        Ok(false) => debug!(process = process_name, "Supervised restart reported failure"),
        Err(reason) => {
            debug!(process = process_name, reason = %reason, "Supervised restart error")
        }
    }

    // Hard fallback: kill and relaunch the daemon directly
    let _ = run_bounded("pkill", &["-x", process_name]).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    match run_bounded(process_name, &["--daemon"]).await {
        Ok(true) => {
            warn!(process = process_name, "Controller relaunched after hard kill");
            Ok(format!("{} relaunched after hard restart", process_name))
        }
        Ok(false) => Err(ExecutionError::RestartFailed {
            reason: format!("{} relaunch exited nonzero", process_name),
        }),
        Err(reason) => Err(ExecutionError::RestartFailed { reason }),
    }
}

/// Run a helper process with the default signal timeout
async fn run_bounded(program: &str, args: &[&str]) -> Result<bool, String> {
    run_bounded_with(program, args, SIGNAL_TIMEOUT).await
}

/// Run a helper process, reporting `Ok(status.success())` or a spawn /
/// timeout diagnostic
async fn run_bounded_with(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<bool, String> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output.status.success()),
        Ok(Err(e)) => Err(format!("{} failed to spawn: {}", program, e)),
        Err(_) => Err(format!("{} timed out after {:?}", program, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
[GLOBAL]
LOGICS=RepeaterLogic

[RX_MAIN]
TYPE=Local
SQL_OPEN_THRESH=-30
SQL_CLOSE_THRESH=-32

[RX_AUX]
SQL_OPEN_THRESH=-28

[TX_MAIN]
TYPE=Local
TIMEOUT=300
";

    #[test]
    fn test_update_first_matching_section() {
        let mut config = ControllerConfig::parse(SAMPLE);
        let section = config.update_key("RX", "SQL_OPEN_THRESH", "-24").unwrap();
        assert_eq!(section, "RX_MAIN");

        let out = config.render();
        assert!(out.contains("SQL_OPEN_THRESH=-24"));
        // Only the first matching section changes
        assert!(out.contains("SQL_OPEN_THRESH=-28"));
        assert!(!out.contains("SQL_OPEN_THRESH=-30"));
    }

    #[test]
    fn test_update_tx_timeout() {
        let mut config = ControllerConfig::parse(SAMPLE);
        let section = config.update_key("TX", "TIMEOUT", "120").unwrap();
        assert_eq!(section, "TX_MAIN");
        assert!(config.render().contains("TIMEOUT=120"));
    }

    #[test]
    fn test_missing_key_is_error() {
        let mut config = ControllerConfig::parse(SAMPLE);
        assert!(config.update_key("RX", "NO_SUCH_KEY", "1").is_err());
        // Untouched on failure
        assert!(config.render().contains("SQL_OPEN_THRESH=-30"));
    }

    #[test]
    fn test_prefix_match_is_case_insensitive() {
        let mut config = ControllerConfig::parse("[Rx1]\nSQL_OPEN_THRESH=-30\n");
        let section = config.update_key("RX", "SQL_OPEN_THRESH", "-20").unwrap();
        assert_eq!(section, "Rx1");
    }

    #[test]
    fn test_apply_setting_writes_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svxlink.conf");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        drop(file);

        let section = apply_setting(&path, "RX", "SQL_OPEN_THRESH", "-24").unwrap();
        assert_eq!(section, "RX_MAIN");

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("SQL_OPEN_THRESH=-24"));

        let backup = std::fs::read_to_string(path.with_extension("bak")).unwrap();
        assert!(backup.contains("SQL_OPEN_THRESH=-30"));
    }

    #[test]
    fn test_apply_setting_missing_file() {
        let result = apply_setting(Path::new("/nonexistent/svxlink.conf"), "RX", "K", "1");
        assert!(matches!(
            result,
            Err(ExecutionError::NoMatchingSetting { .. })
        ));
    }
}
