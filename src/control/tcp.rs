//! TCP control client for the repeater controller
//!
//! SVXLink's control protocol is line-oriented: the client sends
//! `"<COMMAND> <args...>\n"` and the server answers with a single
//! response of up to 4096 bytes, newline-terminated or connection-closed.

use crate::error::ExecutionError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Maximum control response read in one shot
const MAX_RESPONSE_BYTES: usize = 4096;

/// Send one command line and read the response, bounded by `timeout`
///
/// # Errors
///
/// Returns [`ExecutionError::ControlUnreachable`] on connect failure,
/// I/O failure, or timeout. The caller decides whether to fall back to
/// a config-file edit.
pub async fn send_command(
    address: &str,
    command: &str,
    timeout: Duration,
) -> Result<String, ExecutionError> {
    let unreachable = |reason: String| ExecutionError::ControlUnreachable {
        address: address.to_string(),
        reason,
    };

    let exchange = async {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|e| unreachable(format!("connect failed: {}", e)))?;

        stream
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(|e| unreachable(format!("send failed: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| unreachable(format!("flush failed: {}", e)))?;

        let mut buf = vec![0u8; MAX_RESPONSE_BYTES];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| unreachable(format!("read failed: {}", e)))?;
        buf.truncate(n);

        let response = String::from_utf8_lossy(&buf).trim_end().to_string();
        debug!(address, command, response = %response, "Control exchange complete");
        Ok(response)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| unreachable(format!("timed out after {:?}", timeout)))?
}
