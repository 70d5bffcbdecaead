//! Named pipe and Unix socket transports
//!
//! Both carry the same record format: two `u32`-be length-prefixed
//! frames (payload, then signature). The FIFO is a one-way street —
//! replies go out on a companion FIFO at `<fifo_path>.out` and are
//! dropped when nothing is reading it. The Unix socket is
//! bidirectional and serves one client at a time, which matches the
//! single RX chain that feeds it.

use super::{encode_frame, CommandSource, ParameterUpdate, ReceivedFrame, RecordDecoder};
use crate::config::GatewayConfig;
use crate::error::TransportError;
use crate::reply::Reply;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// ENXIO: opening a FIFO for writing with no reader attached
const NO_READER: i32 = 6;

/// Command source backed by a named pipe
pub struct PipeSource {
    path: PathBuf,
    out_path: PathBuf,
    reader: pipe::Receiver,
    writer: Option<pipe::Sender>,
    decoder: RecordDecoder,
    poll: Duration,
}

impl PipeSource {
    /// Create (if needed) and open the command FIFO
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] when the FIFO cannot be
    /// created or opened for reading.
    pub fn open(config: &GatewayConfig) -> Result<Self, TransportError> {
        let path = config.fifo_path.clone();
        let out_path = {
            let mut name = path.as_os_str().to_os_string();
            name.push(".out");
            PathBuf::from(name)
        };

        ensure_fifo(&path)?;
        // Reply FIFO is best effort; the command path must exist, the
        // reply path is optional
        if let Err(e) = ensure_fifo(&out_path) {
            warn!(path = %out_path.display(), error = %e, "Reply FIFO unavailable");
        }

        let reader = open_receiver(&path)?;
        info!(path = %path.display(), "Command FIFO open");

        Ok(Self {
            path,
            out_path,
            reader,
            writer: None,
            decoder: RecordDecoder::new(),
            poll: config.poll_interval(),
        })
    }
}

fn ensure_fifo(path: &Path) -> Result<(), TransportError> {
    if path.exists() {
        return Ok(());
    }

    let status = std::process::Command::new("mkfifo")
        .arg(path)
        .status()
        .map_err(|e| TransportError::BindFailed {
            endpoint: path.display().to_string(),
            reason: format!("mkfifo failed to spawn: {}", e),
        })?;

    if !status.success() {
        return Err(TransportError::BindFailed {
            endpoint: path.display().to_string(),
            reason: "mkfifo exited nonzero".to_string(),
        });
    }
    Ok(())
}

fn open_receiver(path: &Path) -> Result<pipe::Receiver, TransportError> {
    pipe::OpenOptions::new()
        .open_receiver(path)
        .map_err(|e| TransportError::BindFailed {
            endpoint: path.display().to_string(),
            reason: format!("open for reading failed: {}", e),
        })
}

#[async_trait]
impl CommandSource for PipeSource {
    fn name(&self) -> &'static str {
        "fifo"
    }

    async fn recv(&mut self) -> Result<Option<ReceivedFrame>, TransportError> {
        loop {
            if let Some(record) = self.decoder.next_record()? {
                return Ok(Some(record));
            }

            let read = tokio::time::timeout(self.poll, self.reader.read_buf(self.decoder.buffer()));
            match read.await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => {
                    return Err(TransportError::ReceiveFailed {
                        reason: e.to_string(),
                    })
                }
                Ok(Ok(0)) => {
                    // Writer side closed (or never opened). Re-open the
                    // read end and let the caller check the shutdown flag
                    // before the next poll.
                    self.reader = open_receiver(&self.path)?;
                    tokio::time::sleep(self.poll).await;
                    return Ok(None);
                }
                Ok(Ok(_)) => continue,
            }
        }
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), TransportError> {
        if self.writer.is_none() {
            match pipe::OpenOptions::new().open_sender(&self.out_path) {
                Ok(sender) => self.writer = Some(sender),
                Err(e) if e.raw_os_error() == Some(NO_READER) => {
                    debug!(path = %self.out_path.display(), "No reply reader attached; reply dropped");
                    return Ok(());
                }
                Err(e) => {
                    return Err(TransportError::SendFailed {
                        reason: format!("reply FIFO open failed: {}", e),
                    })
                }
            }
        }

        let frame = encode_frame(&reply.to_text_frame());
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_all(&frame).await {
                self.writer = None;
                return Err(TransportError::SendFailed {
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn publish_update(&mut self, _update: &ParameterUpdate) -> Result<(), TransportError> {
        // The FIFO has no notification channel
        Ok(())
    }
}

/// Command source backed by a Unix stream socket, one client at a time
pub struct UnixSocketSource {
    listener: UnixListener,
    client: Option<UnixStream>,
    decoder: RecordDecoder,
    poll: Duration,
}

impl UnixSocketSource {
    /// Bind the listening socket, replacing a stale socket file
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] when the path cannot be
    /// bound.
    pub fn bind(config: &GatewayConfig) -> Result<Self, TransportError> {
        let path = &config.socket_path;
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }

        let listener = UnixListener::bind(path).map_err(|e| TransportError::BindFailed {
            endpoint: path.display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), "Command socket listening");

        Ok(Self {
            listener,
            client: None,
            decoder: RecordDecoder::new(),
            poll: config.poll_interval(),
        })
    }
}

#[async_trait]
impl CommandSource for UnixSocketSource {
    fn name(&self) -> &'static str {
        "socket"
    }

    async fn recv(&mut self) -> Result<Option<ReceivedFrame>, TransportError> {
        let Some(client) = self.client.as_mut() else {
            match tokio::time::timeout(self.poll, self.listener.accept()).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => {
                    return Err(TransportError::ReceiveFailed {
                        reason: format!("accept failed: {}", e),
                    })
                }
                Ok(Ok((stream, _))) => {
                    debug!("Command client connected");
                    self.client = Some(stream);
                    self.decoder = RecordDecoder::new();
                    return Ok(None);
                }
            }
        };

        loop {
            if let Some(record) = self.decoder.next_record()? {
                return Ok(Some(record));
            }

            let read = tokio::time::timeout(self.poll, client.read_buf(self.decoder.buffer()));
            match read.await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => {
                    self.client = None;
                    return Err(TransportError::ReceiveFailed {
                        reason: e.to_string(),
                    });
                }
                Ok(Ok(0)) => {
                    debug!("Command client disconnected");
                    self.client = None;
                    return Ok(None);
                }
                Ok(Ok(_)) => continue,
            }
        }
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), TransportError> {
        let Some(client) = self.client.as_mut() else {
            debug!("No client connected; reply dropped");
            return Ok(());
        };

        let frame = encode_frame(&reply.to_text_frame());
        if let Err(e) = client.write_all(&frame).await {
            self.client = None;
            return Err(TransportError::SendFailed {
                reason: e.to_string(),
            });
        }
        client.flush().await.map_err(|e| TransportError::SendFailed {
            reason: e.to_string(),
        })
    }

    async fn publish_update(&mut self, _update: &ParameterUpdate) -> Result<(), TransportError> {
        // No notification channel on the socket transport
        Ok(())
    }
}
