//! Command transports
//!
//! Every transport produces the same `(payload, signature)` pair and
//! feeds one shared processing pipeline; the gateway never cares which
//! mechanism a frame arrived on. Stream transports (named pipe, unix
//! socket) carry self-delimiting records of two length-prefixed frames:
//! `u32-be len | payload | u32-be len | signature`.

mod pipe;
mod zmq;

pub use pipe::{PipeSource, UnixSocketSource};
pub use zmq::ZmqTransport;

use crate::error::TransportError;
use crate::reply::Reply;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Upper bound for one frame; operator commands are tiny and anything
/// bigger is garbage or abuse
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// One received `(payload, signature)` pair, transport-agnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// The signed command payload (JSON or legacy text)
    pub payload: Vec<u8>,
    /// DER signature bytes; may be empty only in testing mode
    pub signature: Vec<u8>,
}

/// Parameter-update notification published after successful execution
#[derive(Debug, Clone, Serialize)]
pub struct ParameterUpdate {
    /// Extracted parameter name (best-effort, see `reply`)
    pub parameter: String,
    /// Extracted value with unit
    pub value: String,
    /// Operator that issued the command
    pub operator: String,
    /// The command that was executed
    pub command: String,
    /// Unix timestamp of the update
    pub timestamp: f64,
}

/// A source of command frames plus the reply path back to the sender
///
/// Implementations must return `Ok(None)` from `recv` on poll timeout so
/// the caller can re-check the shutdown flag; per-message errors are
/// returned, logged by the caller, and never abort the loop.
#[async_trait]
pub trait CommandSource {
    /// Short transport name for logs
    fn name(&self) -> &'static str;

    /// Wait up to the poll interval for the next frame
    async fn recv(&mut self) -> Result<Option<ReceivedFrame>, TransportError>;

    /// Send a reply for a processed command
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), TransportError>;

    /// Publish a parameter-update notification (no-op on transports
    /// without a notification channel)
    async fn publish_update(&mut self, update: &ParameterUpdate) -> Result<(), TransportError>;
}

/// Process-wide shutdown flag, set by signal handlers and polled at the
/// top of every transport loop iteration
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Incremental decoder for the length-prefixed record stream
///
/// Bytes are appended by cancel-safe single `read` calls and complete
/// records are peeled off as they become available, so a poll timeout in
/// the middle of a record never loses stream synchronization.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buf: BytesMut,
}

impl RecordDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer for the next read call
    pub fn buffer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Try to peel one complete record off the front of the buffer
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FrameTooLarge`] for an oversized length
    /// prefix; the stream is unrecoverable at that point and the caller
    /// should drop the connection.
    pub fn next_record(&mut self) -> Result<Option<ReceivedFrame>, TransportError> {
        let Some((payload_len, sig_offset)) = self.frame_len(0)? else {
            return Ok(None);
        };
        let Some((sig_len, total)) = self.frame_len(sig_offset)? else {
            return Ok(None);
        };

        if self.buf.len() < total {
            return Ok(None);
        }

        self.buf.advance(4);
        let payload = self.buf.split_to(payload_len).to_vec();
        self.buf.advance(4);
        let signature = self.buf.split_to(sig_len).to_vec();

        Ok(Some(ReceivedFrame { payload, signature }))
    }

    /// Read the length prefix at `offset`, returning the frame length
    /// and the offset just past the frame
    fn frame_len(&self, offset: usize) -> Result<Option<(usize, usize)>, TransportError> {
        if self.buf.len() < offset + 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([
            self.buf[offset],
            self.buf[offset + 1],
            self.buf[offset + 2],
            self.buf[offset + 3],
        ]) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge { size: len });
        }

        Ok(Some((len, offset + 4 + len)))
    }
}

/// Encode one record as two length-prefixed frames
pub fn encode_record(payload: &[u8], signature: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len() + signature.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&(signature.len() as u32).to_be_bytes());
    out.extend_from_slice(signature);
    out
}

/// Encode a single length-prefixed frame (reply path)
pub fn encode_frame(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_record() {
        let mut decoder = RecordDecoder::new();
        decoder
            .buffer()
            .extend_from_slice(&encode_record(b"payload", b"sig"));

        let record = decoder.next_record().unwrap().unwrap();
        assert_eq!(record.payload, b"payload");
        assert_eq!(record.signature, b"sig");
        assert!(decoder.next_record().unwrap().is_none());
    }

    #[test]
    fn test_decode_across_split_reads() {
        let encoded = encode_record(b"hello world", b"signature-bytes");
        let mut decoder = RecordDecoder::new();

        // Feed one byte at a time; no prefix boundary may desync it
        for byte in &encoded[..encoded.len() - 1] {
            decoder.buffer().extend_from_slice(&[*byte]);
            assert!(decoder.next_record().unwrap().is_none());
        }
        decoder
            .buffer()
            .extend_from_slice(&encoded[encoded.len() - 1..]);

        let record = decoder.next_record().unwrap().unwrap();
        assert_eq!(record.payload, b"hello world");
        assert_eq!(record.signature, b"signature-bytes");
    }

    #[test]
    fn test_decode_back_to_back_records() {
        let mut decoder = RecordDecoder::new();
        decoder.buffer().extend_from_slice(&encode_record(b"a", b"1"));
        decoder.buffer().extend_from_slice(&encode_record(b"b", b"2"));

        assert_eq!(decoder.next_record().unwrap().unwrap().payload, b"a");
        assert_eq!(decoder.next_record().unwrap().unwrap().payload, b"b");
        assert!(decoder.next_record().unwrap().is_none());
    }

    #[test]
    fn test_empty_signature_frame() {
        let mut decoder = RecordDecoder::new();
        decoder.buffer().extend_from_slice(&encode_record(b"p", b""));

        let record = decoder.next_record().unwrap().unwrap();
        assert!(record.signature.is_empty());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = RecordDecoder::new();
        let len = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        decoder.buffer().extend_from_slice(&len);
        decoder.buffer().extend_from_slice(&[0u8; 16]);

        assert!(matches!(
            decoder.next_record(),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_shutdown_flag() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());

        let clone = flag.clone();
        clone.trigger();
        assert!(flag.is_set());
    }
}
