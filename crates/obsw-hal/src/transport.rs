//! Byte-stream and frame transports.
//!
//! A byte stream is a raw serial-style pipe without message boundaries.
//! A frame transport moves delimited frames; [`CobsFrameTransport`] builds
//! one on top of any byte stream using COBS stuffing with `0x00` frame
//! delimiters, resynchronizing on garbage in between.

use std::time::{Duration, Instant};

use obsw_coding::{Cobs, CobsFrame};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,
    #[error("serial line stopped")]
    SerialStopped,
    #[error("destination buffer too small")]
    BufferTooSmall,
    #[error("transport failure")]
    Transport,
}

/// Transmit side of a raw byte stream.
pub trait ByteStreamTx: Send {
    /// Writes all of `data`; returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;
}

/// Receive side of a raw byte stream.
pub trait ByteStreamRx: Send {
    /// Reads up to `dst.len()` bytes, waiting at most `timeout` for the
    /// first byte. Returns the number of bytes read.
    fn read(&mut self, dst: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}

/// Transmit side of a frame-delimited transport.
pub trait FrameTransportTx: Send {
    /// Sends one frame; returns the bytes put on the wire, framing
    /// included.
    fn transmit_frame(&mut self, payload: &[u8]) -> Result<usize, TransportError>;
}

/// Receive side of a frame-delimited transport.
pub trait FrameTransportRx: Send {
    /// Receives one frame payload into `dst`; returns its length.
    fn receive_frame(&mut self, dst: &mut [u8], timeout: Duration)
    -> Result<usize, TransportError>;
}

/// COBS framing over a byte stream.
pub struct CobsFrameTransport<S> {
    stream: S,
    /// Bytes read from the stream but not yet consumed as frames.
    pending: Vec<u8>,
    max_frame_length: usize,
}

impl<S> CobsFrameTransport<S> {
    pub fn new(stream: S, max_frame_length: usize) -> Self {
        Self {
            stream,
            pending: Vec::with_capacity(CobsFrame::max_encoded_len(max_frame_length)),
            max_frame_length,
        }
    }

    pub fn into_stream(self) -> S {
        self.stream
    }
}

impl<S: ByteStreamTx> FrameTransportTx for CobsFrameTransport<S> {
    fn transmit_frame(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        if payload.len() > self.max_frame_length {
            return Err(TransportError::BufferTooSmall);
        }
        let mut encoded = vec![0u8; CobsFrame::max_encoded_len(payload.len())];
        let length = CobsFrame::encode(payload, &mut encoded);
        self.stream.write(&encoded[..length])
    }
}

impl<S: ByteStreamRx> FrameTransportRx for CobsFrameTransport<S> {
    fn receive_frame(
        &mut self,
        dst: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            // try to extract a frame from what is buffered already
            loop {
                let mut input = self.pending.as_slice();
                let before = input.len();
                let result = CobsFrame::decode(&mut input, dst);
                let remaining = input.len();
                if result.consumed == 0 {
                    break; // incomplete frame, read more
                }
                self.pending.drain(..before - remaining);
                if result.payload_len > 0 {
                    return Ok(result.payload_len);
                }
                // empty or garbage frame: resynchronize and keep scanning
                log::debug!("discarded {} bytes while resynchronizing", result.consumed);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            let n = self.stream.read(&mut chunk, remaining)?;
            if n == 0 {
                return Err(TransportError::Timeout);
            }
            self.pending.extend_from_slice(&chunk[..n]);

            // an unframed flood must not grow the buffer without bound
            let limit = Cobs::<254>::max_encoded_len(self.max_frame_length) + 1;
            if self.pending.len() > 2 * limit && !self.pending.contains(&0) {
                log::warn!("dropping {} unframed bytes", self.pending.len());
                self.pending.clear();
            }
        }
    }
}
