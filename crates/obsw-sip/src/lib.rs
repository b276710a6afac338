//! Simple request/response packet protocol over byte links.
//!
//! Wire format (big-endian):
//!
//! ```text
//! byte 0..1 : length  (= 3 + payload length)
//! byte 2    : worker id
//! byte 3    : counter
//! byte 4    : type
//! byte 5..  : payload
//! last 2    : CRC-16/CCITT over bytes [0 .. 5 + payload length)
//! ```
//!
//! A [`Coordinator`] issues requests towards workers and awaits the typed
//! response on a single-slot queue fed by a [`CoordinatorPacketReceiver`]
//! thread; a [`Worker`] answers with response packets. Parallel
//! transactions are not allowed by design, which keeps the correlation
//! logic to a worker-id and type check.

pub mod coordinator;
pub mod packet;
pub mod receiver;
pub mod transport;
pub mod worker;

pub use coordinator::{Coordinator, ResponseData};
pub use packet::{PacketReader, PacketWriter};
pub use receiver::{CoordinatorPacketReceiver, ReceiveOutcome};
pub use transport::{PacketTransportRx, PacketTransportTx, PacketTransportWrapper};
pub use worker::Worker;

use thiserror::Error;

/// Bytes of the header counted by the length field (worker id, counter,
/// type).
pub const STRUCTURE_IN_LENGTH: usize = 3;

/// Length field plus the three counted header bytes.
pub const PACKET_HEADER_LENGTH: usize = 5;

/// Smallest valid packet: header plus CRC, no payload.
pub const MIN_PACKET_SIZE: usize = PACKET_HEADER_LENGTH + 2;

/// Per-packet payload upper bound. Must stay below the length field's
/// range.
pub const MAX_PAYLOAD_LENGTH: usize = 1024;

/// Wire-size upper bound of a packet.
pub const MAX_PACKET_LENGTH: usize = MAX_PAYLOAD_LENGTH + MIN_PACKET_SIZE;

const _LENGTH_FIELD_FITS: () = assert!(MAX_PAYLOAD_LENGTH <= 0xFFFF - STRUCTURE_IN_LENGTH);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SipError {
    // read results
    /// Buffer shorter than the minimum packet or than the announced
    /// length.
    #[error("buffer too small for a packet")]
    LengthErrorTooSmall,
    /// Announced payload length exceeds the configured maximum.
    #[error("announced length exceeds the payload bound")]
    LengthErrorEndOfFrame,
    #[error("checksum mismatch")]
    CrcError,
    // write results
    #[error("payload rejected")]
    BufferError,
    #[error("packet not finalized, call update() first")]
    NotFinalized,
    // coordinator
    #[error("transmit failed")]
    TransmitError,
    #[error("no response before the timeout")]
    ResponseError,
    #[error("response from an unexpected worker")]
    WorkerIdError,
    #[error("response of an unexpected type")]
    ResponseTypeError,
    // transport codes
    #[error("transport failure")]
    TransportError,
    #[error("timed out")]
    Timeout,
    #[error("serial line stopped")]
    SerialStopped,
}

impl From<obsw_hal::TransportError> for SipError {
    fn from(error: obsw_hal::TransportError) -> Self {
        match error {
            obsw_hal::TransportError::Timeout => SipError::Timeout,
            obsw_hal::TransportError::SerialStopped => SipError::SerialStopped,
            obsw_hal::TransportError::BufferTooSmall => SipError::LengthErrorTooSmall,
            obsw_hal::TransportError::Transport => SipError::TransportError,
        }
    }
}
