//! Packet-level transport abstraction.
//!
//! Validated packets cross a [`PacketTransportTx`]/[`PacketTransportRx`]
//! pair; [`PacketTransportWrapper`] adapts any frame transport (COBS over
//! serial, a SpaceWire channel, ...) to the packet level, validating
//! received frames before they reach the caller.

use std::time::Duration;

use obsw_hal::{FrameTransportRx, FrameTransportTx};

use crate::SipError;
use crate::packet::PacketReader;

/// Transmit side of a packet transport.
pub trait PacketTransportTx: Send {
    /// Transmits a finalized packet; returns the bytes put on the wire
    /// (framing included).
    fn transmit(&mut self, packet: &PacketReader<'_>) -> Result<usize, SipError>;
}

/// Receive side of a packet transport.
pub trait PacketTransportRx: Send {
    /// Receives one packet into `buffer` and returns a validated reader
    /// over it.
    fn receive<'a>(
        &mut self,
        buffer: &'a mut [u8],
        timeout: Duration,
    ) -> Result<PacketReader<'a>, SipError>;
}

/// Packet transport over an underlying frame transport.
pub struct PacketTransportWrapper<F> {
    frame_transport: F,
}

impl<F> PacketTransportWrapper<F> {
    pub fn new(frame_transport: F) -> Self {
        Self { frame_transport }
    }
}

impl<F: FrameTransportTx> PacketTransportTx for PacketTransportWrapper<F> {
    fn transmit(&mut self, packet: &PacketReader<'_>) -> Result<usize, SipError> {
        Ok(self.frame_transport.transmit_frame(packet.slice())?)
    }
}

impl<F: FrameTransportRx> PacketTransportRx for PacketTransportWrapper<F> {
    fn receive<'a>(
        &mut self,
        buffer: &'a mut [u8],
        timeout: Duration,
    ) -> Result<PacketReader<'a>, SipError> {
        let length = self.frame_transport.receive_frame(buffer, timeout)?;
        let mut reader = PacketReader::new(&buffer[..length]);
        reader.read_packet()?;
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketWriter;
    use obsw_hal::{CobsFrameTransport, loopback::LoopbackByteStream};

    #[test]
    fn packet_crosses_a_cobs_frame_link() {
        let (near, far) = LoopbackByteStream::pair();
        let mut tx = PacketTransportWrapper::new(CobsFrameTransport::new(near, 128));
        let mut rx = PacketTransportWrapper::new(CobsFrameTransport::new(far, 128));

        let mut buffer = [0u8; 64];
        let mut writer = PacketWriter::new(&mut buffer);
        writer.set_worker_id(0x07);
        writer.set_counter(0x01);
        writer.set_type(0x21);
        writer.set_payload(&[0x00, 0xFF, 0x00]).unwrap();
        let packet = writer.reader().unwrap();
        tx.transmit(&packet).unwrap();

        let mut receive_buffer = [0u8; 64];
        let received = rx
            .receive(&mut receive_buffer, Duration::from_millis(100))
            .unwrap();
        assert_eq!(received.worker_id(), 0x07);
        assert_eq!(received.packet_type(), 0x21);
        assert_eq!(received.payload(), &[0x00, 0xFF, 0x00]);
    }

    #[test]
    fn corrupted_frame_is_rejected_as_crc_error() {
        let (mut near, far) = LoopbackByteStream::pair();
        let mut rx = PacketTransportWrapper::new(CobsFrameTransport::new(far, 128));

        // a well-formed COBS frame whose packet CRC is wrong
        let packet = [0x00u8, 0x03, 0x01, 0x02, 0x03, 0xDE, 0xAD];
        let mut framed = [0u8; 16];
        let n = obsw_coding::CobsFrame::encode(&packet, &mut framed);
        use obsw_hal::ByteStreamTx;
        near.write(&framed[..n]).unwrap();

        let mut buffer = [0u8; 64];
        assert_eq!(
            rx.receive(&mut buffer, Duration::from_millis(50)).unwrap_err(),
            SipError::CrcError
        );
    }
}
