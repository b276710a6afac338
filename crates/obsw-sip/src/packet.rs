//! Packet serialization and validation.

use std::io::Cursor;

use binrw::prelude::*;
use obsw_coding::Crc16Ccitt;

use crate::{
    MIN_PACKET_SIZE, MAX_PAYLOAD_LENGTH, PACKET_HEADER_LENGTH, STRUCTURE_IN_LENGTH, SipError,
};

/// Fixed part of every packet.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big)]
struct PacketHeader {
    length: u16,
    worker_id: u8,
    counter: u8,
    packet_type: u8,
}

/// Serializes a packet into a caller-provided buffer.
///
/// Field setters invalidate a previous serialization; [`update`] writes
/// header, payload and CRC and marks the packet finalized.
///
/// [`update`]: PacketWriter::update
pub struct PacketWriter<'b> {
    buffer: &'b mut [u8],
    worker_id: u8,
    counter: u8,
    packet_type: u8,
    payload_length: usize,
    finalized: bool,
}

impl<'b> PacketWriter<'b> {
    pub fn new(buffer: &'b mut [u8]) -> Self {
        Self {
            buffer,
            worker_id: 0,
            counter: 0,
            packet_type: 0,
            payload_length: 0,
            finalized: false,
        }
    }

    pub fn set_worker_id(&mut self, worker_id: u8) {
        self.worker_id = worker_id;
        self.finalized = false;
    }

    pub fn set_counter(&mut self, counter: u8) {
        self.counter = counter;
        self.finalized = false;
    }

    pub fn set_type(&mut self, packet_type: u8) {
        self.packet_type = packet_type;
        self.finalized = false;
    }

    /// Copies the payload into place. Fails with `BufferError` beyond the
    /// payload bound and `LengthErrorTooSmall` when the backing buffer
    /// cannot hold the complete packet. An empty payload is legal.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), SipError> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(SipError::BufferError);
        }
        if payload.len() + MIN_PACKET_SIZE > self.buffer.len() {
            return Err(SipError::LengthErrorTooSmall);
        }
        self.buffer[PACKET_HEADER_LENGTH..PACKET_HEADER_LENGTH + payload.len()]
            .copy_from_slice(payload);
        self.payload_length = payload.len();
        self.finalized = false;
        Ok(())
    }

    /// Serializes header and CRC around the staged payload.
    pub fn update(&mut self) -> Result<(), SipError> {
        if self.payload_length + MIN_PACKET_SIZE > self.buffer.len() {
            return Err(SipError::LengthErrorTooSmall);
        }

        let header = PacketHeader {
            length: (self.payload_length + STRUCTURE_IN_LENGTH) as u16,
            worker_id: self.worker_id,
            counter: self.counter,
            packet_type: self.packet_type,
        };
        let mut cursor = Cursor::new(&mut *self.buffer);
        header.write(&mut cursor).map_err(|_| SipError::LengthErrorTooSmall)?;

        let crc_end = PACKET_HEADER_LENGTH + self.payload_length;
        let crc = Crc16Ccitt::calculate(&self.buffer[..crc_end]);
        self.buffer[crc_end..crc_end + 2].copy_from_slice(&crc.to_be_bytes());

        self.finalized = true;
        Ok(())
    }

    /// The serialized packet, available after a successful [`update`].
    ///
    /// [`update`]: PacketWriter::update
    pub fn slice_if_finalized(&self) -> Result<&[u8], SipError> {
        if self.finalized {
            Ok(&self.buffer[..self.payload_length + MIN_PACKET_SIZE])
        } else {
            Err(SipError::NotFinalized)
        }
    }

    /// Finalizes if necessary and parses the packet back, which doubles as
    /// a self check.
    pub fn reader(&mut self) -> Result<PacketReader<'_>, SipError> {
        if !self.finalized {
            self.update()?;
        }
        let mut reader = PacketReader::new(self.slice_if_finalized()?);
        reader.read_packet()?;
        Ok(reader)
    }
}

/// Parses and validates a received packet.
#[derive(Debug)]
pub struct PacketReader<'b> {
    buffer: &'b [u8],
    length: u16,
    worker_id: u8,
    counter: u8,
    packet_type: u8,
    payload_length: usize,
    crc: u16,
}

impl<'b> PacketReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self {
            buffer,
            length: 0,
            worker_id: 0,
            counter: 0,
            packet_type: 0,
            payload_length: 0,
            crc: 0,
        }
    }

    /// Deserializes the header and verifies the checksum.
    pub fn read_packet(&mut self) -> Result<(), SipError> {
        self.deserialize()?;

        let crc_end = PACKET_HEADER_LENGTH + self.payload_length;
        if Crc16Ccitt::calculate(&self.buffer[..crc_end]) != self.crc {
            return Err(SipError::CrcError);
        }
        Ok(())
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn worker_id(&self) -> u8 {
        self.worker_id
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    pub fn payload(&self) -> &'b [u8] {
        &self.buffer[PACKET_HEADER_LENGTH..PACKET_HEADER_LENGTH + self.payload_length]
    }

    /// The complete packet as serialized on the wire.
    pub fn slice(&self) -> &'b [u8] {
        &self.buffer[..self.payload_length + MIN_PACKET_SIZE]
    }

    fn deserialize(&mut self) -> Result<(), SipError> {
        if self.buffer.len() < MIN_PACKET_SIZE {
            return Err(SipError::LengthErrorTooSmall);
        }

        let mut cursor = Cursor::new(self.buffer);
        let header: PacketHeader =
            PacketHeader::read(&mut cursor).map_err(|_| SipError::LengthErrorTooSmall)?;

        if (header.length as usize) < STRUCTURE_IN_LENGTH {
            return Err(SipError::LengthErrorTooSmall);
        }
        let payload_length = header.length as usize - STRUCTURE_IN_LENGTH;
        if payload_length > MAX_PAYLOAD_LENGTH {
            return Err(SipError::LengthErrorEndOfFrame);
        }
        if payload_length + MIN_PACKET_SIZE > self.buffer.len() {
            return Err(SipError::LengthErrorTooSmall);
        }

        let crc_offset = PACKET_HEADER_LENGTH + payload_length;
        self.length = header.length;
        self.worker_id = header.worker_id;
        self.counter = header.counter;
        self.packet_type = header.packet_type;
        self.payload_length = payload_length;
        self.crc = u16::from_be_bytes([self.buffer[crc_offset], self.buffer[crc_offset + 1]]);
        Ok(())
    }
}
