//! RMAP packet construction and reply extraction.

use modular_bitfield::prelude::*;
use obsw_coding::Crc8Ecss;
use thiserror::Error;

use super::{
    MAX_PHYSICAL_ROUTER_OUTPUT_PORTS, PROTOCOL_IDENTIFIER, READ_REPLY_OVERHEAD,
    WRITE_REPLY_OVERHEAD,
};

/// Instruction byte, MSB to LSB: packet type (2), write (1), verify (1),
/// reply (1), increment (1), reply address length (2).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub reply_address_length: B2,
    pub increment: bool,
    pub reply: bool,
    pub verify: bool,
    pub write: bool,
    pub packet_type: B2,
}

/// Values of the packet-type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Reply = 0,
    Command = 1,
}

/// Values of the reply-address-length field; on the wire the reply
/// address occupies four times the field value in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyAddressLength {
    ZeroBytes = 0,
    FourBytes = 1,
    EightBytes = 2,
    TwelveBytes = 3,
}

impl ReplyAddressLength {
    pub const fn byte_count(self) -> usize {
        self as usize * 4
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RmapExtractError {
    #[error("header or data checksum mismatch")]
    CrcError,
    #[error("packet format invalid")]
    Invalid,
    #[error("initiator address does not match")]
    IncorrectAddress,
}

/// An RMAP packet under construction or extracted from the wire.
pub struct RmapPacket {
    spw_target_count: usize,
    spw_targets: [u8; MAX_PHYSICAL_ROUTER_OUTPUT_PORTS],
    target_logical_address: u8,
    instruction: Instruction,
    key: u8,
    reply_address: [u8; 12],
    initiator_logical_address: u8,
    extended_address: u8,
    transaction_id: u16,
    address: u32,
    data_length: u32,
    status: u8,
    header_length: usize,
    header_crc: u8,
    data_crc: u8,
    data: Vec<u8>,
}

impl Default for RmapPacket {
    fn default() -> Self {
        Self {
            spw_target_count: 0,
            spw_targets: [0; MAX_PHYSICAL_ROUTER_OUTPUT_PORTS],
            target_logical_address: super::DEFAULT_LOGICAL_ADDRESS,
            instruction: Instruction::new(),
            key: 0,
            reply_address: [0; 12],
            initiator_logical_address: super::DEFAULT_LOGICAL_ADDRESS,
            extended_address: super::DEFAULT_EXTENDED_ADDRESS,
            transaction_id: 0,
            address: 0,
            data_length: 0,
            status: 0,
            header_length: 0,
            header_crc: 0,
            data_crc: 0,
            data: Vec::new(),
        }
    }
}

impl RmapPacket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the packet for reuse with the next transaction.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // -- instruction helpers --------------------------------------------

    pub fn set_command(&mut self) {
        self.instruction.set_packet_type(PacketType::Command as u8);
    }

    pub fn set_reply(&mut self) {
        self.instruction.set_packet_type(PacketType::Reply as u8);
    }

    pub fn is_command(&self) -> bool {
        self.instruction.packet_type() == PacketType::Command as u8
    }

    pub fn is_reply(&self) -> bool {
        self.instruction.packet_type() == PacketType::Reply as u8
    }

    pub fn set_write(&mut self) {
        self.instruction.set_write(true);
    }

    pub fn set_read(&mut self) {
        self.instruction.set_write(false);
    }

    pub fn is_write(&self) -> bool {
        self.instruction.write()
    }

    pub fn is_read(&self) -> bool {
        !self.instruction.write()
    }

    pub fn set_verify_flag(&mut self, enable: bool) {
        self.instruction.set_verify(enable);
    }

    pub fn set_reply_flag(&mut self, enable: bool) {
        self.instruction.set_reply(enable);
    }

    pub fn set_increment_flag(&mut self, enable: bool) {
        self.instruction.set_increment(enable);
    }

    pub fn set_reply_address_length(&mut self, length: ReplyAddressLength) {
        self.instruction.set_reply_address_length(length as u8);
    }

    pub fn instruction_raw(&self) -> u8 {
        self.instruction.into_bytes()[0]
    }

    pub fn set_instruction_raw(&mut self, raw: u8) {
        self.instruction = Instruction::from_bytes([raw]);
    }

    // -- field accessors ------------------------------------------------

    pub fn set_target_spacewire_address(&mut self, targets: &[u8]) {
        let count = targets.len().min(MAX_PHYSICAL_ROUTER_OUTPUT_PORTS);
        self.spw_targets[..count].copy_from_slice(&targets[..count]);
        self.spw_target_count = count;
    }

    pub fn target_spacewire_address(&self) -> &[u8] {
        &self.spw_targets[..self.spw_target_count]
    }

    pub fn set_reply_address(&mut self, words: &[u8]) {
        let count = words.len().min(12);
        self.reply_address[..count].copy_from_slice(&words[..count]);
    }

    pub fn reply_address(&self) -> &[u8] {
        let length = ReplyAddressLength::from_field(self.instruction.reply_address_length());
        &self.reply_address[..length.byte_count()]
    }

    pub fn set_target_logical_address(&mut self, address: u8) {
        self.target_logical_address = address;
    }

    pub fn target_logical_address(&self) -> u8 {
        self.target_logical_address
    }

    pub fn set_initiator_logical_address(&mut self, address: u8) {
        self.initiator_logical_address = address;
    }

    pub fn initiator_logical_address(&self) -> u8 {
        self.initiator_logical_address
    }

    pub fn set_key(&mut self, key: u8) {
        self.key = key;
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn set_extended_address(&mut self, extended: u8) {
        self.extended_address = extended;
    }

    pub fn extended_address(&self) -> u8 {
        self.extended_address
    }

    pub fn set_transaction_id(&mut self, id: u16) {
        self.transaction_id = id;
    }

    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }

    pub fn set_address(&mut self, address: u32) {
        self.address = address;
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    /// 24-bit on the wire; the upper byte is discarded when constructing.
    pub fn set_data_length(&mut self, length: u32) {
        self.data_length = length & 0x00FF_FFFF;
    }

    pub fn data_length(&self) -> u32 {
        self.data_length
    }

    pub fn set_status(&mut self, status: u8) {
        self.status = status;
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn set_data(&mut self, data: &[u8]) {
        self.data = data.to_vec();
        self.data_length = data.len() as u32 & 0x00FF_FFFF;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn header_crc(&self) -> u8 {
        self.header_crc
    }

    pub fn data_crc(&self) -> u8 {
        self.data_crc
    }

    // -- wire form ------------------------------------------------------

    /// Serialized size of this packet as a command.
    pub fn command_size(&self) -> usize {
        // header fields (15 bytes) + header CRC, plus path and reply
        // addresses
        let base = self.spw_target_count + self.reply_address().len() + 16;
        if self.is_write() {
            base + self.data.len() + 1
        } else {
            base
        }
    }

    /// Builds the command packet into `buffer` and returns its size.
    /// `None` when the buffer is too small. The header CRC covers
    /// everything from the target logical address; write commands append
    /// data plus data CRC.
    pub fn construct_packet(&mut self, buffer: &mut [u8]) -> Option<usize> {
        let total = self.command_size();
        if buffer.len() < total {
            return None;
        }

        let mut at = 0;
        buffer[..self.spw_target_count].copy_from_slice(self.target_spacewire_address());
        at += self.spw_target_count;

        let header_start = at;
        buffer[at] = self.target_logical_address;
        buffer[at + 1] = PROTOCOL_IDENTIFIER;
        buffer[at + 2] = self.instruction.into_bytes()[0];
        buffer[at + 3] = self.key;
        at += 4;

        let reply_bytes = self.reply_address().len();
        buffer[at..at + reply_bytes].copy_from_slice(self.reply_address());
        at += reply_bytes;

        buffer[at] = self.initiator_logical_address;
        buffer[at + 1..at + 3].copy_from_slice(&self.transaction_id.to_be_bytes());
        buffer[at + 3] = self.extended_address;
        at += 4;

        buffer[at..at + 4].copy_from_slice(&self.address.to_be_bytes());
        at += 4;
        buffer[at..at + 3].copy_from_slice(&self.data_length.to_be_bytes()[1..]);
        at += 3;

        self.header_crc = Crc8Ecss::calculate(&buffer[header_start..at]);
        buffer[at] = self.header_crc;
        at += 1;
        self.header_length = at;

        if self.is_write() {
            buffer[at..at + self.data.len()].copy_from_slice(&self.data);
            at += self.data.len();
            self.data_crc = Crc8Ecss::calculate(&self.data);
            buffer[at] = self.data_crc;
            at += 1;
        }

        debug_assert_eq!(at, total);
        Some(at)
    }

    /// Parses a reply packet received from the wire.
    ///
    /// Validates the packet type, the protocol identifier, the initiator
    /// logical address and both CRCs (the data CRC only for read
    /// replies).
    pub fn extract_reply(
        &mut self,
        data: &[u8],
        expected_initiator_logical_address: u8,
    ) -> Result<(), RmapExtractError> {
        if data.len() < WRITE_REPLY_OVERHEAD {
            return Err(RmapExtractError::Invalid);
        }
        if data[1] != PROTOCOL_IDENTIFIER {
            return Err(RmapExtractError::Invalid);
        }

        let instruction = Instruction::from_bytes([data[2]]);
        if instruction.packet_type() != PacketType::Reply as u8 {
            return Err(RmapExtractError::Invalid);
        }
        if data[0] != expected_initiator_logical_address {
            return Err(RmapExtractError::IncorrectAddress);
        }

        if instruction.write() {
            self.extract_write_reply(data, instruction)
        } else {
            self.extract_read_reply(data, instruction)
        }
    }

    fn extract_write_reply(
        &mut self,
        data: &[u8],
        instruction: Instruction,
    ) -> Result<(), RmapExtractError> {
        // [init][pid][instr][status][target][tid:2][crc]
        let header_crc = data[7];
        if Crc8Ecss::calculate(&data[..7]) != header_crc {
            return Err(RmapExtractError::CrcError);
        }

        self.initiator_logical_address = data[0];
        self.instruction = instruction;
        self.status = data[3];
        self.target_logical_address = data[4];
        self.transaction_id = u16::from_be_bytes([data[5], data[6]]);
        self.header_crc = header_crc;
        self.header_length = WRITE_REPLY_OVERHEAD;
        self.data.clear();
        self.data_length = 0;
        Ok(())
    }

    fn extract_read_reply(
        &mut self,
        data: &[u8],
        instruction: Instruction,
    ) -> Result<(), RmapExtractError> {
        // [init][pid][instr][status][target][tid:2][rsvd][len:3][crc][data...][dcrc]
        if data.len() < READ_REPLY_OVERHEAD {
            return Err(RmapExtractError::Invalid);
        }
        let header_crc = data[11];
        if Crc8Ecss::calculate(&data[..11]) != header_crc {
            return Err(RmapExtractError::CrcError);
        }

        let data_length =
            u32::from_be_bytes([0, data[8], data[9], data[10]]) as usize;
        if data.len() != READ_REPLY_OVERHEAD + data_length {
            return Err(RmapExtractError::Invalid);
        }

        let payload = &data[12..12 + data_length];
        let data_crc = data[12 + data_length];
        if Crc8Ecss::calculate(payload) != data_crc {
            return Err(RmapExtractError::CrcError);
        }

        self.initiator_logical_address = data[0];
        self.instruction = instruction;
        self.status = data[3];
        self.target_logical_address = data[4];
        self.transaction_id = u16::from_be_bytes([data[5], data[6]]);
        self.data_length = data_length as u32;
        self.data = payload.to_vec();
        self.header_crc = header_crc;
        self.data_crc = data_crc;
        self.header_length = READ_REPLY_OVERHEAD - 1; // CRC included, data CRC not
        Ok(())
    }
}

impl ReplyAddressLength {
    fn from_field(field: u8) -> Self {
        match field & 0b11 {
            0 => Self::ZeroBytes,
            1 => Self::FourBytes,
            2 => Self::EightBytes,
            _ => Self::TwelveBytes,
        }
    }
}
