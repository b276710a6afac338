//! RMAP protocol pieces.

pub mod node;
pub mod packet;
pub mod status;

/// Protocol identifier of RMAP on a SpaceWire link (packet byte 1).
pub const PROTOCOL_IDENTIFIER: u8 = 0x01;

/// Data bytes per transaction.
pub const BUFFER_SIZE: usize = 1024;

pub const MAX_CONCURRENT_TRANSACTIONS: usize = 10;

/// Reply packets that can be queued, including the one in processing.
pub const NUMBER_OF_RECEIVE_BUFFERS: usize = 3;

pub const DEFAULT_LOGICAL_ADDRESS: u8 = 0xFE;
pub const DEFAULT_EXTENDED_ADDRESS: u8 = 0x00;

/// Fixed bytes of a write command, data CRC included.
pub const WRITE_COMMAND_OVERHEAD: usize = 17;
/// Fixed bytes of a read command.
pub const READ_COMMAND_OVERHEAD: usize = 16;
/// Fixed bytes of a read reply, data CRC included.
pub const READ_REPLY_OVERHEAD: usize = 13;
/// Bytes of a write reply.
pub const WRITE_REPLY_OVERHEAD: usize = 8;

pub const MINIMUM_REPLY_SIZE: usize = WRITE_REPLY_OVERHEAD;

/// Maximum physical output ports of a router (ECSS-E-ST-50-12C).
pub const MAX_PHYSICAL_ROUTER_OUTPUT_PORTS: usize = 32;

/// SpaceWire target addresses that fit a single packet
/// (ECSS-E-ST-50-52C).
pub const MAX_NUMBER_OF_TARGET_NODES: usize = 12;
