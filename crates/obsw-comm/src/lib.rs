//! Remote memory access protocol (RMAP) per ECSS-E-ST-50-52C: command
//! packet construction and reply extraction with CRC-8 protected headers
//! and data, plus the target-node registry commands are addressed
//! through.

pub mod rmap;

pub use rmap::node::{RmapTargetNode, RmapTargetNodeList};
pub use rmap::packet::{Instruction, PacketType, ReplyAddressLength, RmapExtractError, RmapPacket};
pub use rmap::status::RmapReplyStatus;
