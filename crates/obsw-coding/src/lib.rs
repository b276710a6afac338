//! Byte-level codecs: COBS byte stuffing with frame delimiting and the
//! CRC flavors used by the packet layers (CRC-16/CCITT for link packets,
//! CRC-8 for remote-memory-access headers).

#![forbid(unsafe_code)]

pub mod cobs;
pub mod crc16;
pub mod crc8;

pub use cobs::{Cobs, CobsEncodingGenerator, CobsFrame, FrameDecode, FRAME_DELIMITER};
pub use crc16::Crc16Ccitt;
pub use crc8::Crc8Ecss;
