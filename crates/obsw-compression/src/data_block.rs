//! A block of time-series samples moving through the compression
//! pipeline.
//!
//! Backed by a pooled shared buffer, a block lives in exactly one of
//! three states with one-way transitions:
//!
//! ```text
//! accumulating --apply_wavelet_transform--> transformed --encode--> encoded
//! ```
//!
//! In-buffer layout: an 11-byte header (stamped at encode time), one
//! alignment byte, then the sample area holding fixed-point samples
//! while accumulating, `i16` coefficients once transformed, or the
//! encoded bitstream in an output block.

use std::io::Cursor;

use binrw::prelude::*;
use modular_bitfield::prelude::*;
use obsw_base::GpsTime;
use obsw_container::SharedBufferPointer;

use crate::bitstream::BitstreamWriter;
use crate::fixedpoint::Fixedpoint;
use crate::legall::LeGall53Wavelet;
use crate::nls::NlsEncoder;

/// Header bytes that appear in the encoded output.
pub const ENCODED_HEADER_SIZE: usize = 11;

/// In-buffer header size; one padding byte keeps the sample area
/// four-byte aligned.
pub const HEADER_SIZE: usize = 12;

/// Largest supported block.
pub const MAX_SAMPLE_COUNT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionScheme {
    Raw = 0,
    WaveletNls = 1,
}

/// Samples per block, encoded in four bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Blocksize {
    Disabled = 0,
    Bs16 = 1,
    Bs128 = 2,
    Bs256 = 3,
    Bs512 = 4,
    Bs1024 = 5,
    Bs2048 = 6,
    Bs4096 = 7,
}

impl Blocksize {
    pub const fn sample_count(self) -> usize {
        match self {
            Blocksize::Disabled => 0,
            Blocksize::Bs16 => 16,
            Blocksize::Bs128 => 128,
            Blocksize::Bs256 => 256,
            Blocksize::Bs512 => 512,
            Blocksize::Bs1024 => 1024,
            Blocksize::Bs2048 => 2048,
            Blocksize::Bs4096 => 4096,
        }
    }
}

/// Sampling rate of the source channel, encoded in four bits of the
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SamplingRate {
    Disabled = 0,
    Hz1 = 1,
    Hz2 = 2,
    Hz5 = 3,
    Hz10 = 4,
    Hz20 = 5,
    Hz50 = 6,
    Hz100 = 7,
}

/// Rate/blocksize nibble pair; the sampling rate occupies the high
/// nibble.
#[bitfield]
#[derive(Debug, Clone, Copy)]
struct RateAndBlocksize {
    blocksize: B4,
    sampling_rate: B4,
}

#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big)]
struct BlockHeader {
    scheme: u8,
    parameter_id: u16,
    start_seconds: u32,
    start_millis: u16,
    rate_and_blocksize: u8,
    padding: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Accumulating,
    Transformed,
    Encoded,
}

#[derive(Clone)]
pub struct DataBlock {
    pointer: SharedBufferPointer,
    sample_count: usize,
    parameter_id: u16,
    start_time: GpsTime,
    sampling_rate: SamplingRate,
    blocksize: Blocksize,
    scheme: CompressionScheme,
    state: BlockState,
}

impl DataBlock {
    /// Binds a fresh block to a pooled buffer.
    pub fn new(
        pointer: SharedBufferPointer,
        parameter_id: u16,
        start_time: GpsTime,
        sampling_rate: SamplingRate,
        blocksize: Blocksize,
    ) -> Self {
        Self {
            pointer,
            sample_count: 0,
            parameter_id,
            start_time,
            sampling_rate,
            blocksize,
            scheme: CompressionScheme::WaveletNls,
            state: BlockState::Accumulating,
        }
    }

    pub fn parameter_id(&self) -> u16 {
        self.parameter_id
    }

    pub fn start_time(&self) -> GpsTime {
        self.start_time
    }

    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }

    pub fn blocksize(&self) -> Blocksize {
        self.blocksize
    }

    pub fn scheme(&self) -> CompressionScheme {
        self.scheme
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn maximum_size(&self) -> usize {
        self.pointer.len()
    }

    /// The backing buffer can hold a complete block of the configured
    /// size.
    pub fn is_valid(&self) -> bool {
        self.blocksize != Blocksize::Disabled
            && self.pointer.len() >= self.blocksize.sample_count() * 4 + HEADER_SIZE
    }

    pub fn is_complete(&self) -> bool {
        self.sample_count > 0 && self.sample_count == self.blocksize.sample_count()
    }

    pub fn is_transformed(&self) -> bool {
        self.state == BlockState::Transformed
    }

    pub fn is_encoded(&self) -> bool {
        self.state == BlockState::Encoded
    }

    /// Appends one sample. Refused once the block is complete, no longer
    /// accumulating, or when the buffer is shared.
    pub fn push(&mut self, sample: Fixedpoint) -> bool {
        if self.state != BlockState::Accumulating || self.is_complete() || !self.is_valid() {
            return false;
        }
        let offset = HEADER_SIZE + self.sample_count * 4;
        let Some(buffer) = self.pointer.as_mut_slice() else {
            return false;
        };
        buffer[offset..offset + 4].copy_from_slice(&sample.raw().to_be_bytes());
        self.sample_count += 1;
        true
    }

    /// Reads sample `index` back from the buffer.
    pub fn sample(&self, index: usize) -> Option<Fixedpoint> {
        if self.state != BlockState::Accumulating || index >= self.sample_count {
            return None;
        }
        let offset = HEADER_SIZE + index * 4;
        let bytes = &self.pointer.as_slice()[offset..offset + 4];
        Some(Fixedpoint::from_raw(i32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))
    }

    /// Coefficient `index` of a transformed block.
    pub fn coefficient(&self, index: usize) -> Option<i16> {
        if self.state != BlockState::Transformed || index >= self.sample_count {
            return None;
        }
        let offset = HEADER_SIZE + index * 2;
        let bytes = &self.pointer.as_slice()[offset..offset + 2];
        Some(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Runs the in-place wavelet transform and reorders the coefficients
    /// into the buffer. Requires a complete block and a unique buffer
    /// reference.
    pub fn apply_wavelet_transform(&mut self) -> bool {
        if self.state != BlockState::Accumulating || !self.is_complete() {
            return false;
        }

        let count = self.sample_count;
        let mut samples = [Fixedpoint::ZERO; MAX_SAMPLE_COUNT];
        for (index, slot) in samples[..count].iter_mut().enumerate() {
            *slot = match self.sample(index) {
                Some(sample) => sample,
                None => return false,
            };
        }

        LeGall53Wavelet::forward_transform_in_place(&mut samples[..count]);
        let mut coefficients = [0i16; MAX_SAMPLE_COUNT];
        LeGall53Wavelet::reorder(&samples[..count], &mut coefficients[..count]);

        let Some(buffer) = self.pointer.as_mut_slice() else {
            return false;
        };
        for (index, coefficient) in coefficients[..count].iter().enumerate() {
            let offset = HEADER_SIZE + index * 2;
            buffer[offset..offset + 2].copy_from_slice(&coefficient.to_be_bytes());
        }

        self.state = BlockState::Transformed;
        true
    }

    /// Entropy-codes this transformed block into `target` (an
    /// accumulating block over its own buffer) and stamps the encoded
    /// header. The payload is written first, the header after it, so a
    /// partially encoded target is never mistaken for a finished one.
    pub fn encode(&self, target: &mut DataBlock, encoder: &mut NlsEncoder) -> bool {
        if self.state != BlockState::Transformed
            || target.maximum_size() < self.sample_count * 2 + HEADER_SIZE
        {
            return false;
        }

        let count = self.sample_count;
        let mut coefficients = [0i16; MAX_SAMPLE_COUNT];
        for (index, slot) in coefficients[..count].iter_mut().enumerate() {
            *slot = match self.coefficient(index) {
                Some(coefficient) => coefficient,
                None => return false,
            };
        }

        let Some(buffer) = target.pointer.as_mut_slice() else {
            return false;
        };

        let payload_len = {
            let mut bitstream = BitstreamWriter::new(&mut buffer[ENCODED_HEADER_SIZE..]);
            if encoder.encode(&coefficients[..count], &mut bitstream).is_err() {
                return false;
            }
            bitstream.serialized_len()
        };

        let header = BlockHeader {
            scheme: CompressionScheme::WaveletNls as u8,
            parameter_id: self.parameter_id,
            start_seconds: self.start_time.seconds(),
            start_millis: self.start_time.milliseconds(),
            rate_and_blocksize: RateAndBlocksize::new()
                .with_sampling_rate(self.sampling_rate as u8)
                .with_blocksize(self.blocksize as u8)
                .into_bytes()[0],
            padding: 0,
        };
        let mut cursor = Cursor::new(&mut buffer[..ENCODED_HEADER_SIZE]);
        header.write(&mut cursor).expect("header fits the reserved area");

        target.sample_count = payload_len;
        target.parameter_id = self.parameter_id;
        target.start_time = self.start_time;
        target.sampling_rate = self.sampling_rate;
        target.blocksize = self.blocksize;
        target.scheme = CompressionScheme::WaveletNls;
        target.state = BlockState::Encoded;
        true
    }

    /// Header plus bitstream of an encoded block, ready for downlink or
    /// storage.
    pub fn encoded_data(&self) -> &[u8] {
        if self.state != BlockState::Encoded {
            return &[];
        }
        &self.pointer.as_slice()[..ENCODED_HEADER_SIZE + self.sample_count]
    }
}

impl std::fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataBlock")
            .field("parameter_id", &self.parameter_id)
            .field("state", &self.state)
            .field("sample_count", &self.sample_count)
            .finish()
    }
}
