//! Time-series compression pipeline: a fixed-point LeGall 5/3 wavelet
//! transform followed by null-length-suppression entropy coding, packaged
//! as [`DataBlock`]s and driven by the long-running
//! [`DataProcessorThread`].

pub mod bitstream;
pub mod data_block;
pub mod fixedpoint;
pub mod legall;
pub mod nls;
pub mod processor;

pub use bitstream::{BitstreamError, BitstreamReader, BitstreamWriter};
pub use data_block::{Blocksize, CompressionScheme, DataBlock, SamplingRate};
pub use fixedpoint::Fixedpoint;
pub use legall::LeGall53Wavelet;
pub use nls::{NlsDecoder, NlsEncoder};
pub use processor::DataProcessorThread;
