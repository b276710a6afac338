//! Null-length-suppression entropy coding of wavelet coefficients.
//!
//! Wavelet-transformed telemetry is dominated by zero coefficients, so
//! the stream alternates zero-run lengths with the values interrupting
//! them:
//!
//! ```text
//! gamma(run + 1) [ gamma(|value|) sign ] gamma(run + 1) [ ... ]
//! ```
//!
//! where `gamma` is the Elias gamma code. After a value whose run reaches
//! the end of the block nothing follows; the decoder knows the
//! coefficient count and stops once it is reached, so no explicit
//! terminator is needed.

use crate::bitstream::{BitstreamError, BitstreamReader, BitstreamWriter};

fn push_gamma(out: &mut BitstreamWriter<'_>, value: u32) -> Result<(), BitstreamError> {
    debug_assert!(value >= 1);
    let bits = 32 - value.leading_zeros();
    out.push_bits(0, bits - 1)?;
    out.push_bits(value, bits)
}

fn read_gamma(input: &mut BitstreamReader<'_>) -> Result<u32, BitstreamError> {
    let mut leading = 0;
    while !input.read_bit()? {
        leading += 1;
    }
    let mut value = 1u32;
    for _ in 0..leading {
        value = value << 1 | input.read_bit()? as u32;
    }
    Ok(value)
}

#[derive(Debug, Default)]
pub struct NlsEncoder;

impl NlsEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encodes `coefficients` into `out`. Fails with
    /// [`BitstreamError::Full`] when the output buffer is too small, which
    /// callers treat as an incompressible block.
    pub fn encode(
        &mut self,
        coefficients: &[i16],
        out: &mut BitstreamWriter<'_>,
    ) -> Result<(), BitstreamError> {
        let mut run = 0u32;
        let mut emitted_any = false;

        for &coefficient in coefficients {
            if coefficient == 0 {
                run += 1;
                continue;
            }
            push_gamma(out, run + 1)?;
            // i16::MIN has no positive counterpart; the magnitude fits u32
            let magnitude = (coefficient as i32).unsigned_abs();
            push_gamma(out, magnitude)?;
            out.push_bit(coefficient < 0)?;
            run = 0;
            emitted_any = true;
        }

        if run > 0 || !emitted_any {
            // trailing zeros (or an all-zero block)
            push_gamma(out, run + 1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NlsDecoder;

impl NlsDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes exactly `out.len()` coefficients.
    pub fn decode(
        &mut self,
        input: &mut BitstreamReader<'_>,
        out: &mut [i16],
    ) -> Result<(), BitstreamError> {
        let mut produced = 0;

        while produced < out.len() {
            let run = read_gamma(input)? - 1;
            if produced + run as usize > out.len() {
                return Err(BitstreamError::EndOfStream);
            }
            out[produced..produced + run as usize].fill(0);
            produced += run as usize;

            if produced < out.len() {
                let magnitude = read_gamma(input)? as i32;
                let negative = input.read_bit()?;
                let value = if negative { -magnitude } else { magnitude };
                out[produced] = value as i16;
                produced += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn round_trip(coefficients: &[i16]) -> Vec<i16> {
        let mut buffer = vec![0u8; coefficients.len() * 4 + 16];
        let mut writer = BitstreamWriter::new(&mut buffer);
        NlsEncoder::new().encode(coefficients, &mut writer).unwrap();
        let bytes = writer.serialized_len();

        let mut reader = BitstreamReader::new(&buffer[..bytes]);
        let mut decoded = vec![0i16; coefficients.len()];
        NlsDecoder::new().decode(&mut reader, &mut decoded).unwrap();
        decoded
    }

    #[test]
    fn gamma_code_round_trip() {
        let mut buffer = [0u8; 32];
        let mut writer = BitstreamWriter::new(&mut buffer);
        for value in [1u32, 2, 3, 4, 7, 8, 255, 256, 65535] {
            push_gamma(&mut writer, value).unwrap();
        }
        let bytes = writer.serialized_len();

        let mut reader = BitstreamReader::new(&buffer[..bytes]);
        for expected in [1u32, 2, 3, 4, 7, 8, 255, 256, 65535] {
            assert_eq!(read_gamma(&mut reader).unwrap(), expected);
        }
    }

    #[test]
    fn gamma_of_one_is_a_single_bit() {
        let mut buffer = [0u8; 1];
        let mut writer = BitstreamWriter::new(&mut buffer);
        push_gamma(&mut writer, 1).unwrap();
        assert_eq!(writer.bit_len(), 1);
        drop(writer);
        assert_eq!(buffer[0], 0b1000_0000);
    }

    #[test]
    fn typical_sparse_block() {
        let mut coefficients = [0i16; 64];
        coefficients[0] = 812;
        coefficients[3] = -7;
        coefficients[40] = 1;
        assert_eq!(round_trip(&coefficients), coefficients);
    }

    #[test]
    fn all_zero_block_is_one_gamma_code() {
        let coefficients = [0i16; 256];
        let mut buffer = [0u8; 64];
        let mut writer = BitstreamWriter::new(&mut buffer);
        NlsEncoder::new().encode(&coefficients, &mut writer).unwrap();
        // gamma(257) = 8 zeros + 9 bits
        assert_eq!(writer.bit_len(), 17);

        assert_eq!(round_trip(&coefficients), coefficients);
    }

    #[test]
    fn dense_blocks_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x0415);
        let coefficients: Vec<i16> =
            (0..512).map(|_| (rng.r#gen::<i16>() / 64).clamp(-500, 500)).collect();
        assert_eq!(round_trip(&coefficients), coefficients);
    }

    #[test]
    fn extreme_values_round_trip() {
        let coefficients = [i16::MAX, 0, i16::MIN, -1, 1];
        assert_eq!(round_trip(&coefficients), coefficients);
    }

    #[test]
    fn leading_and_trailing_runs() {
        let mut coefficients = [0i16; 32];
        coefficients[10] = 3;
        assert_eq!(round_trip(&coefficients), coefficients);

        let mut tail_only = [0i16; 32];
        tail_only[31] = -2;
        assert_eq!(round_trip(&tail_only), tail_only);
    }

    #[test]
    fn sparse_blocks_actually_compress() {
        let mut coefficients = [0i16; 1024];
        for index in (0..1024).step_by(97) {
            coefficients[index] = 5;
        }
        let mut buffer = vec![0u8; 4096];
        let mut writer = BitstreamWriter::new(&mut buffer);
        NlsEncoder::new().encode(&coefficients, &mut writer).unwrap();
        assert!(writer.serialized_len() < 1024 * 2 / 4);
    }

    #[test]
    fn tiny_output_buffer_reports_full() {
        let coefficients = [1i16; 64];
        let mut buffer = [0u8; 4];
        let mut writer = BitstreamWriter::new(&mut buffer);
        assert_eq!(
            NlsEncoder::new().encode(&coefficients, &mut writer),
            Err(BitstreamError::Full)
        );
    }
}
