//! LeGall 5/3 wavelet (lifting scheme).
//!
//! The forward transform runs in place over fixed-point samples with
//! interleaved coefficients: after each level the even positions carry
//! the low-pass, the odd positions the high-pass band; subsequent levels
//! recurse on the low-pass band at doubled stride. The integer lifting
//! steps
//!
//! ```text
//! d[n] = x[2n+1] - floor((x[2n] + x[2n+2]) / 2)
//! s[n] = x[2n]   + floor((d[n-1] + d[n]) / 4)
//! ```
//!
//! use symmetric boundary extension and are exactly invertible, which
//! makes the scheme lossless up to the final coefficient quantization.
//!
//! See <https://ieeexplore.ieee.org/document/157221>; the complete
//! compression scheme is described in <https://elib.dlr.de/112826/>.

use crate::fixedpoint::Fixedpoint;

pub struct LeGall53Wavelet;

impl LeGall53Wavelet {
    /// In-place forward transform over `log2(len)` levels. `len` must be a
    /// power of two; a buffer of fewer than two samples stays untouched.
    pub fn forward_transform_in_place(samples: &mut [Fixedpoint]) {
        debug_assert!(samples.len().is_power_of_two() || samples.len() < 2);

        let mut count = samples.len();
        let mut stride = 1;
        while count >= 2 {
            Self::lift_level(samples, stride, count);
            stride *= 2;
            count /= 2;
        }
    }

    /// One lifting level over `count` elements spaced `stride` apart.
    fn lift_level(samples: &mut [Fixedpoint], stride: usize, count: usize) {
        let at = |k: usize| k * stride;

        // predict: odd positions become high-pass differences
        for k in (1..count).step_by(2) {
            let left = samples[at(k - 1)];
            let right = if k + 1 < count {
                samples[at(k + 1)]
            } else {
                // symmetric extension at the tail
                left
            };
            samples[at(k)] -= (left + right).half_floor();
        }

        // update: even positions become low-pass averages
        for k in (0..count).step_by(2) {
            let right = samples[at(if k + 1 < count { k + 1 } else { k - 1 })];
            let left = if k > 0 { samples[at(k - 1)] } else { right };
            samples[at(k)] += (left + right).quarter_floor();
        }
    }

    /// Inverse of one level, used by the integer reconstruction.
    fn unlift_level(samples: &mut [Fixedpoint], stride: usize, count: usize) {
        let at = |k: usize| k * stride;

        for k in (0..count).step_by(2) {
            let right = samples[at(if k + 1 < count { k + 1 } else { k - 1 })];
            let left = if k > 0 { samples[at(k - 1)] } else { right };
            samples[at(k)] -= (left + right).quarter_floor();
        }

        for k in (1..count).step_by(2) {
            let left = samples[at(k - 1)];
            let right = if k + 1 < count { samples[at(k + 1)] } else { left };
            samples[at(k)] += (left + right).half_floor();
        }
    }

    /// Exact integer inverse of
    /// [`forward_transform_in_place`](Self::forward_transform_in_place).
    /// Ground tooling and tests; the flight side only encodes.
    pub fn inverse_transform_in_place(samples: &mut [Fixedpoint]) {
        debug_assert!(samples.len().is_power_of_two() || samples.len() < 2);
        if samples.len() < 2 {
            return;
        }

        let levels = samples.len().trailing_zeros();
        for level in (0..levels).rev() {
            let stride = 1usize << level;
            let count = samples.len() >> level;
            Self::unlift_level(samples, stride, count);
        }
    }

    /// De-interleaves transformed samples into `[low-pass…, high-pass…]`
    /// order (coarsest band first) and quantizes each coefficient to its
    /// rounded integer part, saturated to `i16`.
    pub fn reorder(samples: &[Fixedpoint], coefficients: &mut [i16]) {
        debug_assert!(coefficients.len() >= samples.len());
        if samples.is_empty() {
            return;
        }

        let levels = samples.len().trailing_zeros();
        let mut write = 0;

        // the final low-pass band: indices divisible by 2^levels
        let top_stride = 1usize << levels;
        for index in (0..samples.len()).step_by(top_stride) {
            coefficients[write] = samples[index].round_to_i16_saturating();
            write += 1;
        }

        // high-pass bands from coarsest to finest: odd multiples of the
        // level stride
        for level in (0..levels).rev() {
            let stride = 1usize << level;
            for index in (stride..samples.len()).step_by(stride * 2) {
                coefficients[write] = samples[index].round_to_i16_saturating();
                write += 1;
            }
        }

        debug_assert_eq!(write, samples.len());
    }

    /// Floating-point inverse for ground-side reconstruction of decoded
    /// coefficient streams (no floor rounding, hence approximate against
    /// the flight transform).
    pub fn backward_transform(input: &[f64], output: &mut [f64]) {
        debug_assert_eq!(input.len(), output.len());
        output.copy_from_slice(input);
        if output.len() < 2 {
            return;
        }

        let levels = output.len().trailing_zeros();
        for level in (0..levels).rev() {
            let stride = 1usize << level;
            let count = output.len() >> level;
            let at = |k: usize| k * stride;

            for k in (0..count).step_by(2) {
                let right = output[at(if k + 1 < count { k + 1 } else { k - 1 })];
                let left = if k > 0 { output[at(k - 1)] } else { right };
                output[at(k)] -= (left + right) / 4.0;
            }
            for k in (1..count).step_by(2) {
                let left = output[at(k - 1)];
                let right = if k + 1 < count { output[at(k + 1)] } else { left };
                output[at(k)] += (left + right) / 2.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn fixed(values: &[i16]) -> Vec<Fixedpoint> {
        values.iter().map(|&v| Fixedpoint::from_int(v)).collect()
    }

    #[test]
    fn constant_signal_has_zero_high_pass() {
        let mut samples = fixed(&[100; 16]);
        LeGall53Wavelet::forward_transform_in_place(&mut samples);

        let mut coefficients = [0i16; 16];
        LeGall53Wavelet::reorder(&samples, &mut coefficients);

        // one low-pass value survives, every detail coefficient is zero
        assert_eq!(coefficients[0], 100);
        assert!(coefficients[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn forward_then_inverse_is_identity() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5753);
        for size in [2usize, 4, 16, 128, 1024] {
            let original: Vec<Fixedpoint> = (0..size)
                .map(|_| Fixedpoint::from_int(rng.r#gen::<i16>() / 4))
                .collect();
            let mut transformed = original.clone();
            LeGall53Wavelet::forward_transform_in_place(&mut transformed);
            LeGall53Wavelet::inverse_transform_in_place(&mut transformed);
            assert_eq!(transformed, original, "size {size}");
        }
    }

    #[test]
    fn linear_ramp_compacts_energy() {
        let ramp: Vec<i16> = (0..64).map(|i| i * 10).collect();
        let mut samples = fixed(&ramp);
        LeGall53Wavelet::forward_transform_in_place(&mut samples);

        let mut coefficients = [0i16; 64];
        LeGall53Wavelet::reorder(&samples, &mut coefficients);

        // a 5/3 wavelet annihilates linear signals in the finest detail
        // band (up to rounding): the last 32 coefficients are the finest
        // high-pass. The very last one sits on the symmetric boundary and
        // carries the ramp step instead.
        assert!(
            coefficients[32..63].iter().all(|&c| c.abs() <= 1),
            "finest band not small: {:?}",
            &coefficients[32..63]
        );
        assert_eq!(coefficients[63], 10);
    }

    #[test]
    fn reorder_layout_for_two_levels() {
        // four samples, two levels: [s0, d1_0, d0_0, d0_1] interleaved as
        // index 0 = low, index 2 = level-1 high, indices 1,3 = level-0 high
        let mut samples = fixed(&[10, 20, 30, 40]);
        LeGall53Wavelet::forward_transform_in_place(&mut samples);

        let mut coefficients = [0i16; 4];
        LeGall53Wavelet::reorder(&samples, &mut coefficients);

        assert_eq!(coefficients[0], samples[0].round_to_i16_saturating());
        assert_eq!(coefficients[1], samples[2].round_to_i16_saturating());
        assert_eq!(coefficients[2], samples[1].round_to_i16_saturating());
        assert_eq!(coefficients[3], samples[3].round_to_i16_saturating());
    }

    #[test]
    fn float_backward_approximates_the_integer_forward() {
        let values: Vec<i16> = (0..32).map(|i| (i * 7 % 50) - 25).collect();
        let mut samples = fixed(&values);
        LeGall53Wavelet::forward_transform_in_place(&mut samples);

        let transformed: Vec<f64> = samples.iter().map(|s| s.to_f64()).collect();
        let mut reconstructed = vec![0.0; transformed.len()];
        LeGall53Wavelet::backward_transform(&transformed, &mut reconstructed);

        for (got, expected) in reconstructed.iter().zip(values.iter()) {
            // floor rounding in the lifting steps bounds the error
            assert!(
                (got - f64::from(*expected)).abs() < 1.0,
                "{got} vs {expected}"
            );
        }
    }

    #[test]
    fn tiny_inputs_are_left_alone() {
        let mut empty: Vec<Fixedpoint> = Vec::new();
        LeGall53Wavelet::forward_transform_in_place(&mut empty);

        let mut single = fixed(&[42]);
        LeGall53Wavelet::forward_transform_in_place(&mut single);
        assert_eq!(single[0].round_to_i32(), 42);
    }
}
