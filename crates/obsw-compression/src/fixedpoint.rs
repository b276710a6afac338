//! Q16.16 fixed-point arithmetic.
//!
//! Two's-complement wrapping like the integer arithmetic it replaces;
//! multiplication goes through an `i64` intermediate. The transform's
//! dynamic range keeps values well inside `i32` for 16-bit input samples.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Fixedpoint(i32);

impl Fixedpoint {
    pub const FRACTIONAL_BITS: u32 = 16;
    pub const ZERO: Fixedpoint = Fixedpoint(0);
    pub const ONE: Fixedpoint = Fixedpoint(1 << Self::FRACTIONAL_BITS);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn from_int(value: i16) -> Self {
        Self((value as i32) << Self::FRACTIONAL_BITS)
    }

    /// Nearest integer (ties towards positive infinity).
    pub const fn round_to_i32(self) -> i32 {
        ((self.0 as i64 + (1 << (Self::FRACTIONAL_BITS - 1))) >> Self::FRACTIONAL_BITS) as i32
    }

    /// Rounded integer part saturated to `i16`.
    pub const fn round_to_i16_saturating(self) -> i16 {
        let rounded = self.round_to_i32();
        if rounded > i16::MAX as i32 {
            i16::MAX
        } else if rounded < i16::MIN as i32 {
            i16::MIN
        } else {
            rounded as i16
        }
    }

    /// Division by two rounding towards negative infinity (arithmetic
    /// shift), the rounding the lifting scheme relies on.
    pub const fn half_floor(self) -> Self {
        Self(self.0 >> 1)
    }

    /// Division by four rounding towards negative infinity.
    pub const fn quarter_floor(self) -> Self {
        Self(self.0 >> 2)
    }

    pub fn mul(self, other: Fixedpoint) -> Self {
        Self(((self.0 as i64 * other.0 as i64) >> Self::FRACTIONAL_BITS) as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1u32 << Self::FRACTIONAL_BITS) as f64
    }
}

impl Add for Fixedpoint {
    type Output = Fixedpoint;

    fn add(self, rhs: Fixedpoint) -> Fixedpoint {
        Fixedpoint(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Fixedpoint {
    fn add_assign(&mut self, rhs: Fixedpoint) {
        *self = *self + rhs;
    }
}

impl Sub for Fixedpoint {
    type Output = Fixedpoint;

    fn sub(self, rhs: Fixedpoint) -> Fixedpoint {
        Fixedpoint(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Fixedpoint {
    fn sub_assign(&mut self, rhs: Fixedpoint) {
        *self = *self - rhs;
    }
}

impl Neg for Fixedpoint {
    type Output = Fixedpoint;

    fn neg(self) -> Fixedpoint {
        Fixedpoint(self.0.wrapping_neg())
    }
}

impl From<i16> for Fixedpoint {
    fn from(value: i16) -> Self {
        Self::from_int(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trip() {
        for value in [-32768i16, -100, -1, 0, 1, 99, 32767] {
            assert_eq!(Fixedpoint::from_int(value).round_to_i32(), value as i32);
        }
    }

    #[test]
    fn arithmetic() {
        let a = Fixedpoint::from_int(3);
        let b = Fixedpoint::from_int(-5);
        assert_eq!((a + b).round_to_i32(), -2);
        assert_eq!((a - b).round_to_i32(), 8);
        assert_eq!((-a).round_to_i32(), -3);
        assert_eq!(a.mul(b).round_to_i32(), -15);
    }

    #[test]
    fn floor_halving_matches_integer_semantics() {
        assert_eq!(Fixedpoint::from_raw(5).half_floor().raw(), 2);
        // arithmetic shift floors negative values
        assert_eq!(Fixedpoint::from_raw(-5).half_floor().raw(), -3);
        assert_eq!(Fixedpoint::from_raw(-5).quarter_floor().raw(), -2);
    }

    #[test]
    fn rounding_halves_up() {
        let half = Fixedpoint::from_raw(1 << 15);
        assert_eq!(half.round_to_i32(), 1);
        let minus_half = Fixedpoint::from_raw(-(1 << 15));
        assert_eq!(minus_half.round_to_i32(), 0);
    }

    #[test]
    fn saturating_conversion() {
        let big = Fixedpoint::from_raw(i32::MAX);
        assert_eq!(big.round_to_i16_saturating(), i16::MAX);
        let small = Fixedpoint::from_raw(i32::MIN);
        assert_eq!(small.round_to_i16_saturating(), i16::MIN);
    }
}
