//! Fixed-point decimal arithmetic with explicit precision control.
//!
//! Values are a `BigUint` mantissa carried at a fixed decimal scale:
//! `mantissa / 10^scale`. Both operands of a binary operation must share
//! one scale; products and quotients are truncated back to it, so each
//! operation loses at most one unit in the last place. Only non-negative
//! values are representable, which is all the closed-form computation
//! needs.

use num_bigint::BigUint;
use num_integer::Roots;

/// A non-negative fixed-point decimal: `mantissa / 10^scale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixed {
    mantissa: BigUint,
    scale: u32,
}

impl Fixed {
    /// The integer `v`, carried at `scale` fractional digits.
    #[must_use]
    pub fn from_u32(v: u32, scale: u32) -> Self {
        Self {
            mantissa: BigUint::from(v) * pow10(scale),
            scale,
        }
    }

    /// Floor square root of the integer `v` at `scale` fractional digits.
    #[must_use]
    pub fn sqrt_u32(v: u32, scale: u32) -> Self {
        // isqrt(v * 10^(2s)) / 10^s is the root truncated to s digits.
        let widened = BigUint::from(v) * pow10(2 * scale);
        Self {
            mantissa: widened.sqrt(),
            scale,
        }
    }

    /// Truncating division by a small integer.
    #[must_use]
    pub fn div_u32(&self, d: u32) -> Self {
        Self {
            mantissa: &self.mantissa / BigUint::from(d),
            scale: self.scale,
        }
    }

    /// Truncating multiplication at the common scale.
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        debug_assert_eq!(self.scale, other.scale);
        Self {
            mantissa: (&self.mantissa * &other.mantissa) / pow10(self.scale),
            scale: self.scale,
        }
    }

    /// Truncating division at the common scale.
    #[must_use]
    pub fn div(&self, other: &Self) -> Self {
        debug_assert_eq!(self.scale, other.scale);
        Self {
            mantissa: (&self.mantissa * pow10(self.scale)) / &other.mantissa,
            scale: self.scale,
        }
    }

    /// `self` raised to `n` by binary exponentiation.
    ///
    /// Each multiplication truncates, so for values >= 1 the relative
    /// error of the result stays below roughly `3n` units in the last
    /// place; callers pick the scale accordingly.
    #[must_use]
    pub fn powi(&self, mut n: u64) -> Self {
        let mut base = self.clone();
        let mut acc = Self::from_u32(1, self.scale);
        while n > 0 {
            if n & 1 == 1 {
                acc = acc.mul(&base);
            }
            n >>= 1;
            if n > 0 {
                base = base.mul(&base);
            }
        }
        acc
    }

    /// Round to the nearest integer, halves away from zero.
    #[must_use]
    pub fn round_to_int(&self) -> BigUint {
        let unit = pow10(self.scale);
        (&self.mantissa + &unit / BigUint::from(2u32)) / unit
    }

    /// The raw mantissa, for inspection.
    #[must_use]
    pub fn mantissa(&self) -> &BigUint {
        &self.mantissa
    }

    /// The fractional digit count this value is carried at.
    #[must_use]
    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl std::ops::Add<&Fixed> for &Fixed {
    type Output = Fixed;

    fn add(self, rhs: &Fixed) -> Fixed {
        debug_assert_eq!(self.scale, rhs.scale);
        Fixed {
            mantissa: &self.mantissa + &rhs.mantissa,
            scale: self.scale,
        }
    }
}

fn pow10(exp: u32) -> BigUint {
    BigUint::from(10u32).pow(exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits(f: &Fixed) -> String {
        f.mantissa().to_string()
    }

    #[test]
    fn sqrt_of_five() {
        let root = Fixed::sqrt_u32(5, 10);
        // sqrt(5) = 2.2360679774997896...
        assert_eq!(digits(&root), "22360679774");
    }

    #[test]
    fn golden_ratio_from_sqrt_five() {
        let scale = 10;
        let one = Fixed::from_u32(1, scale);
        let phi = (&one + &Fixed::sqrt_u32(5, scale)).div_u32(2);
        // phi = 1.6180339887498948...
        assert_eq!(digits(&phi), "16180339887");
    }

    #[test]
    fn mul_truncates_to_scale() {
        let scale = 4;
        let a = Fixed::from_u32(3, scale).div_u32(2); // 1.5
        let b = a.mul(&a); // 2.25
        assert_eq!(digits(&b), "22500");
        assert_eq!(b.scale(), scale);
    }

    #[test]
    fn powi_matches_repeated_mul() {
        let scale = 8;
        let phi = (&Fixed::from_u32(1, scale) + &Fixed::sqrt_u32(5, scale)).div_u32(2);
        let cubed = phi.mul(&phi).mul(&phi);
        let powed = phi.powi(3);
        // Truncation points differ between the two routes by at most a
        // few ulps.
        let a: BigUint = cubed.mantissa().clone();
        let b: BigUint = powed.mantissa().clone();
        let diff = if a > b { &a - &b } else { &b - &a };
        assert!(diff < BigUint::from(10u32));
    }

    #[test]
    fn powi_zero_is_one() {
        let scale = 6;
        let x = Fixed::from_u32(7, scale);
        assert_eq!(x.powi(0), Fixed::from_u32(1, scale));
    }

    #[test]
    fn round_to_int_half_up() {
        let scale = 3;
        // 2.499 -> 2, 2.500 -> 3
        let low = Fixed::from_u32(2499, scale).div_u32(1000);
        let high = Fixed::from_u32(2500, scale).div_u32(1000);
        assert_eq!(low.round_to_int(), BigUint::from(2u32));
        assert_eq!(high.round_to_int(), BigUint::from(3u32));
    }

    #[test]
    fn div_recovers_factor() {
        let scale = 9;
        let five = Fixed::from_u32(5, scale);
        let root = Fixed::sqrt_u32(5, scale);
        let again = five.div(&root);
        // 5 / sqrt(5) = sqrt(5), up to truncation
        let a = root.mantissa().clone();
        let b = again.mantissa().clone();
        let diff = if a > b { &a - &b } else { &b - &a };
        assert!(diff < BigUint::from(10u32));
    }
}
