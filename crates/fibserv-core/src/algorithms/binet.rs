//! Closed-form (Binet) computation over fixed-point decimals.
//!
//! F(n) = round(phi^n / sqrt(5)). The term itself is O(1) arithmetic
//! operations, each of which grows with the digit count of the result.
//! The working scale is chosen from a digit-count estimate of F(n) plus
//! guard digits covering the error accumulated by binary exponentiation,
//! so the final round-to-nearest is exact.

use num_bigint::BigUint;

use crate::decimal::Fixed;
use crate::error::FibError;

/// log10(phi), phi = (1 + sqrt(5)) / 2.
const LOG10_PHI: f64 = 0.208_987_640_249_978_73;

/// log10(5) / 2.
const HALF_LOG10_5: f64 = 0.349_485_002_168_009_4;

/// Decimal digits of F(n): floor(n*log10(phi) - log10(5)/2) + 1.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn result_digits(n: u64) -> u64 {
    let estimate = (n as f64).mul_add(LOG10_PHI, -HALF_LOG10_5);
    if estimate < 0.0 {
        1
    } else {
        estimate.floor() as u64 + 1
    }
}

/// Guard digits beyond the result: the relative error of the powered
/// value grows linearly with n, one decimal order per order of n.
fn guard_digits(n: u64) -> u64 {
    let mut guard = 8;
    let mut m = n;
    while m > 0 {
        guard += 1;
        m /= 10;
    }
    guard
}

/// Compute F(n) exactly via the closed form.
pub fn nth(n: u64) -> Result<BigUint, FibError> {
    if n < 2 {
        return Ok(BigUint::from(n));
    }
    let digits = result_digits(n) + guard_digits(n);
    let scale = u32::try_from(digits).map_err(|_| {
        FibError::Execution(format!("F({n}) exceeds the supported working precision"))
    })?;

    let sqrt5 = Fixed::sqrt_u32(5, scale);
    let phi = (&Fixed::from_u32(1, scale) + &sqrt5).div_u32(2);
    let term = phi.powi(n).div(&sqrt5);
    Ok(term.round_to_int())
}
