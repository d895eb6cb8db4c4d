//! Fast doubling, in pure and resumable forms.
//!
//! Uses the doubling identities, iterating over the bits of n from MSB
//! to LSB:
//!   F(2k)   = F(k) * (2*F(k+1) - F(k))
//!   F(2k+1) = F(k)^2 + F(k+1)^2

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::FibError;
use crate::sequence::{Step, StepSequence, YieldPolicy};

/// F(k) and F(k+1) registers for the doubling loop.
struct DoublingState {
    fk: BigUint,
    fk1: BigUint,
}

impl DoublingState {
    fn new() -> Self {
        Self {
            fk: BigUint::zero(),
            fk1: BigUint::one(),
        }
    }

    /// One combine step, consuming bit `i` of `n`.
    fn step(&mut self, n: u64, i: u32) {
        // t = 2*F(k+1) - F(k)
        let mut t = &self.fk1 << 1u32;
        t -= &self.fk;
        let f2k = &self.fk * &t;
        let f2k1 = &self.fk * &self.fk + &self.fk1 * &self.fk1;
        if (n >> i) & 1 == 0 {
            self.fk = f2k;
            self.fk1 = f2k1;
        } else {
            self.fk1 = &f2k + &f2k1;
            self.fk = f2k1;
        }
    }
}

fn bit_count(n: u64) -> u32 {
    64 - n.leading_zeros()
}

/// Compute F(n) in O(log n) combine steps.
///
/// # Example
/// ```
/// assert_eq!(
///     fibserv_core::algorithms::doubling::nth(100).to_string(),
///     "354224848179261915075",
/// );
/// ```
#[must_use]
pub fn nth(n: u64) -> BigUint {
    let mut state = DoublingState::new();
    for i in (0..bit_count(n)).rev() {
        state.step(n, i);
    }
    state.fk
}

/// The doubling loop as a resumable sequence: one combine step per
/// `advance`, one micro-step per bit of n.
///
/// Each step is a natural yield point, so the pacing is the bit count at
/// interval 1.
pub struct DoublingSequence {
    n: u64,
    remaining_bits: u32,
    state: DoublingState,
}

impl DoublingSequence {
    #[must_use]
    pub fn new(n: u64) -> Self {
        Self {
            n,
            remaining_bits: bit_count(n),
            state: DoublingState::new(),
        }
    }

    /// The pacing for this sequence: every combine step yields.
    #[must_use]
    pub fn policy(&self) -> YieldPolicy {
        YieldPolicy::new(u64::from(bit_count(self.n)).max(1), 1)
    }
}

impl StepSequence for DoublingSequence {
    fn advance(&mut self) -> Result<Step, FibError> {
        if self.remaining_bits == 0 {
            return Ok(Step::Complete(self.state.fk.clone()));
        }
        self.remaining_bits -= 1;
        self.state.step(self.n, self.remaining_bits);
        if self.remaining_bits == 0 {
            Ok(Step::Complete(self.state.fk.clone()))
        } else {
            Ok(Step::Yielded(None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::iterative;
    use proptest::prelude::*;

    fn drive(mut seq: DoublingSequence) -> (BigUint, u64) {
        let mut advances = 0;
        loop {
            advances += 1;
            match seq.advance().unwrap() {
                Step::Complete(value) => return (value, advances),
                Step::Yielded(_) => {}
            }
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(nth(0), BigUint::zero());
        assert_eq!(nth(1), BigUint::one());
        assert_eq!(nth(10), BigUint::from(55u32));
        assert_eq!(nth(20), BigUint::from(6765u32));
        assert_eq!(nth(93), BigUint::from(12_200_160_415_121_876_738u64));
    }

    #[test]
    fn sequence_agrees_with_pure_form() {
        for n in [0u64, 1, 2, 3, 63, 64, 100, 1_000] {
            let (value, _) = drive(DoublingSequence::new(n));
            assert_eq!(value, nth(n), "mismatch at n={n}");
        }
    }

    #[test]
    fn one_advance_per_bit() {
        // n=100 has 7 bits; n=0 completes on the first advance.
        let (_, advances) = drive(DoublingSequence::new(100));
        assert_eq!(advances, 7);

        let (_, advances) = drive(DoublingSequence::new(0));
        assert_eq!(advances, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Doubling agrees with the iterative recurrence.
        #[test]
        fn agrees_with_iterative(n in 0u64..3_000) {
            prop_assert_eq!(nth(n), iterative::nth(n));
        }

        /// The addition identity F(n) + F(n+1) == F(n+2).
        #[test]
        fn addition_identity(n in 0u64..2_000) {
            prop_assert_eq!(nth(n) + nth(n + 1), nth(n + 2));
        }
    }
}
