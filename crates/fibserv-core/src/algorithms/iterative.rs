//! Iterative linear recurrence, in pure and resumable forms.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::FibError;
use crate::sequence::{Step, StepSequence, YieldPolicy};

/// Compute F(n) by n additions.
///
/// # Example
/// ```
/// assert_eq!(fibserv_core::algorithms::iterative::nth(10).to_string(), "55");
/// ```
#[must_use]
pub fn nth(n: u64) -> BigUint {
    let mut a = BigUint::zero();
    let mut b = BigUint::one();
    for _ in 0..n {
        let next = &a + &b;
        a = std::mem::replace(&mut b, next);
    }
    a
}

/// The recurrence as a resumable sequence: one addition per `advance`,
/// completing on the call after F(n) is reached.
///
/// Total micro-steps are `n + 1` (one per term of the prefix), so under a
/// [`YieldPolicy`] the final value always lands on a yield boundary.
pub struct IterativeSequence {
    a: BigUint,
    b: BigUint,
    index: u64,
    n: u64,
    checkpoint_stride: Option<u64>,
}

impl IterativeSequence {
    #[must_use]
    pub fn new(n: u64) -> Self {
        Self {
            a: BigUint::zero(),
            b: BigUint::one(),
            index: 0,
            n,
            checkpoint_stride: None,
        }
    }

    /// Surface the running value every `stride` micro-steps instead of
    /// surfacing nothing until the end.
    #[must_use]
    pub fn with_checkpoints(mut self, stride: u64) -> Self {
        self.checkpoint_stride = Some(stride.max(1));
        self
    }

    /// The pacing for this sequence under the requested yield interval.
    #[must_use]
    pub fn policy(&self, interval: u64) -> YieldPolicy {
        YieldPolicy::new(self.n.saturating_add(1), interval)
    }
}

impl StepSequence for IterativeSequence {
    fn advance(&mut self) -> Result<Step, FibError> {
        if self.index == self.n {
            return Ok(Step::Complete(self.a.clone()));
        }
        let next = &self.a + &self.b;
        self.a = std::mem::replace(&mut self.b, next);
        self.index += 1;
        let checkpoint = match self.checkpoint_stride {
            Some(stride) if self.index % stride == 0 => Some(self.a.clone()),
            _ => None,
        };
        Ok(Step::Yielded(checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(mut seq: IterativeSequence) -> (BigUint, u64) {
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
    fn first_ten() {
        let vals: Vec<String> = (0..10).map(|n| nth(n).to_string()).collect();
        assert_eq!(vals, ["0", "1", "1", "2", "3", "5", "8", "13", "21", "34"]);
    }

    #[test]
    fn sequence_agrees_with_pure_form() {
        for n in [0u64, 1, 2, 7, 50, 93, 200] {
            let (value, _) = drive(IterativeSequence::new(n));
            assert_eq!(value, nth(n), "mismatch at n={n}");
        }
    }

    #[test]
    fn completes_in_n_plus_one_advances() {
        let (_, advances) = drive(IterativeSequence::new(10));
        assert_eq!(advances, 11);

        let (_, advances) = drive(IterativeSequence::new(0));
        assert_eq!(advances, 1);
    }

    #[test]
    fn checkpoints_surface_running_value() {
        let mut seq = IterativeSequence::new(6).with_checkpoints(2);
        let mut seen = Vec::new();
        loop {
            match seq.advance().unwrap() {
                Step::Complete(value) => {
                    assert_eq!(value, nth(6));
                    break;
                }
                Step::Yielded(Some(v)) => seen.push(v.to_string()),
                Step::Yielded(None) => {}
            }
        }
        // F(2), F(4), F(6) surfaced at stride 2.
        assert_eq!(seen, ["1", "3", "8"]);
    }

    #[test]
    fn policy_spans_prefix() {
        let seq = IterativeSequence::new(10_000);
        assert_eq!(seq.policy(1_000).total_steps(), 10_001);
        assert_eq!(seq.policy(1_000).effective(), 1_000);
    }
}
