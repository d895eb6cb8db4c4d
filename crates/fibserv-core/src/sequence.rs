//! Resumable step sequences and the yield policy that paces them.

use num_bigint::BigUint;
use num_integer::gcd;

use crate::error::FibError;

/// One advancement of a step sequence.
#[derive(Debug)]
pub enum Step {
    /// The sequence paused at a checkpoint, optionally surfacing the
    /// current running value.
    Yielded(Option<BigUint>),
    /// The sequence finished with the final term.
    Complete(BigUint),
}

/// A paused, externally driven computation: an implicit cursor plus
/// enough state to produce the next checkpoint or the final value.
///
/// Implementations are owned by the scheduler for their active lifetime
/// and advanced one micro-step per `advance` call. Once `Complete` has
/// been returned the sequence must not be advanced again.
pub trait StepSequence: Send {
    fn advance(&mut self) -> Result<Step, FibError>;
}

/// Pacing for one registered sequence: total micro-steps and the
/// requested yield granularity.
///
/// The effective interval is `gcd(max(total_steps - 1, 1), interval)`.
/// It always divides the distance to the last step, so the scheduler's
/// final yield boundary coincides with completion instead of overshooting
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YieldPolicy {
    total_steps: u64,
    interval: u64,
}

impl YieldPolicy {
    #[must_use]
    pub fn new(total_steps: u64, interval: u64) -> Self {
        Self {
            total_steps: total_steps.max(1),
            interval: interval.max(1),
        }
    }

    /// Micro-steps the scheduler advances this sequence per slice.
    #[must_use]
    pub fn effective(&self) -> u64 {
        gcd(self.total_steps.saturating_sub(1).max(1), self.interval)
    }

    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }
}
