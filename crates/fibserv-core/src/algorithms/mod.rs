//! The sequence algorithm family: one contract, several cost profiles.
//!
//! Each variant answers `nth(n)` somewhere between O(1) and O(phi^n).
//! The decomposable ones (`iterative`, `doubling`) additionally expose a
//! resumable [`StepSequence`](crate::sequence::StepSequence) form for the
//! cooperative scheduler; the opaque ones run on isolated workers.

pub mod binet;
pub mod doubling;
pub mod iterative;
pub mod naive;

/// Selector for a sequence algorithm variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// O(n) additions, decomposable.
    Iterative,
    /// O(log n) doubling steps, decomposable.
    Doubling,
    /// O(phi^n) recursion, opaque; only viable behind a killable process.
    Naive,
    /// Closed form, opaque, runs on an in-process worker thread.
    Binet,
    /// Closed form delegated to a fresh process image.
    BinetProcess,
    /// The recurrence over shared cached sub-terms.
    Memoized,
}

impl Algorithm {
    /// Every variant, in discovery-page order.
    pub const ALL: [Algorithm; 6] = [
        Algorithm::Iterative,
        Algorithm::Doubling,
        Algorithm::Naive,
        Algorithm::Binet,
        Algorithm::BinetProcess,
        Algorithm::Memoized,
    ];

    /// The stable request-path name of this variant.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Iterative => "iterative",
            Self::Doubling => "doubling",
            Self::Naive => "naive",
            Self::Binet => "binet",
            Self::BinetProcess => "binet-process",
            Self::Memoized => "memoized",
        }
    }

    /// Look a variant up by its request-path name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for algo in Algorithm::ALL {
            assert_eq!(Algorithm::from_name(algo.name()), Some(algo));
        }
    }

    #[test]
    fn unknown_name() {
        assert_eq!(Algorithm::from_name("quantum"), None);
        assert_eq!(Algorithm::from_name(""), None);
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(Algorithm::BinetProcess.to_string(), "binet-process");
    }
}
