//! Completion quotes.
//!
//! One message is picked uniformly at random each time a session completes.
//! The picker takes an optional seed so tests and replays get a
//! deterministic sequence.

use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;

/// Messages shown when a session completes.
pub const QUOTES: [&str; 10] = [
    "Today's win is yours.",
    "Discipline is freedom.",
    "You focused, and it paid off.",
    "A big step toward your future.",
    "Your attention just got stronger.",
    "Excellent work.",
    "Now take a deep breath.",
    "Consistency beats everything.",
    "No obstacle can stop you.",
    "One step closer to the summit.",
];

/// Uniform random quote picker.
pub struct QuotePicker {
    rng: Mcg128Xsl64,
}

impl QuotePicker {
    /// Seeded for reproducibility, or entropy-seeded with `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        };
        Self { rng }
    }

    pub fn pick(&mut self) -> &'static str {
        QUOTES[self.rng.gen_range(0..QUOTES.len())]
    }
}

impl Default for QuotePicker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for QuotePicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotePicker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_pickers_agree() {
        let mut a = QuotePicker::new(Some(42));
        let mut b = QuotePicker::new(Some(42));
        for _ in 0..16 {
            assert_eq!(a.pick(), b.pick());
        }
    }

    #[test]
    fn every_pick_is_a_known_quote() {
        let mut picker = QuotePicker::new(Some(3));
        for _ in 0..100 {
            assert!(QUOTES.contains(&picker.pick()));
        }
    }
}
