//! Seeded pseudorandom stream owned by one engine instance.
//!
//! The stream is never reseeded: successive calls on one engine advance the
//! same ChaCha20 state, so a whole call sequence replays bit-for-bit from the
//! seed. Not thread-safe; give each fuzzing worker its own engine.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha20Rng,
    draws: u64,
}

impl RandomSource {
    pub fn from_seed(seed: u32) -> Self {
        let seed_bytes = blake3::hash(&seed.to_le_bytes()).as_bytes().to_owned();
        let mut seed32 = [0u8; 32];
        seed32.copy_from_slice(&seed_bytes[..32]);
        Self {
            rng: ChaCha20Rng::from_seed(seed32),
            draws: 0,
        }
    }

    /// Number of 64-bit words drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    pub fn byte(&mut self) -> u8 {
        (self.next_u64() & 0xFF) as u8
    }

    /// Uniform index in `0..n`. Returns 0 for an empty range.
    pub fn below(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % n as u64) as usize
    }

    /// Uniform value in `lo..=hi`.
    pub fn in_range(&mut self, lo: usize, hi: usize) -> usize {
        if hi <= lo {
            return lo;
        }
        lo + self.below(hi - lo + 1)
    }

    /// True with probability `numerator / denominator`.
    pub fn chance(&mut self, numerator: u64, denominator: u64) -> bool {
        if denominator == 0 || numerator >= denominator {
            return true;
        }
        self.next_u64() % denominator < numerator
    }

    pub fn coin(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// Picks an index with probability proportional to its weight.
    /// `None` when every weight is zero.
    pub fn weighted_index(&mut self, weights: &[u64]) -> Option<usize> {
        let total = weights.iter().fold(0u64, |acc, w| acc.saturating_add(*w));
        if total == 0 {
            return None;
        }
        let mut pick = self.next_u64() % total;
        for (i, w) in weights.iter().enumerate() {
            if pick < *w {
                return Some(i);
            }
            pick -= *w;
        }
        None
    }
}
