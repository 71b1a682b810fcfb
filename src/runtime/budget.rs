//! Size budget and the per-call mutation context.

use crate::RandomSource;

/// Remaining allowance for serialized-size growth during one call.
///
/// Growth is only applied when it fits; shrinking credits the allowance back.
/// The counter never goes negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBudget {
    remaining: usize,
    consumed: usize,
    credited: usize,
    refused: usize,
}

impl SizeBudget {
    pub fn new(hint: usize) -> Self {
        Self {
            remaining: hint,
            consumed: 0,
            credited: 0,
            refused: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn credited(&self) -> usize {
        self.credited
    }

    /// Growth requests turned down so far.
    pub fn refused(&self) -> usize {
        self.refused
    }

    pub fn allows(&self, bytes: usize) -> bool {
        bytes <= self.remaining
    }

    /// Takes `bytes` from the budget if they fit.
    pub fn try_consume(&mut self, bytes: usize) -> bool {
        if !self.allows(bytes) {
            self.refused = self.refused.saturating_add(1);
            return false;
        }
        self.remaining -= bytes;
        self.consumed = self.consumed.saturating_add(bytes);
        true
    }

    pub fn credit(&mut self, bytes: usize) {
        self.remaining = self.remaining.saturating_add(bytes);
        self.credited = self.credited.saturating_add(bytes);
    }

    /// Accounts a signed size change. Positive deltas must fit.
    pub fn apply_delta(&mut self, before: usize, after: usize) -> bool {
        if after > before {
            self.try_consume(after - before)
        } else {
            self.credit(before - after);
            true
        }
    }

    /// No growth left: only size-neutral or shrinking operations apply.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Call-scoped state threaded through every recursive step of one `mutate`.
#[derive(Debug)]
pub struct MutationContext<'a> {
    pub rng: &'a mut RandomSource,
    pub budget: SizeBudget,
    pub depth: usize,
    pub max_depth: usize,
}

impl<'a> MutationContext<'a> {
    pub fn new(rng: &'a mut RandomSource, hint: usize, max_depth: usize) -> Self {
        Self {
            rng,
            budget: SizeBudget::new(hint),
            depth: 0,
            max_depth,
        }
    }

    /// Levels left before `max_depth`; zero means no further descent.
    pub fn depth_remaining(&self) -> usize {
        self.max_depth.saturating_sub(self.depth)
    }

    pub fn can_descend(&self) -> bool {
        self.depth < self.max_depth
    }
}
