//! Memoized transition matrices, keyed by (branch length, effective rate).
//!
//! The cache is filled serially before a scoring pass and is read-only
//! while families are pruned in parallel.

use std::collections::HashMap;

use itertools::iproduct;

use crate::error::{FamFluxError, FfResult};
use crate::matrix::{birth_death_matrix, LgammaTable, TransitionMatrix};

/// How close α may get to 1/2 before the alternating series in the
/// transition probability loses all significant digits.
pub const SATURATION_DELTA: f64 = 0.01;

pub struct MatrixCache {
    max_size: usize,
    lgamma: LgammaTable,
    matrices: HashMap<(u64, u64), TransitionMatrix>,
}

impl MatrixCache {
    pub fn new(max_size: usize) -> Self {
        MatrixCache {
            max_size,
            lgamma: LgammaTable::new(max_size),
            matrices: HashMap::new(),
        }
    }

    fn key(t: f64, lambda: f64) -> (u64, u64) {
        (t.to_bits(), lambda.to_bits())
    }

    /// Branch·rate regime where the discrete model degenerates; callers
    /// must reject such parameter points.
    pub fn is_saturated(t: f64, lambda: f64) -> bool {
        let alpha = lambda * t / (1.0 + lambda * t);
        alpha >= 0.5 - SATURATION_DELTA
    }

    /// Build and store the matrix for every (branch length, rate) pair.
    /// Idempotent: existing entries are left untouched.
    pub fn precalculate(&mut self, lambdas: &[f64], branch_lengths: &[f64]) {
        for (&t, &lambda) in iproduct!(branch_lengths, lambdas) {
            self.matrices
                .entry(Self::key(t, lambda))
                .or_insert_with(|| birth_death_matrix(lambda, t, self.max_size, &self.lgamma));
        }
    }

    /// Fetch a precomputed matrix. Missing entries indicate a precalculation
    /// bug, not bad user input.
    pub fn get(&self, t: f64, lambda: f64) -> FfResult<&TransitionMatrix> {
        self.matrices.get(&Self::key(t, lambda)).ok_or_else(|| {
            FamFluxError::Input(format!(
                "no matrix precalculated for branch {} at rate {}",
                t, lambda
            ))
        })
    }

    pub fn get_or_insert(&mut self, t: f64, lambda: f64) -> &TransitionMatrix {
        let max_size = self.max_size;
        let lgamma = &self.lgamma;
        self.matrices
            .entry(Self::key(t, lambda))
            .or_insert_with(|| birth_death_matrix(lambda, t, max_size, lgamma))
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precalculate_is_idempotent() {
        let mut cache = MatrixCache::new(10);
        cache.precalculate(&[0.01, 0.05], &[1.0, 2.0]);
        assert_eq!(cache.len(), 4);
        let before = cache.get(1.0, 0.01).unwrap() as *const TransitionMatrix;
        cache.precalculate(&[0.01, 0.05], &[1.0, 2.0]);
        assert_eq!(cache.len(), 4);
        let after = cache.get(1.0, 0.01).unwrap() as *const TransitionMatrix;
        assert_eq!(before, after);
    }

    #[test]
    fn get_requires_precalculation() {
        let cache = MatrixCache::new(10);
        assert!(cache.get(1.0, 0.01).is_err());
    }

    #[test]
    fn saturation_tracks_branch_times_rate() {
        assert!(!MatrixCache::is_saturated(1.0, 0.5));
        assert!(MatrixCache::is_saturated(1.0, 1.2));
        assert!(MatrixCache::is_saturated(120.0, 0.05));
        assert!(!MatrixCache::is_saturated(0.0, 5.0));
    }
}
