//! Birth-death transition probabilities.
//!
//! For rate λ and branch length t, the chance of a lineage of size s at the
//! parent having size c at the child is
//!
//! ```text
//! P(s→c) = Σ_{j=0}^{min(s,c)} C(s,j) · C(s+c−j−1, s−1) · α^(s+c−2j) · (1−2α)^j
//! ```
//!
//! with α = λt / (1 + λt). The combinatorial part is evaluated in log space
//! against a cached lgamma table; the `(1−2α)^j` factor is carried outside
//! the logs because it goes negative once λt > 1.

use statrs::function::gamma::ln_gamma;

/// Entries this small make a matrix indistinguishable from zero.
const ZERO_EPSILON: f64 = 1e-300;

/// Cached `ln Γ(i)` for integer arguments. One table serves every matrix of
/// a run; arguments reach `2N + 2` for size-N matrices.
#[derive(Debug, Clone)]
pub struct LgammaTable {
    values: Vec<f64>,
}

impl LgammaTable {
    pub fn new(max_size: usize) -> Self {
        let n = 2 * max_size + 3;
        let values = (0..n).map(|i| ln_gamma(i as f64)).collect();
        LgammaTable { values }
    }

    /// ln C(n, k); −∞ when k > n so impossible terms vanish on exp.
    pub fn chooseln(&self, n: usize, k: usize) -> f64 {
        if k > n {
            return f64::NEG_INFINITY;
        }
        self.values[n + 1] - self.values[k + 1] - self.values[n - k + 1]
    }
}

/// An immutable (N+1)×(N+1) transition matrix, row = parent size.
#[derive(Debug, Clone)]
pub struct TransitionMatrix {
    size: usize,
    values: Vec<f64>,
}

impl TransitionMatrix {
    fn filled(size: usize) -> Self {
        TransitionMatrix {
            size,
            values: vec![0.0; size * size],
        }
    }

    pub fn identity(max_size: usize) -> Self {
        let size = max_size + 1;
        let mut m = Self::filled(size);
        for i in 0..size {
            m.values[i * size + i] = 1.0;
        }
        m
    }

    pub fn get(&self, parent: usize, child: usize) -> f64 {
        self.values[parent * self.size + child]
    }

    pub fn row(&self, parent: usize) -> &[f64] {
        &self.values[parent * self.size..(parent + 1) * self.size]
    }

    /// Matrix-vector product: `out[i] = Σ_j P(i→j)·v[j]`, the per-child
    /// factor of the pruning recursion.
    pub fn multiply(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.size);
        (0..self.size)
            .map(|i| {
                self.row(i)
                    .iter()
                    .zip(v)
                    .map(|(p, x)| p * x)
                    .sum::<f64>()
            })
            .collect()
    }

    /// True when every entry has underflowed.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v < ZERO_EPSILON)
    }
}

/// Build the transition matrix for sizes `0..=max_size`.
pub fn birth_death_matrix(
    lambda: f64,
    t: f64,
    max_size: usize,
    lgamma: &LgammaTable,
) -> TransitionMatrix {
    if lambda == 0.0 || t == 0.0 {
        return TransitionMatrix::identity(max_size);
    }

    let size = max_size + 1;
    let alpha = lambda * t / (1.0 + lambda * t);
    let log_alpha = alpha.ln();
    let coeff = 1.0 - 2.0 * alpha;

    let mut matrix = TransitionMatrix::filled(size);
    matrix.values[0] = 1.0;
    for s in 1..size {
        for c in 0..size {
            let mut p = 0.0;
            let mut sign_term = 1.0;
            for j in 0..=s.min(c) {
                let log_term = lgamma.chooseln(s, j)
                    + lgamma.chooseln(s + c - j - 1, s - 1)
                    + ((s + c - 2 * j) as f64) * log_alpha;
                p += log_term.exp() * sign_term;
                sign_term *= coeff;
            }
            matrix.values[s * size + c] = p.clamp(0.0, 1.0);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(lambda: f64, t: f64, n: usize) -> TransitionMatrix {
        birth_death_matrix(lambda, t, n, &LgammaTable::new(n))
    }

    #[test]
    fn rows_sum_to_at_most_one() {
        let m = build(0.01, 5.0, 20);
        for s in 0..=20 {
            let sum: f64 = m.row(s).iter().sum();
            assert!(sum <= 1.0 + 1e-9, "row {} sums to {}", s, sum);
            assert!(m.row(s).iter().all(|p| *p >= 0.0));
        }
    }

    #[test]
    fn extinct_lineages_stay_extinct() {
        let m = build(0.5, 3.0, 10);
        assert_eq!(m.get(0, 0), 1.0);
        for c in 1..=10 {
            assert_eq!(m.get(0, c), 0.0);
        }
    }

    #[test]
    fn single_lineage_probabilities_match_closed_forms() {
        let lambda = 0.3;
        let t = 1.5;
        let alpha = lambda * t / (1.0 + lambda * t);
        let m = build(lambda, t, 12);
        assert!((m.get(1, 0) - alpha).abs() < 1e-12);
        assert!((m.get(1, 1) - (1.0 - alpha) * (1.0 - alpha)).abs() < 1e-12);
        // size 1 → 2 needs one net birth: (1−α)²·α
        assert!((m.get(1, 2) - (1.0 - alpha) * (1.0 - alpha) * alpha).abs() < 1e-12);
    }

    #[test]
    fn zero_rate_and_zero_length_give_identity() {
        for m in [build(0.0, 2.0, 8), build(0.05, 0.0, 8)] {
            for s in 0..=8 {
                for c in 0..=8 {
                    let expected = if s == c { 1.0 } else { 0.0 };
                    assert_eq!(m.get(s, c), expected);
                }
            }
            assert!(!m.is_zero());
        }
    }

    #[test]
    fn chooseln_matches_small_binomials() {
        let lg = LgammaTable::new(10);
        assert!((lg.chooseln(5, 2).exp() - 10.0).abs() < 1e-9);
        assert!((lg.chooseln(6, 3).exp() - 20.0).abs() < 1e-9);
        assert_eq!(lg.chooseln(2, 5), f64::NEG_INFINITY);
    }
}
