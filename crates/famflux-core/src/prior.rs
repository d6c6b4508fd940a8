//! Root family-size distribution and the prior over root sizes.

use std::collections::BTreeMap;

use statrs::distribution::{Discrete, Poisson};

use crate::error::{FamFluxError, FfResult};
use crate::family::GeneFamily;
use crate::optimizer::{minimize, SimplexOptions};

/// Multiset of root sizes used for drawing simulation roots. A map entry
/// `(size, count)` contributes `count` copies of `size`.
#[derive(Debug, Clone)]
pub struct RootDistribution {
    sizes: Vec<usize>,
}

impl RootDistribution {
    pub fn from_map(map: &BTreeMap<usize, usize>) -> Self {
        let mut sizes = Vec::new();
        for (&size, &count) in map {
            sizes.extend(std::iter::repeat(size).take(count));
        }
        RootDistribution { sizes }
    }

    pub fn uniform(max: usize) -> Self {
        RootDistribution {
            sizes: (1..=max).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn max(&self) -> usize {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    /// Weighted draw with replacement.
    pub fn select_randomly(&self, rng: &mut fastrand::Rng) -> usize {
        self.sizes[rng.usize(0..self.sizes.len())]
    }

    /// Shrink to `new_size` entries by shuffling and truncating.
    pub fn pare(&mut self, new_size: usize, rng: &mut fastrand::Rng) {
        if self.sizes.len() <= new_size {
            return;
        }
        rng.shuffle(&mut self.sizes);
        self.sizes.truncate(new_size);
        self.sizes.sort_unstable();
    }
}

/// Finite prior over root sizes `1..=max_root`; size 0 always has zero mass.
#[derive(Debug, Clone)]
pub enum RootPrior {
    Uniform { max_root: usize },
    Empirical { probs: Vec<f64> },
    Poisson { rate: f64, max_root: usize },
}

impl RootPrior {
    pub fn empirical(map: &BTreeMap<usize, usize>) -> FfResult<Self> {
        let max = *map.keys().max().unwrap_or(&0);
        let total: usize = map.values().sum();
        if max == 0 || total == 0 {
            return Err(FamFluxError::Input("empty root distribution".into()));
        }
        let mut probs = vec![0.0; max + 1];
        for (&size, &count) in map {
            probs[size] = count as f64 / total as f64;
        }
        Ok(RootPrior::Empirical { probs })
    }

    pub fn poisson(rate: f64, max_root: usize) -> FfResult<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(FamFluxError::Input(format!(
                "Poisson rate must be positive, got {}",
                rate
            )));
        }
        Ok(RootPrior::Poisson { rate, max_root })
    }

    pub fn compute(&self, size: usize) -> f64 {
        if size == 0 {
            return 0.0;
        }
        match self {
            RootPrior::Uniform { max_root } => {
                if size <= *max_root {
                    1.0 / *max_root as f64
                } else {
                    0.0
                }
            }
            RootPrior::Empirical { probs } => probs.get(size).copied().unwrap_or(0.0),
            RootPrior::Poisson { rate, max_root } => {
                if size > *max_root {
                    return 0.0;
                }
                // A family present at the root has size >= 1, so size s
                // maps onto pmf(s - 1).
                let dist = Poisson::new(*rate).expect("validated rate");
                dist.pmf((size - 1) as u64)
            }
        }
    }
}

/// Fit a Poisson rate to the nonzero leaf counts of the dataset, shifted
/// down by one to match the prior's support.
pub fn estimate_poisson_rate(families: &[GeneFamily]) -> FfResult<f64> {
    let counts: Vec<u64> = families
        .iter()
        .flat_map(|fam| {
            fam.species()
                .map(|sp| fam.count(sp).unwrap_or(0))
                .collect::<Vec<_>>()
        })
        .filter(|&c| c > 0)
        .map(|c| (c - 1) as u64)
        .collect();

    if counts.is_empty() {
        return Err(FamFluxError::Input(
            "cannot estimate a root prior from all-zero families".into(),
        ));
    }

    let score = |values: &[f64]| -> f64 {
        let rate = values[0];
        if !(rate.is_finite() && rate > 0.0) {
            return f64::INFINITY;
        }
        let dist = match Poisson::new(rate) {
            Ok(d) => d,
            Err(_) => return f64::INFINITY,
        };
        -counts.iter().map(|&c| dist.ln_pmf(c)).sum::<f64>()
    };

    let mean = counts.iter().sum::<u64>() as f64 / counts.len() as f64;
    let start = if mean > 0.0 { mean } else { 0.5 };
    let outcome = minimize(score, &[start], &SimplexOptions::default());
    if !outcome.score.is_finite() {
        return Err(FamFluxError::Input(
            "Poisson rate estimation did not converge".into(),
        ));
    }
    Ok(outcome.values[0])
}
