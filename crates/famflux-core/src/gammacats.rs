//! Discretized gamma rate variation across families.
//!
//! K categories take the medians of K equal-probability bins of
//! Gamma(α, 1/α) as rate multipliers (unit mean), each with prior
//! weight 1/K.

use statrs::distribution::{ContinuousCDF, Gamma};

use crate::cache::MatrixCache;
use crate::errmodel::ErrorModel;
use crate::error::{FamFluxError, FfResult};
use crate::family::GeneFamily;
use crate::prior::RootPrior;
use crate::pruning::prune;
use crate::rates::Rate;
use crate::tree::Tree;

/// A gamma-category posterior is flagged significant above this value.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.95;

/// Median rate multipliers for `k` equal-probability bins of Gamma(α, 1/α).
pub fn category_multipliers(alpha: f64, k: usize) -> FfResult<Vec<f64>> {
    if k == 0 {
        return Err(FamFluxError::Input("need at least one gamma category".into()));
    }
    if k == 1 {
        return Ok(vec![1.0]);
    }
    let dist = Gamma::new(alpha, alpha).map_err(|_| {
        FamFluxError::Input(format!("gamma shape must be positive, got {}", alpha))
    })?;
    Ok((0..k)
        .map(|i| dist.inverse_cdf((2 * i + 1) as f64 / (2 * k) as f64))
        .collect())
}

/// Per-category pruning results for one family.
#[derive(Debug, Clone)]
pub struct BundleResult {
    /// (1/K)-weighted likelihood of each category.
    pub category_likelihoods: Vec<f64>,
    /// Best weighted category likelihood (the family likelihood).
    pub family_likelihood: f64,
    pub posteriors: Vec<f64>,
}

impl BundleResult {
    pub fn significant(&self, category: usize) -> bool {
        self.posteriors[category] > SIGNIFICANCE_THRESHOLD
    }
}

/// Prune one family under every category multiplier. `None` when any
/// category's root vector has fully underflowed, which rejects the whole
/// parameter point.
#[allow(clippy::too_many_arguments)]
pub fn prune_bundle(
    family: &GeneFamily,
    tree: &Tree,
    rate: &Rate,
    multipliers: &[f64],
    cache: &MatrixCache,
    error_model: Option<&ErrorModel>,
    prior: &RootPrior,
    max_family_size: usize,
    max_root_family_size: usize,
) -> FfResult<Option<BundleResult>> {
    let weight = 1.0 / multipliers.len() as f64;
    let mut category_likelihoods = Vec::with_capacity(multipliers.len());

    for &multiplier in multipliers {
        let scaled = rate.multiply(multiplier);
        let root = prune(
            family,
            tree,
            &scaled,
            cache,
            error_model,
            max_family_size,
            max_root_family_size,
        )?;
        let best = (1..root.len())
            .map(|s| root[s] * prior.compute(s))
            .fold(0.0, f64::max);
        if best <= 0.0 {
            return Ok(None);
        }
        category_likelihoods.push(weight * best);
    }

    let family_likelihood = category_likelihoods.iter().copied().fold(0.0, f64::max);
    let total: f64 = category_likelihoods.iter().sum();
    let posteriors = category_likelihoods.iter().map(|l| l / total).collect();

    Ok(Some(BundleResult {
        category_likelihoods,
        family_likelihood,
        posteriors,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_category_is_the_unit_multiplier() {
        assert_eq!(category_multipliers(0.7, 1).unwrap(), vec![1.0]);
    }

    #[test]
    fn exponential_bin_medians_have_closed_forms() {
        // Gamma(1, 1) is Exp(1): quartile medians at −ln(3/4) and −ln(1/4).
        let m = category_multipliers(1.0, 2).unwrap();
        assert!((m[0] - (-(0.75f64.ln()))).abs() < 1e-8);
        assert!((m[1] - (-(0.25f64.ln()))).abs() < 1e-8);
    }

    #[test]
    fn multipliers_are_increasing_and_centered() {
        let m = category_multipliers(0.5, 4).unwrap();
        assert!(m.windows(2).all(|w| w[0] < w[1]));
        // unit-mean distribution: medians straddle 1
        assert!(m[0] < 1.0 && m[3] > 1.0);
    }

    #[test]
    fn posteriors_sum_to_one() {
        let tree = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);", false).unwrap();
        let mut fam = GeneFamily::new("F1", "");
        fam.set_count("A", 5);
        fam.set_count("B", 10);
        fam.set_count("C", 2);
        fam.set_count("D", 6);

        let rate = Rate::Single(0.05);
        let multipliers = category_multipliers(0.8, 3).unwrap();
        let mut cache = MatrixCache::new(fam.max_family_size());
        for &m in &multipliers {
            cache.precalculate(&rate.multiply(m).distinct_values(), &tree.branch_lengths());
        }

        let prior = RootPrior::Uniform { max_root: 30 };
        let result = prune_bundle(
            &fam,
            &tree,
            &rate,
            &multipliers,
            &cache,
            None,
            &prior,
            fam.max_family_size(),
            30,
        )
        .unwrap()
        .expect("unsaturated regime");

        let sum: f64 = result.posteriors.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(result.family_likelihood > 0.0);
        assert_eq!(result.category_likelihoods.len(), 3);
    }
}
