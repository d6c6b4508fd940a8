//! Inference models: shared data plus the base and gamma variants.

pub mod base;
pub mod gamma;

pub use base::BaseModel;
pub use gamma::GammaModel;

use std::fmt;

use crate::cache::MatrixCache;
use crate::errmodel::ErrorModel;
use crate::family::{build_reference_list, max_sizes, GeneFamily};
use crate::prior::RootPrior;
use crate::rates::Rate;
use crate::tree::Tree;

/// Everything a model borrows or owns while scoring: the tree and families
/// are borrowed from the dataset, the rate/prior/error model are owned.
pub struct ModelData<'a> {
    pub tree: &'a Tree,
    pub families: &'a [GeneFamily],
    pub rate: Rate,
    pub error_model: Option<ErrorModel>,
    pub prior: RootPrior,
    pub max_family_size: usize,
    pub max_root_family_size: usize,
    /// Index of the first family with identical counts; families sharing a
    /// reference share one pruning result per pass.
    pub references: Vec<usize>,
}

impl<'a> ModelData<'a> {
    pub fn new(
        tree: &'a Tree,
        families: &'a [GeneFamily],
        rate: Rate,
        error_model: Option<ErrorModel>,
        prior: RootPrior,
    ) -> Self {
        let (max_family_size, max_root_family_size) = max_sizes(families);
        let references = build_reference_list(families);
        ModelData {
            tree,
            families,
            rate,
            error_model,
            prior,
            max_family_size,
            max_root_family_size,
            references,
        }
    }

    /// Distinct effective rates over all categories.
    pub fn effective_rates(&self, multipliers: &[f64]) -> Vec<f64> {
        let mut rates: Vec<f64> = multipliers
            .iter()
            .flat_map(|m| self.rate.multiply(*m).distinct_values())
            .collect();
        rates.sort_by(|a, b| a.partial_cmp(b).unwrap());
        rates.dedup_by(|a, b| a.to_bits() == b.to_bits());
        rates
    }

    /// Whether any (branch, rate) pair is in the degenerate regime.
    pub fn any_saturated(&self, rates: &[f64]) -> bool {
        self.tree
            .branch_lengths()
            .iter()
            .any(|&t| rates.iter().any(|&l| MatrixCache::is_saturated(t, l)))
    }

    /// Serial bulk precalculation; the cache is read-only afterwards.
    pub fn build_cache(&self, rates: &[f64]) -> MatrixCache {
        let mut cache = MatrixCache::new(self.max_family_size);
        cache.precalculate(rates, &self.tree.branch_lengths());
        cache
    }

    pub fn longest_branch(&self) -> f64 {
        self.tree.longest_branch()
    }
}

/// One stash row per (family, category): the per-category and per-family
/// likelihoods plus the category posterior.
#[derive(Debug, Clone)]
pub struct FamilyInfo {
    pub family_id: String,
    pub multiplier: f64,
    pub category_likelihood: f64,
    pub family_likelihood: f64,
    pub posterior_probability: f64,
    pub significant: bool,
}

impl fmt::Display for FamilyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.family_id,
            self.multiplier,
            self.category_likelihood,
            self.family_likelihood,
            self.posterior_probability,
            if self.significant { "*" } else { "N/S" }
        )
    }
}
