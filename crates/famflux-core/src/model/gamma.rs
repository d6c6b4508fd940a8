//! Birth-death model with gamma-distributed rate variation across families.

use rayon::prelude::*;
use tracing::warn;

use crate::error::FfResult;
use crate::gammacats::{category_multipliers, prune_bundle, BundleResult};
use crate::model::{FamilyInfo, ModelData};
use crate::optimizer::scorer::{GammaRateModel, RateModel};
use crate::reconstruct::{reconstruct_family_gamma, FamilyReconstruction};

pub struct GammaModel<'a> {
    pub data: ModelData<'a>,
    alpha: f64,
    n_cats: usize,
    multipliers: Vec<f64>,
    pub stash: Vec<FamilyInfo>,
}

impl<'a> GammaModel<'a> {
    pub fn new(data: ModelData<'a>, n_cats: usize, alpha: f64) -> FfResult<Self> {
        let multipliers = category_multipliers(alpha, n_cats)?;
        Ok(GammaModel {
            data,
            alpha,
            n_cats,
            multipliers,
            stash: Vec::new(),
        })
    }

    pub fn name(&self) -> &'static str {
        "gamma"
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn multipliers(&self) -> &[f64] {
        &self.multipliers
    }

    /// −log likelihood with every family mixed over the K categories. Any
    /// saturated category rejects the whole parameter point.
    pub fn score(&mut self) -> f64 {
        self.stash.clear();
        let data = &self.data;
        if !data.rate.is_valid() {
            return f64::INFINITY;
        }
        let rates = data.effective_rates(&self.multipliers);
        if data.any_saturated(&rates) {
            return f64::INFINITY;
        }
        let cache = data.build_cache(&rates);

        let unique: Vec<usize> = (0..data.families.len())
            .filter(|&i| data.references[i] == i)
            .collect();
        let multipliers = &self.multipliers;
        let mut computed: Vec<Option<BundleResult>> = vec![None; data.families.len()];
        let results: Vec<(usize, Option<BundleResult>)> = unique
            .par_iter()
            .map(|&i| {
                let bundle = match prune_bundle(
                    &data.families[i],
                    data.tree,
                    &data.rate,
                    multipliers,
                    &cache,
                    data.error_model.as_ref(),
                    &data.prior,
                    data.max_family_size,
                    data.max_root_family_size,
                ) {
                    Ok(bundle) => bundle,
                    Err(e) => {
                        warn!("pruning failed for family {}: {}", data.families[i].id(), e);
                        None
                    }
                };
                (i, bundle)
            })
            .collect();
        for (i, bundle) in results {
            computed[i] = bundle;
        }

        let mut total = 0.0;
        for (i, family) in data.families.iter().enumerate() {
            match &computed[data.references[i]] {
                Some(bundle) => {
                    for (k, &multiplier) in self.multipliers.iter().enumerate() {
                        self.stash.push(FamilyInfo {
                            family_id: family.id().to_string(),
                            multiplier,
                            category_likelihood: bundle.category_likelihoods[k],
                            family_likelihood: bundle.family_likelihood,
                            posterior_probability: bundle.posteriors[k],
                            significant: bundle.significant(k),
                        });
                    }
                    total += bundle.family_likelihood.ln();
                }
                None => return f64::INFINITY,
            }
        }
        -total
    }

    /// Per-category Pupko reconstructions averaged into one ancestral count
    /// per node.
    pub fn reconstruct(&self) -> FfResult<Vec<FamilyReconstruction>> {
        let data = &self.data;
        let cache = data.build_cache(&data.effective_rates(&self.multipliers));
        data.families
            .par_iter()
            .map(|family| {
                reconstruct_family_gamma(
                    family,
                    data.tree,
                    &data.rate,
                    &self.multipliers,
                    &cache,
                    &data.prior,
                    data.max_family_size,
                    data.max_root_family_size,
                )
            })
            .collect()
    }
}

impl RateModel for GammaModel<'_> {
    fn rate_count(&self) -> usize {
        self.data.rate.count()
    }

    fn update_rate(&mut self, values: &[f64]) {
        self.data.rate.update(values);
    }

    fn compute_score(&mut self) -> f64 {
        self.score()
    }
}

impl GammaRateModel for GammaModel<'_> {
    fn set_alpha(&mut self, alpha: f64) -> bool {
        match category_multipliers(alpha, self.n_cats) {
            Ok(multipliers) => {
                self.alpha = alpha;
                self.multipliers = multipliers;
                true
            }
            Err(_) => false,
        }
    }

    fn max_multiplier(&self) -> f64 {
        self.multipliers.iter().copied().fold(1.0, f64::max)
    }
}
