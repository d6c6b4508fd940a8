//! Single-rate birth-death model.

use rayon::prelude::*;
use tracing::warn;

use crate::error::FfResult;
use crate::model::{FamilyInfo, ModelData};
use crate::optimizer::scorer::{EpsilonModel, RateModel};
use crate::pruning::{family_log_likelihood, prune};
use crate::reconstruct::{reconstruct_family, FamilyReconstruction};

pub struct BaseModel<'a> {
    pub data: ModelData<'a>,
    pub stash: Vec<FamilyInfo>,
}

impl<'a> BaseModel<'a> {
    pub fn new(data: ModelData<'a>) -> Self {
        BaseModel {
            data,
            stash: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        "base"
    }

    /// −log likelihood of the whole dataset under the current rate, or
    /// `+∞` when the rate is invalid, any branch saturates, or any family's
    /// root vector underflows.
    pub fn score(&mut self) -> f64 {
        self.stash.clear();
        let data = &self.data;
        if !data.rate.is_valid() {
            return f64::INFINITY;
        }
        let rates = data.rate.distinct_values();
        if data.any_saturated(&rates) {
            return f64::INFINITY;
        }
        let cache = data.build_cache(&rates);

        // Families with identical counts share one pruning.
        let unique: Vec<usize> = (0..data.families.len())
            .filter(|&i| data.references[i] == i)
            .collect();
        let mut computed: Vec<Option<f64>> = vec![None; data.families.len()];
        let results: Vec<(usize, Option<f64>)> = unique
            .par_iter()
            .map(|&i| {
                let logl = match prune(
                    &data.families[i],
                    data.tree,
                    &data.rate,
                    &cache,
                    data.error_model.as_ref(),
                    data.max_family_size,
                    data.max_root_family_size,
                ) {
                    Ok(root) => family_log_likelihood(&root, &data.prior),
                    Err(e) => {
                        warn!("pruning failed for family {}: {}", data.families[i].id(), e);
                        None
                    }
                };
                (i, logl)
            })
            .collect();
        for (i, logl) in results {
            computed[i] = logl;
        }

        let mut total = 0.0;
        for (i, family) in data.families.iter().enumerate() {
            match computed[data.references[i]] {
                Some(logl) => {
                    self.stash.push(FamilyInfo {
                        family_id: family.id().to_string(),
                        multiplier: 1.0,
                        category_likelihood: 0.0,
                        family_likelihood: logl,
                        posterior_probability: 0.0,
                        significant: false,
                    });
                    total += logl;
                }
                None => return f64::INFINITY,
            }
        }
        -total
    }

    /// Most likely ancestral counts for every family at the current rate.
    pub fn reconstruct(&self) -> FfResult<Vec<FamilyReconstruction>> {
        let data = &self.data;
        let cache = data.build_cache(&data.rate.distinct_values());
        data.families
            .par_iter()
            .map(|family| {
                reconstruct_family(
                    family,
                    data.tree,
                    &data.rate,
                    &cache,
                    &data.prior,
                    data.max_family_size,
                    data.max_root_family_size,
                )
            })
            .collect()
    }
}

impl RateModel for BaseModel<'_> {
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

impl EpsilonModel for BaseModel<'_> {
    fn update_epsilon(&mut self, epsilon: f64) {
        if let Some(em) = self.data.error_model.as_mut() {
            em.update_single_epsilon(epsilon);
        }
    }

    fn current_epsilon(&self) -> f64 {
        self.data
            .error_model
            .as_ref()
            .and_then(|em| em.epsilons().first().copied())
            .unwrap_or(0.05)
    }
}
