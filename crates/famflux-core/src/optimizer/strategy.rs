//! Phased search strategies layered over the simplex.

use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::info;

use crate::error::{FamFluxError, FfResult};
use crate::optimizer::scorer::Scorer;
use crate::optimizer::{minimize, SimplexOptions, SimplexOutcome};

const LOW_PRECISION: f64 = 1e-2;
const HIGH_PRECISION: f64 = 1e-6;
const INITIALIZATION_ATTEMPTS: usize = 100;
const INITIAL_VARIANT_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Strategy {
    /// Single pass at the configured tolerances.
    #[default]
    Standard,
    /// Loose pass, then a widened re-run at tight tolerances.
    PerturbWhenClose,
    /// Several loose passes from fresh starting points, best wins.
    InitialVariants,
    /// Wide first pass, tight second pass with default coefficients.
    RangeWidelyThenHomeIn,
}

#[derive(Debug, Clone)]
pub struct OptimizerResult {
    pub values: Vec<f64>,
    pub score: f64,
    pub iterations: usize,
    pub duration: Duration,
}

pub struct Optimizer<'a, S: Scorer> {
    scorer: &'a mut S,
    strategy: Strategy,
    options: SimplexOptions,
}

impl<'a, S: Scorer> Optimizer<'a, S> {
    pub fn new(scorer: &'a mut S, strategy: Strategy, options: SimplexOptions) -> Self {
        Optimizer {
            scorer,
            strategy,
            options,
        }
    }

    /// Sample starting points until one scores finite. Exhausting the
    /// attempt budget is a fatal initialization failure.
    fn initial_guesses(&mut self, rng: &mut fastrand::Rng) -> FfResult<Vec<f64>> {
        for _ in 0..INITIALIZATION_ATTEMPTS {
            let guesses = self.scorer.initial_guesses(rng);
            if self.scorer.calculate_score(&guesses).is_finite() {
                return Ok(guesses);
            }
        }
        Err(FamFluxError::OptimizerInitialization(format!(
            "no feasible starting point in {} attempts",
            INITIALIZATION_ATTEMPTS
        )))
    }

    pub fn optimize(&mut self, rng: &mut fastrand::Rng) -> FfResult<OptimizerResult> {
        let before = Instant::now();
        let initial = self.initial_guesses(rng)?;

        let scorer = &mut *self.scorer;
        let options = self.options;
        let outcome = match self.strategy {
            Strategy::Standard => minimize(|x| scorer.calculate_score(x), &initial, &options),
            Strategy::PerturbWhenClose => {
                let loose = SimplexOptions {
                    tolx: LOW_PRECISION,
                    tolf: LOW_PRECISION,
                    ..options
                };
                let phase1 = minimize(|x| scorer.calculate_score(x), &initial, &loose);
                info!("loose pass converged, widening the simplex for phase 2");
                let widened = SimplexOptions {
                    rho: 1.3,
                    chi: 30.0,
                    delta: 0.4,
                    tolx: HIGH_PRECISION,
                    tolf: HIGH_PRECISION,
                    ..options
                };
                let phase2 = minimize(|x| scorer.calculate_score(x), &phase1.values, &widened);
                merge(phase1, phase2)
            }
            Strategy::InitialVariants => {
                let loose = SimplexOptions {
                    tolx: LOW_PRECISION,
                    tolf: LOW_PRECISION,
                    ..options
                };
                let mut passes = Vec::with_capacity(INITIAL_VARIANT_ATTEMPTS);
                passes.push(minimize(|x| scorer.calculate_score(x), &initial, &loose));
                for _ in 1..INITIAL_VARIANT_ATTEMPTS {
                    let start = match sample_feasible(scorer, rng) {
                        Some(s) => s,
                        None => continue,
                    };
                    passes.push(minimize(|x| scorer.calculate_score(x), &start, &loose));
                }
                let phase1_iters: usize = passes.iter().map(|p| p.iterations).sum();
                let best = passes
                    .into_iter()
                    .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap())
                    .expect("at least one pass");
                let tight = SimplexOptions {
                    tolx: HIGH_PRECISION,
                    tolf: HIGH_PRECISION,
                    ..options
                };
                let phase2 = minimize(|x| scorer.calculate_score(x), &best.values, &tight);
                let mut merged = merge(best, phase2);
                merged.iterations += phase1_iters;
                merged
            }
            Strategy::RangeWidelyThenHomeIn => {
                let wide = SimplexOptions {
                    rho: 1.5,
                    chi: 50.0,
                    delta: 0.4,
                    tolx: LOW_PRECISION,
                    tolf: LOW_PRECISION,
                    ..options
                };
                let phase1 = minimize(|x| scorer.calculate_score(x), &initial, &wide);
                info!("wide pass converged, homing in for phase 2");
                let tight = SimplexOptions {
                    tolx: HIGH_PRECISION,
                    tolf: HIGH_PRECISION,
                    ..SimplexOptions::default()
                };
                let phase2 = minimize(|x| scorer.calculate_score(x), &phase1.values, &tight);
                merge(phase1, phase2)
            }
        };

        self.scorer.finalize(&outcome.values);
        Ok(OptimizerResult {
            values: outcome.values,
            score: outcome.score,
            iterations: outcome.iterations,
            duration: before.elapsed(),
        })
    }
}

fn sample_feasible<S: Scorer>(scorer: &mut S, rng: &mut fastrand::Rng) -> Option<Vec<f64>> {
    for _ in 0..INITIALIZATION_ATTEMPTS {
        let guesses = scorer.initial_guesses(rng);
        if scorer.calculate_score(&guesses).is_finite() {
            return Some(guesses);
        }
    }
    None
}

fn merge(phase1: SimplexOutcome, phase2: SimplexOutcome) -> SimplexOutcome {
    SimplexOutcome {
        iterations: phase1.iterations + phase2.iterations,
        ..phase2
    }
}
