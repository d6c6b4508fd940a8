//! Bindings between the simplex's flat parameter vector and model state.
//!
//! Parameters are laid out contiguously: rate entries first, then the
//! gamma shape or the error epsilon when those are being searched.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::family::GeneFamily;

const ALPHA_GUESS_MEAN: f64 = 1.0;
const ALPHA_GUESS_STDDEV: f64 = 0.3;
const MIN_ALPHA_GUESS: f64 = 0.01;

/// A point in parameter space the optimizer can evaluate. Invalid inputs
/// score `+∞`; the simplex treats such points as infeasible.
pub trait Scorer {
    fn initial_guesses(&mut self, rng: &mut fastrand::Rng) -> Vec<f64>;
    fn calculate_score(&mut self, values: &[f64]) -> f64;
    fn finalize(&mut self, values: &[f64]);
}

/// Model surface the rate scorers drive.
pub trait RateModel {
    fn rate_count(&self) -> usize;
    fn update_rate(&mut self, values: &[f64]);
    fn compute_score(&mut self) -> f64;
}

/// Extra surface of the gamma model.
pub trait GammaRateModel: RateModel {
    fn set_alpha(&mut self, alpha: f64) -> bool;
    fn max_multiplier(&self) -> f64;
}

/// Extra surface of a model carrying an error model.
pub trait EpsilonModel: RateModel {
    fn update_epsilon(&mut self, epsilon: f64);
    fn current_epsilon(&self) -> f64;
}

fn rates_valid(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite() && *v >= 0.0)
}

fn alpha_guess(rng: &mut fastrand::Rng) -> f64 {
    let normal = Normal::new(ALPHA_GUESS_MEAN, ALPHA_GUESS_STDDEV).expect("fixed parameters");
    let u = rng.f64().clamp(1e-12, 1.0 - 1e-12);
    normal.inverse_cdf(u).max(MIN_ALPHA_GUESS)
}

/// Search over the rate entries only.
pub struct LambdaScorer<'a, M: RateModel> {
    model: &'a mut M,
    longest_branch: f64,
}

impl<'a, M: RateModel> LambdaScorer<'a, M> {
    pub fn new(model: &'a mut M, longest_branch: f64) -> Self {
        LambdaScorer {
            model,
            longest_branch,
        }
    }
}

impl<M: RateModel> Scorer for LambdaScorer<'_, M> {
    fn initial_guesses(&mut self, rng: &mut fastrand::Rng) -> Vec<f64> {
        (0..self.model.rate_count())
            .map(|_| 1.0 / self.longest_branch * rng.f64())
            .collect()
    }

    fn calculate_score(&mut self, values: &[f64]) -> f64 {
        if !rates_valid(values) {
            return f64::INFINITY;
        }
        self.model.update_rate(values);
        self.model.compute_score()
    }

    fn finalize(&mut self, values: &[f64]) {
        self.model.update_rate(values);
    }
}

/// Search over the gamma shape with the rate held fixed.
pub struct GammaScorer<'a, M: GammaRateModel> {
    model: &'a mut M,
}

impl<'a, M: GammaRateModel> GammaScorer<'a, M> {
    pub fn new(model: &'a mut M) -> Self {
        GammaScorer { model }
    }
}

impl<M: GammaRateModel> Scorer for GammaScorer<'_, M> {
    fn initial_guesses(&mut self, rng: &mut fastrand::Rng) -> Vec<f64> {
        vec![alpha_guess(rng)]
    }

    fn calculate_score(&mut self, values: &[f64]) -> f64 {
        let alpha = values[0];
        if !(alpha.is_finite() && alpha > 0.0) || !self.model.set_alpha(alpha) {
            return f64::INFINITY;
        }
        self.model.compute_score()
    }

    fn finalize(&mut self, values: &[f64]) {
        self.model.set_alpha(values[0]);
    }
}

/// Joint search over the rate entries and the gamma shape: rates first,
/// α last.
pub struct LambdaGammaScorer<'a, M: GammaRateModel> {
    model: &'a mut M,
    longest_branch: f64,
}

impl<'a, M: GammaRateModel> LambdaGammaScorer<'a, M> {
    pub fn new(model: &'a mut M, longest_branch: f64) -> Self {
        LambdaGammaScorer {
            model,
            longest_branch,
        }
    }
}

impl<M: GammaRateModel> Scorer for LambdaGammaScorer<'_, M> {
    fn initial_guesses(&mut self, rng: &mut fastrand::Rng) -> Vec<f64> {
        let alpha = alpha_guess(rng);
        self.model.set_alpha(alpha);
        // Fast categories scale the effective rate; keep λ·t·multiplier in
        // the feasible region from the start.
        let scale = 1.0 / (self.longest_branch * self.model.max_multiplier());
        let mut guesses: Vec<f64> = (0..self.model.rate_count())
            .map(|_| scale * rng.f64())
            .collect();
        guesses.push(alpha);
        guesses
    }

    fn calculate_score(&mut self, values: &[f64]) -> f64 {
        let (rates, alpha) = values.split_at(values.len() - 1);
        let alpha = alpha[0];
        if !rates_valid(rates) || !(alpha.is_finite() && alpha > 0.0) {
            return f64::INFINITY;
        }
        if !self.model.set_alpha(alpha) {
            return f64::INFINITY;
        }
        self.model.update_rate(rates);
        self.model.compute_score()
    }

    fn finalize(&mut self, values: &[f64]) {
        let (rates, alpha) = values.split_at(values.len() - 1);
        self.model.set_alpha(alpha[0]);
        self.model.update_rate(rates);
    }
}

/// Joint search over the rate entries and a single error epsilon.
pub struct LambdaEpsilonScorer<'a, M: EpsilonModel> {
    model: &'a mut M,
    longest_branch: f64,
}

impl<'a, M: EpsilonModel> LambdaEpsilonScorer<'a, M> {
    pub fn new(model: &'a mut M, longest_branch: f64) -> Self {
        LambdaEpsilonScorer {
            model,
            longest_branch,
        }
    }
}

impl<M: EpsilonModel> Scorer for LambdaEpsilonScorer<'_, M> {
    fn initial_guesses(&mut self, rng: &mut fastrand::Rng) -> Vec<f64> {
        let mut guesses: Vec<f64> = (0..self.model.rate_count())
            .map(|_| 1.0 / self.longest_branch * rng.f64())
            .collect();
        guesses.push(self.model.current_epsilon());
        guesses
    }

    fn calculate_score(&mut self, values: &[f64]) -> f64 {
        let (rates, epsilon) = values.split_at(values.len() - 1);
        let epsilon = epsilon[0];
        if !rates_valid(rates) || !(0.0..=0.5).contains(&epsilon) {
            return f64::INFINITY;
        }
        self.model.update_rate(rates);
        self.model.update_epsilon(epsilon);
        self.model.compute_score()
    }

    fn finalize(&mut self, values: &[f64]) {
        let (rates, epsilon) = values.split_at(values.len() - 1);
        self.model.update_rate(rates);
        self.model.update_epsilon(epsilon[0]);
    }
}

/// Advice printed when no feasible starting point exists: the families with
/// the largest min-max count differential are the usual offenders.
pub fn initialization_failure_advice(families: &[GeneFamily]) -> String {
    let mut differentials: Vec<(&str, usize)> = families
        .iter()
        .map(|f| (f.id(), f.species_size_differential()))
        .collect();
    differentials.sort_by(|a, b| b.1.cmp(&a.1));
    differentials.truncate(20);

    let mut out = String::from("Families with largest size differentials:\n");
    for (id, diff) in &differentials {
        out.push_str(&format!("{}: {}\n", id, diff));
    }
    out.push_str(
        "You may want to try removing the families with the largest difference\n\
         between the max and min counts and then re-run the analysis.\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        rates: Vec<f64>,
        alpha: f64,
        epsilon: f64,
        count: usize,
    }

    impl Recorder {
        fn new(count: usize) -> Self {
            Recorder {
                rates: vec![0.0; count],
                alpha: 0.0,
                epsilon: 0.05,
                count,
            }
        }
    }

    impl RateModel for Recorder {
        fn rate_count(&self) -> usize {
            self.count
        }

        fn update_rate(&mut self, values: &[f64]) {
            self.rates = values.to_vec();
        }

        fn compute_score(&mut self) -> f64 {
            self.rates.iter().map(|r| (r - 0.1) * (r - 0.1)).sum()
        }
    }

    impl GammaRateModel for Recorder {
        fn set_alpha(&mut self, alpha: f64) -> bool {
            self.alpha = alpha;
            true
        }

        fn max_multiplier(&self) -> f64 {
            2.0
        }
    }

    impl EpsilonModel for Recorder {
        fn update_epsilon(&mut self, epsilon: f64) {
            self.epsilon = epsilon;
        }

        fn current_epsilon(&self) -> f64 {
            self.epsilon
        }
    }

    #[test]
    fn lambda_scorer_rejects_negative_rates() {
        let mut model = Recorder::new(2);
        let mut scorer = LambdaScorer::new(&mut model, 3.0);
        assert!(scorer.calculate_score(&[-0.1, 0.2]).is_infinite());
        assert!(scorer.calculate_score(&[0.1, 0.2]).is_finite());
    }

    #[test]
    fn lambda_guesses_scale_with_the_longest_branch() {
        let mut model = Recorder::new(3);
        let mut scorer = LambdaScorer::new(&mut model, 10.0);
        let mut rng = fastrand::Rng::with_seed(5);
        let guesses = scorer.initial_guesses(&mut rng);
        assert_eq!(guesses.len(), 3);
        assert!(guesses.iter().all(|g| (0.0..0.1).contains(g)));
    }

    #[test]
    fn gamma_scorer_rejects_nonpositive_alpha() {
        let mut model = Recorder::new(1);
        let mut scorer = GammaScorer::new(&mut model);
        assert!(scorer.calculate_score(&[0.0]).is_infinite());
        assert!(scorer.calculate_score(&[-1.0]).is_infinite());
        assert!(scorer.calculate_score(&[0.5]).is_finite());
    }

    #[test]
    fn joint_scorer_splits_rates_and_alpha() {
        let mut model = Recorder::new(2);
        let mut scorer = LambdaGammaScorer::new(&mut model, 1.0);
        assert!(scorer.calculate_score(&[0.1, 0.2, 0.7]).is_finite());
        scorer.finalize(&[0.1, 0.2, 0.7]);
        assert_eq!(model.rates, vec![0.1, 0.2]);
        assert_eq!(model.alpha, 0.7);
    }

    #[test]
    fn epsilon_scorer_bounds_epsilon() {
        let mut model = Recorder::new(1);
        let mut scorer = LambdaEpsilonScorer::new(&mut model, 1.0);
        assert!(scorer.calculate_score(&[0.1, 0.6]).is_infinite());
        assert!(scorer.calculate_score(&[0.1, 0.3]).is_finite());
        assert_eq!(model.epsilon, 0.3);
    }

    #[test]
    fn failure_advice_ranks_by_differential() {
        let mut narrow = GeneFamily::new("narrow", "");
        narrow.set_count("A", 2);
        narrow.set_count("B", 3);
        let mut wide = GeneFamily::new("wide", "");
        wide.set_count("A", 1);
        wide.set_count("B", 90);
        let advice = initialization_failure_advice(&[narrow, wide]);
        let wide_at = advice.find("wide: 89").unwrap();
        let narrow_at = advice.find("narrow: 1").unwrap();
        assert!(wide_at < narrow_at);
    }
}
