//! Derivative-free simplex minimization (Nelder-Mead).

pub mod scorer;
pub mod strategy;

pub use scorer::{initialization_failure_advice, Scorer};
pub use strategy::{Optimizer, OptimizerResult, Strategy};

#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    /// Reflection coefficient.
    pub rho: f64,
    /// Expansion coefficient.
    pub chi: f64,
    /// Contraction coefficient.
    pub psi: f64,
    /// Shrink coefficient.
    pub sigma: f64,
    /// Simplex-diameter tolerance.
    pub tolx: f64,
    /// Score-range tolerance.
    pub tolf: f64,
    /// Relative perturbation used to seed vertices from nonzero coords.
    pub delta: f64,
    /// Absolute perturbation used when a start coordinate is zero.
    pub zero_delta: f64,
    pub max_iters: usize,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        SimplexOptions {
            rho: 1.0,
            chi: 2.0,
            psi: 0.5,
            sigma: 0.5,
            tolx: 1e-6,
            tolf: 1e-6,
            delta: 0.05,
            zero_delta: 2.5e-4,
            max_iters: 250,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimplexOutcome {
    pub values: Vec<f64>,
    pub score: f64,
    pub iterations: usize,
    pub converged: bool,
}

struct Simplex {
    n: usize,
    vertices: Vec<Vec<f64>>,
    scores: Vec<f64>,
}

impl Simplex {
    /// Seed vertex i (i ≥ 1) by perturbing coordinate i−1 of the start
    /// point. When the previous vertex scored infinite, the perturbation is
    /// enlarged a hundredfold to escape the infeasible region.
    fn init<F: FnMut(&[f64]) -> f64>(f: &mut F, x0: &[f64], opts: &SimplexOptions) -> Self {
        let n = x0.len();
        let mut vertices = Vec::with_capacity(n + 1);
        let mut scores: Vec<f64> = Vec::with_capacity(n + 1);

        for i in 0..=n {
            let mut vertex = x0.to_vec();
            if i >= 1 {
                let j = i - 1;
                let boost = if i > 1 && scores[i - 1].is_infinite() {
                    100.0
                } else {
                    1.0
                };
                vertex[j] = if x0[j] != 0.0 {
                    (1.0 + opts.delta * boost) * x0[j]
                } else {
                    opts.zero_delta
                };
            }
            scores.push(f(&vertex));
            vertices.push(vertex);
        }

        let mut simplex = Simplex {
            n,
            vertices,
            scores,
        };
        simplex.sort();
        simplex
    }

    fn sort(&mut self) {
        let mut order: Vec<usize> = (0..=self.n).collect();
        order.sort_by(|&a, &b| self.scores[a].partial_cmp(&self.scores[b]).unwrap());
        self.vertices = order.iter().map(|&i| self.vertices[i].clone()).collect();
        self.scores = order.iter().map(|&i| self.scores[i]).collect();
    }

    /// Centroid of the n best vertices.
    fn centroid(&self) -> Vec<f64> {
        let mut mean = vec![0.0; self.n];
        for vertex in &self.vertices[..self.n] {
            for (m, v) in mean.iter_mut().zip(vertex) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= self.n as f64;
        }
        mean
    }

    fn replace_worst(&mut self, x: Vec<f64>, score: f64) {
        self.vertices[self.n] = x;
        self.scores[self.n] = score;
        self.sort();
    }

    fn diameter_within(&self, tolx: f64) -> bool {
        for i in 0..self.n {
            for j in 0..self.n {
                if (self.vertices[i + 1][j] - self.vertices[i][j]).abs() > tolx {
                    return false;
                }
            }
        }
        true
    }

    fn range_within(&self, tolf: f64) -> bool {
        self.scores[1..]
            .iter()
            .all(|s| (s - self.scores[0]).abs() <= tolf)
    }
}

/// Minimize `f` from `x0`. Scores of `+∞` mark infeasible points and are
/// tolerated anywhere, including the start.
pub fn minimize<F: FnMut(&[f64]) -> f64>(
    mut f: F,
    x0: &[f64],
    opts: &SimplexOptions,
) -> SimplexOutcome {
    let n = x0.len();
    let mut simplex = Simplex::init(&mut f, x0, opts);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iters {
        if simplex.diameter_within(opts.tolx) && simplex.range_within(opts.tolf) {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid = simplex.centroid();
        let worst = simplex.vertices[n].clone();
        let best_score = simplex.scores[0];
        let worst_score = simplex.scores[n];

        let reflected: Vec<f64> = centroid
            .iter()
            .zip(&worst)
            .map(|(m, w)| m + opts.rho * (m - w))
            .collect();
        let reflected_score = f(&reflected);

        if reflected_score < best_score {
            let expanded: Vec<f64> = centroid
                .iter()
                .zip(&reflected)
                .map(|(m, r)| m + opts.chi * (r - m))
                .collect();
            let expanded_score = f(&expanded);
            if expanded_score < reflected_score {
                simplex.replace_worst(expanded, expanded_score);
            } else {
                simplex.replace_worst(reflected, reflected_score);
            }
        } else if reflected_score >= worst_score {
            if reflected_score > worst_score {
                let contracted: Vec<f64> = centroid
                    .iter()
                    .zip(&worst)
                    .map(|(m, w)| m + opts.psi * (m - w))
                    .collect();
                let contracted_score = f(&contracted);
                if contracted_score < worst_score {
                    simplex.replace_worst(contracted, contracted_score);
                } else {
                    shrink(&mut simplex, &mut f, opts);
                }
            } else {
                let contracted: Vec<f64> = centroid
                    .iter()
                    .zip(&reflected)
                    .map(|(m, r)| m + opts.psi * (r - m))
                    .collect();
                let contracted_score = f(&contracted);
                if contracted_score <= reflected_score {
                    simplex.replace_worst(contracted, contracted_score);
                } else {
                    shrink(&mut simplex, &mut f, opts);
                }
            }
        } else {
            simplex.replace_worst(reflected, reflected_score);
        }
    }

    SimplexOutcome {
        values: simplex.vertices[0].clone(),
        score: simplex.scores[0],
        iterations,
        converged,
    }
}

fn shrink<F: FnMut(&[f64]) -> f64>(simplex: &mut Simplex, f: &mut F, opts: &SimplexOptions) {
    let best = simplex.vertices[0].clone();
    for i in 1..=simplex.n {
        for (v, b) in simplex.vertices[i].iter_mut().zip(&best) {
            *v = b + opts.sigma * (*v - b);
        }
        simplex.scores[i] = f(&simplex.vertices[i]);
    }
    simplex.sort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_converges_from_small_start() {
        let outcome = minimize(
            |x| (x[0] - 0.3) * (x[0] - 0.3),
            &[0.05],
            &SimplexOptions {
                max_iters: 50,
                ..SimplexOptions::default()
            },
        );
        assert!(outcome.converged, "took {} iterations", outcome.iterations);
        assert!(outcome.iterations <= 50);
        assert!((outcome.values[0] - 0.3).abs() < 1e-3);
    }

    #[test]
    fn two_dimensional_bowl() {
        let outcome = minimize(
            |x| (x[0] - 1.0).powi(2) + 2.0 * (x[1] + 0.5).powi(2),
            &[0.1, 0.1],
            &SimplexOptions::default(),
        );
        assert!(outcome.converged);
        assert!((outcome.values[0] - 1.0).abs() < 1e-3);
        assert!((outcome.values[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn zero_coordinates_use_the_absolute_perturbation() {
        let outcome = minimize(
            |x| x[0] * x[0] + (x[1] - 0.1).powi(2),
            &[0.0, 0.1],
            &SimplexOptions::default(),
        );
        assert!(outcome.converged);
        assert!(outcome.values[0].abs() < 1e-3);
    }

    #[test]
    fn infinite_plateaus_are_tolerated() {
        // Infeasible below zero, quadratic above.
        let outcome = minimize(
            |x| {
                if x[0] < 0.0 {
                    f64::INFINITY
                } else {
                    (x[0] - 0.2).powi(2)
                }
            },
            &[0.05],
            &SimplexOptions::default(),
        );
        assert!(outcome.score.is_finite());
        assert!((outcome.values[0] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn convergence_satisfies_both_tolerances() {
        let opts = SimplexOptions::default();
        let mut calls = Vec::new();
        let outcome = minimize(
            |x| {
                calls.push(x[0]);
                (x[0] - 0.7).powi(2)
            },
            &[0.2],
            &opts,
        );
        assert!(outcome.converged);
        // On convergence the simplex has collapsed below tolx and the score
        // spread below tolf; the returned score is near-optimal.
        assert!(outcome.score < 1e-6);
    }
}
