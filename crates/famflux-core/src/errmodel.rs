//! Per-tip observation-error model.
//!
//! For every possible true leaf count the model holds a probability vector
//! over a declared deviation set (commonly {−1, 0, +1}): the chance that
//! sequencing/annotation reported `true + deviation` genes.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

use crate::error::{FamFluxError, FfResult};

#[derive(Debug, Clone)]
pub struct ErrorModel {
    max_count: usize,
    deviations: Vec<i64>,
    probs: Vec<Vec<f64>>,
}

impl ErrorModel {
    /// Parse the key/value header (`max:`, `cnt:`) followed by per-count
    /// probability rows. Counts without a row inherit the nearest row above.
    pub fn from_reader<R: Read>(reader: R) -> FfResult<Self> {
        let mut max_count: Option<usize> = None;
        let mut deviations: Vec<i64> = Vec::new();
        let mut declared: Vec<(usize, Vec<f64>)> = Vec::new();

        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("max:") {
                max_count = Some(rest.trim().parse().map_err(|_| {
                    FamFluxError::Input(format!("bad max count '{}' in error model", rest.trim()))
                })?);
            } else if let Some(rest) = line.strip_prefix("cnt:") {
                deviations = rest
                    .split_whitespace()
                    .map(|t| {
                        t.parse().map_err(|_| {
                            FamFluxError::Input(format!("bad deviation '{}' in error model", t))
                        })
                    })
                    .collect::<FfResult<_>>()?;
            } else {
                let mut tokens = line.split_whitespace();
                let count: usize = tokens
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| {
                        FamFluxError::Input(format!("bad error model row '{}'", line))
                    })?;
                let row: Vec<f64> = tokens
                    .map(|t| {
                        t.parse().map_err(|_| {
                            FamFluxError::Input(format!("bad probability '{}' in error model", t))
                        })
                    })
                    .collect::<FfResult<_>>()?;
                declared.push((count, row));
            }
        }

        let max_count = max_count
            .ok_or_else(|| FamFluxError::Input("error model missing 'max:' line".into()))?;
        if deviations.is_empty() {
            return Err(FamFluxError::Input("error model missing 'cnt:' line".into()));
        }
        if !deviations.contains(&0) {
            return Err(FamFluxError::Input(
                "error model deviation set must contain 0".into(),
            ));
        }
        if declared.is_empty() {
            return Err(FamFluxError::Input("error model has no probability rows".into()));
        }
        declared.sort_by_key(|(count, _)| *count);
        for (count, row) in &declared {
            if row.len() != deviations.len() {
                return Err(FamFluxError::Input(format!(
                    "error model row {} has {} probabilities for {} deviations",
                    count,
                    row.len(),
                    deviations.len()
                )));
            }
        }

        let mut probs = Vec::with_capacity(max_count + 1);
        let mut current = declared[0].1.clone();
        let mut next = 0;
        for count in 0..=max_count {
            while next < declared.len() && declared[next].0 <= count {
                current = declared[next].1.clone();
                next += 1;
            }
            probs.push(current.clone());
        }

        Ok(ErrorModel {
            max_count,
            deviations,
            probs,
        })
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn deviations(&self) -> &[i64] {
        &self.deviations
    }

    pub fn probs(&self, count: usize) -> &[f64] {
        &self.probs[count.min(self.max_count)]
    }

    /// P(observed | true count). Deviations outside the declared set have
    /// zero probability.
    pub fn weight(&self, true_count: usize, observed: usize) -> f64 {
        let deviation = observed as i64 - true_count as i64;
        match self.deviations.iter().position(|&d| d == deviation) {
            Some(idx) => self.probs(true_count)[idx],
            None => 0.0,
        }
    }

    fn center_index(&self) -> usize {
        self.deviations.iter().position(|&d| d == 0).unwrap()
    }

    /// Distinct off-center probabilities, ascending. These are the free
    /// parameters the λ+ε optimizer perturbs.
    pub fn epsilons(&self) -> Vec<f64> {
        let center = self.center_index();
        let mut values: Vec<f64> = self
            .probs
            .iter()
            .flat_map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(i, _)| *i != center)
                    .map(|(_, p)| *p)
            })
            .filter(|p| *p > 0.0)
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup_by(|a, b| a.to_bits() == b.to_bits());
        values
    }

    /// Swap off-center probabilities per the replacement map and rebalance
    /// each center entry so rows stay probability vectors.
    pub fn replace_epsilons(&mut self, replacements: &HashMap<u64, f64>) {
        let center = self.center_index();
        for row in &mut self.probs {
            for (i, p) in row.iter_mut().enumerate() {
                if i == center {
                    continue;
                }
                if let Some(&new) = replacements.get(&p.to_bits()) {
                    *p = new;
                }
            }
            let off: f64 = row
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != center)
                .map(|(_, p)| *p)
                .sum();
            row[center] = 1.0 - off;
        }
    }

    /// Set every feasible off-center entry to `epsilon`. Deviations that
    /// would push a count below zero keep zero mass.
    pub fn update_single_epsilon(&mut self, epsilon: f64) {
        let center = self.center_index();
        let deviations = self.deviations.clone();
        for (count, row) in self.probs.iter_mut().enumerate() {
            for (i, p) in row.iter_mut().enumerate() {
                if i == center {
                    continue;
                }
                *p = if count as i64 + deviations[i] < 0 {
                    0.0
                } else {
                    epsilon
                };
            }
            let off: f64 = row
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != center)
                .map(|(_, p)| *p)
                .sum();
            row[center] = 1.0 - off;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "max: 2\ncnt: -1 0 1\n0 0.0 0.95 0.05\n1 0.05 0.9 0.05\n";

    #[test]
    fn parses_rows_and_inherits_downward() {
        let em = ErrorModel::from_reader(MODEL.as_bytes()).unwrap();
        assert_eq!(em.max_count(), 2);
        assert_eq!(em.deviations(), &[-1, 0, 1]);
        assert_eq!(em.probs(0), &[0.0, 0.95, 0.05]);
        assert_eq!(em.probs(1), &[0.05, 0.9, 0.05]);
        // no row for 2: inherits row 1
        assert_eq!(em.probs(2), &[0.05, 0.9, 0.05]);
    }

    #[test]
    fn weight_maps_deviations() {
        let em = ErrorModel::from_reader(MODEL.as_bytes()).unwrap();
        assert!((em.weight(1, 0) - 0.05).abs() < 1e-12);
        assert!((em.weight(1, 1) - 0.9).abs() < 1e-12);
        assert!((em.weight(1, 2) - 0.05).abs() < 1e-12);
        assert_eq!(em.weight(1, 3), 0.0);
    }

    fn assert_row(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn single_epsilon_rebalances_centers() {
        let mut em = ErrorModel::from_reader(MODEL.as_bytes()).unwrap();
        em.update_single_epsilon(0.1);
        assert_row(em.probs(0), &[0.0, 0.9, 0.1]);
        assert_row(em.probs(1), &[0.1, 0.8, 0.1]);
        for count in 0..=2 {
            let sum: f64 = em.probs(count).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn replace_epsilons_swaps_matching_values() {
        let mut em = ErrorModel::from_reader(MODEL.as_bytes()).unwrap();
        let old = em.epsilons();
        assert_eq!(old, vec![0.05]);
        let replacements = HashMap::from([(0.05f64.to_bits(), 0.2)]);
        em.replace_epsilons(&replacements);
        assert_row(em.probs(1), &[0.2, 0.6, 0.2]);
        assert_eq!(em.epsilons(), vec![0.2]);
    }
}
