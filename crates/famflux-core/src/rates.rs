//! Birth-death rate: one global value, or a vector indexed by the rate
//! indices a rate tree assigns to each branch.

use std::fmt;

use crate::tree::Tree;

#[derive(Debug, Clone, PartialEq)]
pub enum Rate {
    Single(f64),
    ByIndex(Vec<f64>),
}

impl Rate {
    pub fn count(&self) -> usize {
        match self {
            Rate::Single(_) => 1,
            Rate::ByIndex(values) => values.len(),
        }
    }

    /// Rate on the branch above `node`. A tree without rate indices maps
    /// everything to index 0.
    pub fn value_for(&self, tree: &Tree, node: usize) -> f64 {
        match self {
            Rate::Single(value) => *value,
            Rate::ByIndex(values) => values[tree.lambda_index(node).unwrap_or(0)],
        }
    }

    pub fn update(&mut self, values: &[f64]) {
        match self {
            Rate::Single(value) => *value = values[0],
            Rate::ByIndex(slots) => {
                for (slot, v) in slots.iter_mut().zip(values) {
                    *slot = *v;
                }
            }
        }
    }

    pub fn multiply(&self, factor: f64) -> Rate {
        match self {
            Rate::Single(value) => Rate::Single(value * factor),
            Rate::ByIndex(values) => Rate::ByIndex(values.iter().map(|v| v * factor).collect()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.values().iter().all(|v| v.is_finite() && *v >= 0.0)
    }

    pub fn values(&self) -> Vec<f64> {
        match self {
            Rate::Single(value) => vec![*value],
            Rate::ByIndex(values) => values.clone(),
        }
    }

    pub fn distinct_values(&self) -> Vec<f64> {
        let mut values = self.values();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup_by(|a, b| a.to_bits() == b.to_bits());
        values
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values();
        let joined = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_index_rates_follow_the_rate_tree() {
        let mut tree = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);", false).unwrap();
        let rate_tree = Tree::from_newick("((A:1,B:1):1,(C:2,D:2):2);", true).unwrap();
        tree.apply_rate_indices(&rate_tree).unwrap();

        let rate = Rate::ByIndex(vec![0.01, 0.05]);
        assert_eq!(rate.value_for(&tree, tree.find("A").unwrap()), 0.01);
        assert_eq!(rate.value_for(&tree, tree.find("D").unwrap()), 0.05);
        assert_eq!(rate.value_for(&tree, tree.find("CD").unwrap()), 0.05);
    }

    #[test]
    fn multiply_scales_every_entry() {
        let rate = Rate::ByIndex(vec![0.5, 1.0]);
        assert_eq!(rate.multiply(2.0), Rate::ByIndex(vec![1.0, 2.0]));
        assert!(rate.is_valid());
        assert!(!Rate::Single(-1.0).is_valid());
        assert!(!Rate::Single(f64::NAN).is_valid());
    }

    #[test]
    fn distinct_values_dedups() {
        let rate = Rate::ByIndex(vec![0.5, 0.5, 0.2]);
        assert_eq!(rate.distinct_values(), vec![0.2, 0.5]);
    }
}
