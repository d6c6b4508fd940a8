//! Felsenstein pruning under the birth-death model.
//!
//! Each node carries a conditional-likelihood vector indexed by its own
//! size: `L[s] = P(observed counts below the node | node has size s)`. A
//! parent folds each child through that child's branch matrix and takes
//! the product over children. Tip vectors are indicators at the observed
//! count, or the observation-error kernel when an error model is active
//! (the broadening happens after the branch matrix by construction).

use crate::cache::MatrixCache;
use crate::errmodel::ErrorModel;
use crate::error::FfResult;
use crate::family::GeneFamily;
use crate::prior::RootPrior;
use crate::rates::Rate;
use crate::tree::Tree;

/// Partial likelihoods at the root for one family:
/// `result[s] = P(tip counts | root size s)` for `s` in `0..=max_root`.
pub fn prune(
    family: &GeneFamily,
    tree: &Tree,
    rate: &Rate,
    cache: &MatrixCache,
    error_model: Option<&ErrorModel>,
    max_family_size: usize,
    max_root_family_size: usize,
) -> FfResult<Vec<f64>> {
    let width = max_family_size + 1;
    let mut partials: Vec<Option<Vec<f64>>> = vec![None; tree.len()];

    for node in tree.reverse_level_order() {
        if tree.is_leaf(node) {
            let observed = family.count(tree.name(node))?;
            let mut leaf = vec![0.0; width];
            match error_model {
                Some(em) => {
                    for (true_count, slot) in leaf.iter_mut().enumerate() {
                        *slot = em.weight(true_count, observed);
                    }
                }
                None => leaf[observed] = 1.0,
            }
            partials[node] = Some(leaf);
        } else {
            let mut combined = vec![1.0; width];
            for &child in tree.children(node) {
                let matrix = cache.get(
                    tree.branch_length(child),
                    rate.value_for(tree, child),
                )?;
                let child_partial = partials[child].as_ref().expect("children visited first");
                let factor = matrix.multiply(child_partial);
                for (slot, f) in combined.iter_mut().zip(&factor) {
                    *slot *= f;
                }
            }
            partials[node] = Some(combined);
        }
    }

    let mut root = partials[tree.root()].take().expect("root visited last");
    root.truncate(max_root_family_size + 1);
    Ok(root)
}

/// Full family log-likelihood: the best root size under the prior,
/// `max_s ( ln L[s] + ln π(s) )` over `s` in `1..=max_root`.
/// `None` when the whole root vector has underflowed to zero.
pub fn family_log_likelihood(root_partials: &[f64], prior: &RootPrior) -> Option<f64> {
    let best = (1..root_partials.len())
        .map(|s| root_partials[s].ln() + prior.compute(s).ln())
        .fold(f64::NEG_INFINITY, f64::max);
    best.is_finite().then_some(best)
}
