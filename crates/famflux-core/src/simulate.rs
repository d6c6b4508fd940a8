//! Forward simulation under the birth-death model and the Monte-Carlo
//! null used for per-family p-values.

use rayon::prelude::*;

use crate::cache::MatrixCache;
use crate::errmodel::ErrorModel;
use crate::error::{FamFluxError, FfResult};
use crate::family::GeneFamily;
use crate::pruning::prune;
use crate::rates::Rate;
use crate::tree::Tree;

/// Walk the tree root-to-tips, drawing each child size from the cumulative
/// transition row of its parent size. Returns the realized size per arena
/// node. With an error model, leaf counts are additionally perturbed by the
/// observation kernel; a leaf outside the kernel's support rejects the
/// trial.
pub fn simulate_family(
    tree: &Tree,
    rate: &Rate,
    root_size: usize,
    cache: &mut MatrixCache,
    error_model: Option<&ErrorModel>,
    rng: &mut fastrand::Rng,
) -> FfResult<Vec<usize>> {
    let max_size = cache.max_size();
    let mut sizes = vec![0usize; tree.len()];
    sizes[tree.root()] = root_size;

    for (node, _) in tree.prefix_order() {
        if tree.is_root(node) {
            continue;
        }
        let parent_size = sizes[tree.parent(node).expect("non-root")];
        let mut size = 0;
        if parent_size > 0 {
            let matrix = cache.get_or_insert(
                tree.branch_length(node),
                rate.value_for(tree, node),
            );
            let draw = rng.f64();
            let mut cumulative = 0.0;
            let row = matrix.row(parent_size);
            while size < max_size - 1 {
                cumulative += row[size];
                if cumulative >= draw {
                    break;
                }
                size += 1;
            }
        }

        if tree.is_leaf(node) {
            if let Some(em) = error_model {
                if size >= em.max_count() {
                    return Err(FamFluxError::Input(format!(
                        "simulated family size {} exceeds the error model's support ({})",
                        size,
                        em.max_count()
                    )));
                }
                let draw = rng.f64();
                let mut cumulative = 0.0;
                for (probability, deviation) in em.probs(size).iter().zip(em.deviations()) {
                    cumulative += probability;
                    if cumulative >= draw {
                        size = (size as i64 + deviation).max(0) as usize;
                        break;
                    }
                }
            }
        }

        sizes[node] = size;
    }

    Ok(sizes)
}

fn family_from_sizes(tree: &Tree, sizes: &[usize], id: &str) -> GeneFamily {
    let mut fam = GeneFamily::new(id, "");
    for leaf in tree.leaves() {
        fam.set_count(tree.name(leaf), sizes[leaf]);
    }
    fam
}

/// Best root-conditioned likelihood of a tip configuration: the maximum of
/// the pruned root vector over sizes `1..=max_root`, in log space.
fn max_log_likelihood(
    family: &GeneFamily,
    tree: &Tree,
    rate: &Rate,
    cache: &MatrixCache,
    max_family_size: usize,
    max_root_family_size: usize,
) -> FfResult<(usize, f64)> {
    let root = prune(
        family,
        tree,
        rate,
        cache,
        None,
        max_family_size,
        max_root_family_size,
    )?;
    let mut best = 0.0;
    let mut best_size = 1;
    for (s, p) in root.iter().enumerate().skip(1) {
        if *p > best {
            best = *p;
            best_size = s;
        }
    }
    Ok((best_size, best.ln()))
}

/// For every root size, the distribution of best log-likelihoods across
/// `n_sims` null simulations at the fitted rate.
pub fn conditional_distribution(
    tree: &Tree,
    rate: &Rate,
    max_family_size: usize,
    max_root_family_size: usize,
    n_sims: usize,
    rng: &mut fastrand::Rng,
) -> FfResult<Vec<Vec<f64>>> {
    let seeds: Vec<u64> = (1..=max_root_family_size).map(|_| rng.u64(..)).collect();
    seeds
        .into_par_iter()
        .enumerate()
        .map(|(i, seed)| {
            let root_size = i + 1;
            let mut rng = fastrand::Rng::with_seed(seed);
            let mut cache = MatrixCache::new(max_family_size);
            cache.precalculate(&rate.distinct_values(), &tree.branch_lengths());
            let mut samples = Vec::with_capacity(n_sims);
            for t in 0..n_sims {
                let sizes = simulate_family(tree, rate, root_size, &mut cache, None, &mut rng)?;
                let fam = family_from_sizes(tree, &sizes, &format!("sim{}", t));
                let (_, logl) = max_log_likelihood(
                    &fam,
                    tree,
                    rate,
                    &cache,
                    max_family_size,
                    max_root_family_size,
                )?;
                samples.push(logl);
            }
            Ok(samples)
        })
        .collect()
}

/// Empirical p-value per family: the share of null simulations at the
/// family's maximum-likelihood root size whose log-likelihood is at least
/// the observed one.
pub fn compute_pvalues(
    tree: &Tree,
    families: &[GeneFamily],
    rate: &Rate,
    max_family_size: usize,
    max_root_family_size: usize,
    n_sims: usize,
    rng: &mut fastrand::Rng,
) -> FfResult<Vec<f64>> {
    let conditional = conditional_distribution(
        tree,
        rate,
        max_family_size,
        max_root_family_size,
        n_sims,
        rng,
    )?;

    let mut cache = MatrixCache::new(max_family_size);
    cache.precalculate(&rate.distinct_values(), &tree.branch_lengths());

    families
        .par_iter()
        .map(|family| {
            let (best_size, observed) = max_log_likelihood(
                family,
                tree,
                rate,
                &cache,
                max_family_size,
                max_root_family_size,
            )?;
            let samples = &conditional[best_size - 1];
            let at_least = samples.iter().filter(|&&s| s >= observed).count();
            Ok(at_least as f64 / samples.len() as f64)
        })
        .collect()
}
