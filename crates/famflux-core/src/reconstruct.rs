//! Joint ancestral-state reconstruction (Pupko).
//!
//! Upward pass: for every non-root node and every possible parent size i,
//! store the best achievable value and the child size that achieves it.
//! The root picks its own best size under the prior, and a pre-order
//! backtrack reads the ancestral counts off the argmax tables.

use std::fmt;

use tracing::warn;

use crate::cache::MatrixCache;
use crate::error::FfResult;
use crate::family::GeneFamily;
use crate::prior::RootPrior;
use crate::rates::Rate;
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeChange {
    Increase,
    Decrease,
    Constant,
}

impl fmt::Display for SizeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            SizeChange::Increase => 'i',
            SizeChange::Decrease => 'd',
            SizeChange::Constant => 'c',
        };
        write!(f, "{}", c)
    }
}

#[derive(Debug, Clone)]
pub struct FamilyReconstruction {
    pub family_id: String,
    /// Reconstructed (or, at leaves, observed) count per arena node.
    pub sizes: Vec<usize>,
    /// Change against the parent; `Some` only for interior non-root nodes.
    pub changes: Vec<Option<SizeChange>>,
    /// Per-category reconstructions in gamma mode, empty otherwise.
    pub category_sizes: Vec<Vec<usize>>,
}

struct UpwardTables {
    values: Vec<Vec<f64>>,
    argmax: Vec<Vec<usize>>,
}

fn upward_pass(
    family: &GeneFamily,
    tree: &Tree,
    rate: &Rate,
    cache: &MatrixCache,
    max_family_size: usize,
) -> FfResult<UpwardTables> {
    let width = max_family_size + 1;
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); tree.len()];
    let mut argmax: Vec<Vec<usize>> = vec![Vec::new(); tree.len()];

    for node in tree.reverse_level_order() {
        if tree.is_root(node) {
            continue;
        }
        let matrix = cache.get(tree.branch_length(node), rate.value_for(tree, node))?;
        let mut l = vec![0.0; width];
        let mut c = vec![0usize; width];

        if tree.is_leaf(node) {
            let observed = family.count(tree.name(node))?;
            for i in 0..width {
                l[i] = matrix.get(i, observed);
                c[i] = observed;
            }
        } else {
            // Product over children of their best-value tables, indexed by
            // this node's candidate size.
            let mut product = vec![1.0; width];
            for &child in tree.children(node) {
                for (p, v) in product.iter_mut().zip(&values[child]) {
                    *p *= v;
                }
            }
            for i in 0..width {
                let mut best = -1.0;
                let mut best_j = 0;
                for (j, p) in product.iter().enumerate() {
                    let value = matrix.get(i, j) * p;
                    if value > best {
                        best = value;
                        best_j = j;
                    }
                }
                l[i] = best;
                c[i] = best_j;
            }
        }

        values[node] = l;
        argmax[node] = c;
    }

    Ok(UpwardTables { values, argmax })
}

fn root_pick(
    tree: &Tree,
    tables: &UpwardTables,
    prior: &RootPrior,
    max_family_size: usize,
    max_root_family_size: usize,
) -> Option<usize> {
    let width = max_family_size + 1;
    let mut product = vec![1.0; width];
    for &child in tree.children(tree.root()) {
        for (p, v) in product.iter_mut().zip(&tables.values[child]) {
            *p *= v;
        }
    }

    let mut best = 0.0;
    let mut best_j = None;
    for (j, p) in product
        .iter()
        .enumerate()
        .take(max_root_family_size + 1)
        .skip(1)
    {
        let value = p * prior.compute(j);
        if value > best {
            best = value;
            best_j = Some(j);
        }
    }
    best_j
}

/// Reconstruct one family under a single effective rate. When the root
/// value underflows to zero everywhere, a warning is logged and the
/// reconstruction comes back all zeros.
pub fn reconstruct_family(
    family: &GeneFamily,
    tree: &Tree,
    rate: &Rate,
    cache: &MatrixCache,
    prior: &RootPrior,
    max_family_size: usize,
    max_root_family_size: usize,
) -> FfResult<FamilyReconstruction> {
    let sizes = reconstruct_sizes(
        family,
        tree,
        rate,
        cache,
        prior,
        max_family_size,
        max_root_family_size,
    )?;
    let changes = change_labels(tree, &sizes);
    Ok(FamilyReconstruction {
        family_id: family.id().to_string(),
        sizes,
        changes,
        category_sizes: Vec::new(),
    })
}

fn reconstruct_sizes(
    family: &GeneFamily,
    tree: &Tree,
    rate: &Rate,
    cache: &MatrixCache,
    prior: &RootPrior,
    max_family_size: usize,
    max_root_family_size: usize,
) -> FfResult<Vec<usize>> {
    let tables = upward_pass(family, tree, rate, cache, max_family_size)?;
    let root_size = root_pick(tree, &tables, prior, max_family_size, max_root_family_size);

    let mut sizes = vec![0usize; tree.len()];
    match root_size {
        None => {
            warn!(
                "failed to calculate a root value for family {}; reconstruction left empty",
                family.id()
            );
        }
        Some(root_size) => {
            sizes[tree.root()] = root_size;
            for (node, _) in tree.prefix_order() {
                if tree.is_root(node) {
                    continue;
                }
                let parent_size = sizes[tree.parent(node).expect("non-root")];
                sizes[node] = if tree.is_leaf(node) {
                    family.count(tree.name(node))?
                } else {
                    tables.argmax[node][parent_size]
                };
            }
        }
    }
    Ok(sizes)
}

fn change_labels(tree: &Tree, sizes: &[usize]) -> Vec<Option<SizeChange>> {
    (0..tree.len())
        .map(|node| {
            if tree.is_root(node) || tree.is_leaf(node) {
                return None;
            }
            let parent_size = sizes[tree.parent(node).expect("non-root")];
            Some(match sizes[node].cmp(&parent_size) {
                std::cmp::Ordering::Greater => SizeChange::Increase,
                std::cmp::Ordering::Less => SizeChange::Decrease,
                std::cmp::Ordering::Equal => SizeChange::Constant,
            })
        })
        .collect()
}

/// Gamma-mode reconstruction: one pass per category, averaged with the
/// uniform category weight and rounded.
#[allow(clippy::too_many_arguments)]
pub fn reconstruct_family_gamma(
    family: &GeneFamily,
    tree: &Tree,
    rate: &Rate,
    multipliers: &[f64],
    cache: &MatrixCache,
    prior: &RootPrior,
    max_family_size: usize,
    max_root_family_size: usize,
) -> FfResult<FamilyReconstruction> {
    let weight = 1.0 / multipliers.len() as f64;
    let mut category_sizes = Vec::with_capacity(multipliers.len());
    for &multiplier in multipliers {
        let scaled = rate.multiply(multiplier);
        category_sizes.push(reconstruct_sizes(
            family,
            tree,
            &scaled,
            cache,
            prior,
            max_family_size,
            max_root_family_size,
        )?);
    }

    let sizes: Vec<usize> = (0..tree.len())
        .map(|node| {
            if tree.is_leaf(node) {
                return category_sizes[0][node];
            }
            let mean: f64 = category_sizes
                .iter()
                .map(|sizes| sizes[node] as f64 * weight)
                .sum();
            mean.round() as usize
        })
        .collect();
    let changes = change_labels(tree, &sizes);

    Ok(FamilyReconstruction {
        family_id: family.id().to_string(),
        sizes,
        changes,
        category_sizes,
    })
}
