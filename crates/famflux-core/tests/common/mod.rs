#![allow(dead_code)]

use famflux_core::cache::MatrixCache;
use famflux_core::family::GeneFamily;
use famflux_core::rates::Rate;
use famflux_core::tree::Tree;

/// `((A:1,B:1):1,(C:1,D:1):1);`
pub fn four_taxon_tree() -> Tree {
    Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);", false).unwrap()
}

/// `(A:1,B:1);`
pub fn two_taxon_tree() -> Tree {
    Tree::from_newick("(A:1,B:1);", false).unwrap()
}

pub fn family(id: &str, counts: &[(&str, usize)]) -> GeneFamily {
    let mut fam = GeneFamily::new(id, "");
    for (species, count) in counts {
        fam.set_count(species, *count);
    }
    fam
}

/// The canonical test family {A:5, B:10, C:2, D:6}.
pub fn canonical_family(id: &str) -> GeneFamily {
    family(id, &[("A", 5), ("B", 10), ("C", 2), ("D", 6)])
}

pub fn precalculated_cache(tree: &Tree, rate: &Rate, max_family_size: usize) -> MatrixCache {
    let mut cache = MatrixCache::new(max_family_size);
    cache.precalculate(&rate.distinct_values(), &tree.branch_lengths());
    cache
}
