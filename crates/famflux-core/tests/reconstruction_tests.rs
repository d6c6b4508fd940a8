mod common;

use common::{family, four_taxon_tree, precalculated_cache};

use famflux_core::model::{BaseModel, ModelData};
use famflux_core::prior::RootPrior;
use famflux_core::rates::Rate;
use famflux_core::reconstruct::{reconstruct_family, SizeChange};

#[test]
fn model_reconstruction_covers_every_family_and_node() {
    let tree = four_taxon_tree();
    let families = vec![
        family("F1", &[("A", 5), ("B", 10), ("C", 2), ("D", 6)]),
        family("F2", &[("A", 3), ("B", 3), ("C", 3), ("D", 3)]),
    ];
    let data = ModelData::new(
        &tree,
        &families,
        Rate::Single(0.02),
        None,
        RootPrior::Uniform { max_root: 30 },
    );
    let model = BaseModel::new(data);
    let recs = model.reconstruct().unwrap();

    assert_eq!(recs.len(), 2);
    for (rec, fam) in recs.iter().zip(&families) {
        assert_eq!(rec.sizes.len(), tree.len());
        // Leaves keep their observed counts.
        for leaf in tree.leaves() {
            assert_eq!(rec.sizes[leaf], fam.count(tree.name(leaf)).unwrap());
        }
        // Interior reconstructions are bracketed by the observed range.
        let max = fam.max_count();
        for id in tree.interior_nodes() {
            assert!(rec.sizes[id] <= max + 5, "node {} got {}", tree.name(id), rec.sizes[id]);
            assert!(rec.sizes[id] >= 1);
        }
    }
}

#[test]
fn flat_family_reconstructs_constant_everywhere() {
    let tree = four_taxon_tree();
    let fam = family("flat", &[("A", 7), ("B", 7), ("C", 7), ("D", 7)]);
    let rate = Rate::Single(0.01);
    let cache = precalculated_cache(&tree, &rate, fam.max_family_size());
    let rec = reconstruct_family(
        &fam,
        &tree,
        &rate,
        &cache,
        &RootPrior::Uniform { max_root: 30 },
        fam.max_family_size(),
        30,
    )
    .unwrap();

    for id in tree.interior_nodes() {
        assert_eq!(rec.sizes[id], 7);
    }
    let labelled: Vec<_> = rec.changes.iter().flatten().collect();
    assert_eq!(labelled.len(), 2); // AB and CD
    assert!(labelled.iter().all(|&&c| c == SizeChange::Constant));
}

#[test]
fn lopsided_family_shows_opposite_changes() {
    let tree = four_taxon_tree();
    let fam = family("skew", &[("A", 14), ("B", 14), ("C", 2), ("D", 2)]);
    let rate = Rate::Single(0.05);
    let cache = precalculated_cache(&tree, &rate, fam.max_family_size());
    let rec = reconstruct_family(
        &fam,
        &tree,
        &rate,
        &cache,
        &RootPrior::Uniform { max_root: 30 },
        fam.max_family_size(),
        30,
    )
    .unwrap();

    let ab = tree.find("AB").unwrap();
    let cd = tree.find("CD").unwrap();
    assert_eq!(rec.changes[ab], Some(SizeChange::Increase));
    assert_eq!(rec.changes[cd], Some(SizeChange::Decrease));
}
