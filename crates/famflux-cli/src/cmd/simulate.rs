//! Forward-simulate synthetic families and write them in the row form the
//! family reader accepts back.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use famflux_core::cache::MatrixCache;
use famflux_core::errmodel::ErrorModel;
use famflux_core::error::{FamFluxError, FfResult};
use famflux_core::prior::RootDistribution;
use famflux_core::rates::Rate;
use famflux_core::simulate::simulate_family;
use famflux_core::tree::Tree;

use crate::reports;

pub struct SimulateArgs<'a> {
    pub tree: &'a Tree,
    pub rate: &'a Rate,
    pub rate_fixed: bool,
    pub n_families: usize,
    pub root_dist: RootDistribution,
    pub error_model: Option<&'a ErrorModel>,
    pub output: &'a Path,
    pub rng: &'a mut fastrand::Rng,
}

pub fn run(args: SimulateArgs) -> FfResult<()> {
    if !args.rate_fixed || !args.rate.is_valid() {
        return Err(FamFluxError::Input(
            "simulation needs a valid fixed rate".into(),
        ));
    }
    for &t in &args.tree.branch_lengths() {
        for &lambda in &args.rate.distinct_values() {
            if MatrixCache::is_saturated(t, lambda) {
                return Err(FamFluxError::Input(format!(
                    "branch {} at rate {} saturates the birth-death model",
                    t, lambda
                )));
            }
        }
    }

    info!("simulating {} families", args.n_families);
    let max_size = (args.root_dist.max() * 2).max(60);
    let mut cache = MatrixCache::new(max_size);

    reports::create_output_dir(args.output)?;
    let path = reports::filename(args.output, "simulation");
    let mut out = BufWriter::new(File::create(&path)?);

    let order = args.tree.prefix_order();
    for &(node, _) in &order {
        writeln!(out, "#{}", args.tree.name(node))?;
    }

    for t in 0..args.n_families {
        let root_size = args.root_dist.select_randomly(args.rng);
        let sizes = simulate_family(
            args.tree,
            args.rate,
            root_size,
            &mut cache,
            args.error_model,
            args.rng,
        )?;
        let mut row: Vec<String> = order
            .iter()
            .map(|&(node, _)| sizes[node].to_string())
            .collect();
        row.push((t + 1).to_string());
        writeln!(out, "{}", row.join("\t"))?;
    }

    info!("wrote {}", path.display());
    Ok(())
}
