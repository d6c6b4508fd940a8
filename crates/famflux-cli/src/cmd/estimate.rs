//! Fit the model, then report likelihoods, p-values and ancestral states.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{error, info};

use famflux_core::config::SearchParams;
use famflux_core::errmodel::ErrorModel;
use famflux_core::error::{FamFluxError, FfResult};
use famflux_core::family::GeneFamily;
use famflux_core::model::{BaseModel, GammaModel, ModelData};
use famflux_core::optimizer::scorer::{
    EpsilonModel, GammaScorer, LambdaEpsilonScorer, LambdaGammaScorer, LambdaScorer, RateModel,
};
use famflux_core::optimizer::{
    initialization_failure_advice, Optimizer, OptimizerResult, Scorer, SimplexOptions, Strategy,
};
use famflux_core::prior::RootPrior;
use famflux_core::rates::Rate;
use famflux_core::simulate::compute_pvalues;
use famflux_core::tree::Tree;

use crate::reports;

/// Epsilon seeds tried when an error model is being fitted alongside the
/// rate.
const EPSILON_GRID: [f64; 5] = [0.05, 0.15, 0.25, 0.35, 0.45];

pub struct EstimateArgs<'a> {
    pub tree: &'a Tree,
    pub families: &'a [GeneFamily],
    pub rate: Rate,
    pub rate_fixed: bool,
    pub n_cats: usize,
    pub alpha: Option<f64>,
    pub error_model: Option<ErrorModel>,
    pub prior: RootPrior,
    pub output: &'a Path,
    pub strategy: Strategy,
    pub params: SearchParams,
    pub lambda_per_family: bool,
    pub rng: &'a mut fastrand::Rng,
}

pub fn run(args: EstimateArgs) -> FfResult<()> {
    reports::create_output_dir(args.output)?;
    if args.lambda_per_family {
        lambda_per_family(args)
    } else if args.n_cats > 1 {
        run_gamma(args)
    } else {
        run_base(args)
    }
}

fn fit<S: Scorer>(
    scorer: &mut S,
    strategy: Strategy,
    options: SimplexOptions,
    rng: &mut fastrand::Rng,
    families: &[GeneFamily],
) -> FfResult<OptimizerResult> {
    match Optimizer::new(scorer, strategy, options).optimize(rng) {
        Ok(result) => {
            info!(
                "completed {} iterations in {:.1?}, best -lnL {:.6}",
                result.iterations, result.duration, result.score
            );
            Ok(result)
        }
        Err(e @ FamFluxError::OptimizerInitialization(_)) => {
            error!("{}", initialization_failure_advice(families));
            Err(e)
        }
        Err(e) => Err(e),
    }
}

fn run_base(args: EstimateArgs) -> FfResult<()> {
    let data = ModelData::new(
        args.tree,
        args.families,
        args.rate.clone(),
        args.error_model,
        args.prior,
    );
    let mut model = BaseModel::new(data);
    let longest = args.tree.longest_branch();
    let options = SimplexOptions::from(&args.params);

    let mut fitted_epsilon = None;
    if !args.rate_fixed {
        if model.data.error_model.is_some() {
            // Re-run the search from several epsilon seeds and keep the
            // best fit.
            let mut best: Option<OptimizerResult> = None;
            for epsilon in EPSILON_GRID {
                info!("fitting with epsilon seed {}", epsilon);
                model.update_epsilon(epsilon);
                let mut scorer = LambdaEpsilonScorer::new(&mut model, longest);
                let result = fit(&mut scorer, args.strategy, options, args.rng, args.families)?;
                if best.as_ref().map_or(true, |b| result.score < b.score) {
                    best = Some(result);
                }
            }
            let best = best.expect("grid is non-empty");
            let n = model.rate_count();
            model.update_rate(&best.values[..n]);
            model.update_epsilon(best.values[n]);
            fitted_epsilon = Some(best.values[n]);
        } else {
            let mut scorer = LambdaScorer::new(&mut model, longest);
            fit(&mut scorer, args.strategy, options, args.rng, args.families)?;
        }
    }

    let score = model.score();
    if !score.is_finite() {
        return Err(FamFluxError::Input(
            "the model likelihood is not finite at the final parameter values".into(),
        ));
    }
    info!("final -lnL: {:.6}, rate: {}", score, model.data.rate);

    reports::write_results(
        args.output,
        model.name(),
        score,
        &model.data.rate,
        None,
        fitted_epsilon,
        args.tree,
    )?;
    reports::write_family_likelihoods(args.output, &model.stash, false)?;

    let reconstructions = model.reconstruct()?;
    let pvalues = compute_pvalues(
        args.tree,
        args.families,
        &model.data.rate,
        model.data.max_family_size,
        model.data.max_root_family_size,
        args.params.pvalue_sims,
        args.rng,
    )?;
    reports::write_asr(args.output, model.name(), args.tree, &reconstructions)?;
    reports::write_family_results(
        args.output,
        model.name(),
        args.tree,
        &reconstructions,
        &pvalues,
    )?;
    reports::write_clade_results(args.output, model.name(), args.tree, &reconstructions)?;
    reports::print_summary(model.name(), score, &model.data.rate, None, fitted_epsilon);
    Ok(())
}

fn run_gamma(args: EstimateArgs) -> FfResult<()> {
    let data = ModelData::new(
        args.tree,
        args.families,
        args.rate.clone(),
        args.error_model,
        args.prior,
    );
    let mut model = GammaModel::new(data, args.n_cats, args.alpha.unwrap_or(1.0))?;
    let longest = args.tree.longest_branch();
    let options = SimplexOptions::from(&args.params);

    match (args.rate_fixed, args.alpha.is_some()) {
        (false, false) => {
            let mut scorer = LambdaGammaScorer::new(&mut model, longest);
            fit(&mut scorer, args.strategy, options, args.rng, args.families)?;
        }
        (false, true) => {
            let mut scorer = LambdaScorer::new(&mut model, longest);
            fit(&mut scorer, args.strategy, options, args.rng, args.families)?;
        }
        (true, false) => {
            let mut scorer = GammaScorer::new(&mut model);
            fit(&mut scorer, args.strategy, options, args.rng, args.families)?;
        }
        (true, true) => {}
    }

    let score = model.score();
    if !score.is_finite() {
        return Err(FamFluxError::Input(
            "the model likelihood is not finite at the final parameter values".into(),
        ));
    }
    info!(
        "final -lnL: {:.6}, rate: {}, alpha: {:.6}",
        score,
        model.data.rate,
        model.alpha()
    );

    reports::write_results(
        args.output,
        model.name(),
        score,
        &model.data.rate,
        Some(model.alpha()),
        None,
        args.tree,
    )?;
    reports::write_family_likelihoods(args.output, &model.stash, true)?;

    let reconstructions = model.reconstruct()?;
    // P-values use the fitted base rate; the category multipliers only
    // redistribute it across families.
    let pvalues = compute_pvalues(
        args.tree,
        args.families,
        &model.data.rate,
        model.data.max_family_size,
        model.data.max_root_family_size,
        args.params.pvalue_sims,
        args.rng,
    )?;
    reports::write_asr(args.output, model.name(), args.tree, &reconstructions)?;
    reports::write_family_results(
        args.output,
        model.name(),
        args.tree,
        &reconstructions,
        &pvalues,
    )?;
    reports::write_clade_results(args.output, model.name(), args.tree, &reconstructions)?;
    reports::print_summary(
        model.name(),
        score,
        &model.data.rate,
        Some(model.alpha()),
        None,
    );
    Ok(())
}

fn lambda_per_family(args: EstimateArgs) -> FfResult<()> {
    let longest = args.tree.longest_branch();
    let options = SimplexOptions::from(&args.params);
    let path = reports::filename(args.output, "base_lambda_per_family");
    let mut out = BufWriter::new(File::create(&path)?);

    for family in args.families {
        info!("estimating rate for {}", family.id());
        let single = std::slice::from_ref(family);
        let data = ModelData::new(
            args.tree,
            single,
            args.rate.clone(),
            args.error_model.clone(),
            args.prior.clone(),
        );
        let mut model = BaseModel::new(data);
        let mut scorer = LambdaScorer::new(&mut model, longest);
        fit(&mut scorer, args.strategy, options, args.rng, single)?;
        writeln!(out, "{}\t{}", family.id(), model.data.rate)?;
    }

    info!("wrote {}", path.display());
    Ok(())
}
