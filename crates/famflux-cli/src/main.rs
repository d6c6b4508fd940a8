use std::fs::File;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, warn};

use famflux_core::config::SearchParams;
use famflux_core::errmodel::ErrorModel;
use famflux_core::error::{FamFluxError, FfResult};
use famflux_core::family::{read_gene_families, read_root_distribution, GeneFamily};
use famflux_core::optimizer::Strategy;
use famflux_core::prior::{estimate_poisson_rate, RootDistribution, RootPrior};
use famflux_core::rates::Rate;
use famflux_core::tree::Tree;
use famflux_core::DEFAULT_SEED;

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(
    name = "famflux",
    version,
    about = "Gene-family size evolution under a birth-death model"
)]
struct Cli {
    /// Species tree (Newick)
    #[arg(short = 't', long = "tree")]
    tree: Option<PathBuf>,

    /// Gene family counts (tab separated)
    #[arg(short = 'i', long = "infile")]
    families: Option<PathBuf>,

    /// Per-tip observation-error model
    #[arg(short = 'e', long = "error-model")]
    error_model: Option<PathBuf>,

    /// Rate tree assigning a rate index to each branch (Newick)
    #[arg(short = 'y', long = "rate-tree")]
    rate_tree: Option<PathBuf>,

    /// Fix a single birth-death rate instead of estimating it
    #[arg(short = 'l', long = "lambda")]
    fixed_lambda: Option<f64>,

    /// Fix one rate per rate-tree index (comma separated)
    #[arg(short = 'm', long = "lambdas", value_delimiter = ',')]
    fixed_lambdas: Vec<f64>,

    /// Number of gamma rate categories
    #[arg(short = 'k', long = "gamma-cats", default_value_t = 1)]
    gamma_cats: usize,

    /// Fix the gamma shape instead of estimating it
    #[arg(short = 'a', long = "alpha")]
    alpha: Option<f64>,

    /// Poisson root prior; estimates the Poisson rate from the data when no
    /// value is given
    #[arg(short = 'p', long = "poisson", num_args = 0..=1)]
    poisson: Option<Option<f64>>,

    /// Root size distribution file (size<TAB>count lines)
    #[arg(short = 'f', long = "rootdist")]
    root_dist: Option<PathBuf>,

    /// Simulate families; count defaults to the root distribution's total
    #[arg(short = 's', long = "simulate", num_args = 0..=1)]
    simulate: Option<Option<usize>>,

    /// Output directory
    #[arg(short = 'o', long = "output", default_value = "results")]
    output: PathBuf,

    /// Estimate a separate rate for every family
    #[arg(short = 'b', long = "lambda-per-family", default_value_t = false)]
    lambda_per_family: bool,

    /// Drop families whose parsimony reconstruction is absent at the root
    #[arg(short = 'x', long = "exclude-absent", default_value_t = false)]
    exclude_absent: bool,

    /// Chi-squared likelihood-ratio test over two log-likelihoods: a,b,df
    #[arg(short = 'r', long = "lrt")]
    chisquare: Option<String>,

    /// RNG seed (runs are reproducible by default)
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = Strategy::Standard)]
    strategy: Strategy,

    /// JSON file overriding the search parameters below
    #[arg(long)]
    search_params: Option<PathBuf>,

    #[command(flatten)]
    params: SearchParams,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> FfResult<()> {
    if let Some(values) = &cli.chisquare {
        return cmd::chisquare::run(values);
    }

    check_flag_conflicts(&cli)?;

    let mut params = cli.params;
    if let Some(path) = &cli.search_params {
        info!("loading search parameters from {}", path.display());
        params = SearchParams::load_from_file(path)?;
    }

    let tree_path = cli
        .tree
        .as_ref()
        .ok_or_else(|| FamFluxError::Input("a species tree (-t) is required".into()))?;
    info!("loading tree from {}", tree_path.display());
    let mut tree = load_tree(tree_path, false)?;

    let rate_count = match &cli.rate_tree {
        Some(path) => {
            info!("loading rate tree from {}", path.display());
            let rate_tree = load_tree(path, true)?;
            let n = tree.apply_rate_indices(&rate_tree)?;
            info!("searching for {} rates", n);
            n
        }
        None => 1,
    };

    let (rate, rate_fixed) = match (cli.fixed_lambda, cli.fixed_lambdas.as_slice()) {
        (Some(lambda), []) => (Rate::Single(lambda), true),
        (None, []) => {
            if rate_count > 1 {
                (Rate::ByIndex(vec![0.0; rate_count]), false)
            } else {
                (Rate::Single(0.0), false)
            }
        }
        (None, lambdas) => {
            if lambdas.len() != rate_count {
                return Err(FamFluxError::Input(format!(
                    "-m supplies {} rates but the rate tree defines {} indices",
                    lambdas.len(),
                    rate_count
                )));
            }
            (Rate::ByIndex(lambdas.to_vec()), true)
        }
        (Some(_), _) => unreachable!("checked in flag conflicts"),
    };

    let error_model = match &cli.error_model {
        Some(path) => {
            info!("loading error model from {}", path.display());
            Some(ErrorModel::from_reader(File::open(path)?)?)
        }
        None => None,
    };

    let mut rng = fastrand::Rng::with_seed(cli.seed.unwrap_or(DEFAULT_SEED));

    if let Some(n_families) = cli.simulate {
        let root_dist = match &cli.root_dist {
            Some(path) => RootDistribution::from_map(&read_root_distribution(File::open(path)?)?),
            None => {
                let families = load_families(&cli, &tree)?;
                let max_root = families
                    .iter()
                    .map(GeneFamily::max_root_family_size)
                    .max()
                    .unwrap_or(30);
                RootDistribution::uniform(max_root)
            }
        };
        return cmd::simulate::run(cmd::simulate::SimulateArgs {
            tree: &tree,
            rate: &rate,
            rate_fixed,
            n_families: n_families.unwrap_or_else(|| root_dist.len()),
            root_dist,
            error_model: error_model.as_ref(),
            output: &cli.output,
            rng: &mut rng,
        });
    }

    let families = load_families(&cli, &tree)?;
    let prior = build_prior(&cli, &families)?;

    cmd::estimate::run(cmd::estimate::EstimateArgs {
        tree: &tree,
        families: &families,
        rate,
        rate_fixed,
        n_cats: cli.gamma_cats,
        alpha: cli.alpha,
        error_model,
        prior,
        output: &cli.output,
        strategy: cli.strategy,
        params,
        lambda_per_family: cli.lambda_per_family,
        rng: &mut rng,
    })
}

fn check_flag_conflicts(cli: &Cli) -> FfResult<()> {
    if cli.fixed_lambda.is_some() && !cli.fixed_lambdas.is_empty() {
        return Err(FamFluxError::Input(
            "cannot fix one rate (-l) and many rates (-m) at once".into(),
        ));
    }
    if !cli.fixed_lambdas.is_empty() && cli.rate_tree.is_none() {
        return Err(FamFluxError::Input(
            "fixing multiple rates (-m) requires a rate tree (-y)".into(),
        ));
    }
    if cli.alpha.is_some() && cli.gamma_cats < 2 {
        return Err(FamFluxError::Input(
            "fixing the gamma shape (-a) requires at least two categories (-k)".into(),
        ));
    }
    if cli.lambda_per_family && cli.gamma_cats > 1 {
        return Err(FamFluxError::Input(
            "per-family rates (-b) are only supported for the single-rate model".into(),
        ));
    }
    if cli.simulate.is_some() {
        if cli.fixed_lambda.is_none() && cli.fixed_lambdas.is_empty() {
            return Err(FamFluxError::Input(
                "simulation (-s) requires a fixed rate (-l or -m)".into(),
            ));
        }
        if cli.families.is_none() && cli.root_dist.is_none() {
            return Err(FamFluxError::Input(
                "simulation (-s) needs a root size source: families (-i) or a distribution (-f)"
                    .into(),
            ));
        }
    }
    if cli.simulate.is_none() && cli.families.is_none() {
        return Err(FamFluxError::Input(
            "inference requires a family table (-i)".into(),
        ));
    }
    Ok(())
}

fn load_tree(path: &PathBuf, rate_tree: bool) -> FfResult<Tree> {
    let content = std::fs::read_to_string(path)?;
    let line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| FamFluxError::Input(format!("{} is empty", path.display())))?;
    Tree::from_newick(line, rate_tree)
}

fn load_families(cli: &Cli, tree: &Tree) -> FfResult<Vec<GeneFamily>> {
    let path = cli
        .families
        .as_ref()
        .ok_or_else(|| FamFluxError::Input("a family table (-i) is required".into()))?;
    info!("loading families from {}", path.display());
    let mut families = read_gene_families(File::open(path)?, Some(tree))?;

    // Every leaf must have a count in every family.
    for family in &families {
        for leaf in tree.leaves() {
            family.count(tree.name(leaf))?;
        }
    }

    if cli.exclude_absent {
        let before = families.len();
        families.retain(|f| f.exists_at_root(tree));
        let dropped = before - families.len();
        if dropped > 0 {
            warn!("dropped {} families absent at the root", dropped);
        }
        if families.is_empty() {
            return Err(FamFluxError::Input(
                "every family was dropped as absent at the root".into(),
            ));
        }
    }

    info!("{} families loaded", families.len());
    Ok(families)
}

fn build_prior(cli: &Cli, families: &[GeneFamily]) -> FfResult<RootPrior> {
    let max_root = families
        .iter()
        .map(GeneFamily::max_root_family_size)
        .max()
        .unwrap_or(30);

    if let Some(poisson) = cli.poisson {
        let rate = match poisson {
            Some(rate) => rate,
            None => {
                let rate = estimate_poisson_rate(families)?;
                info!("estimated Poisson root-prior rate: {:.6}", rate);
                rate
            }
        };
        return RootPrior::poisson(rate, max_root);
    }
    if let Some(path) = &cli.root_dist {
        let map = read_root_distribution(File::open(path)?)?;
        return RootPrior::empirical(&map);
    }
    Ok(RootPrior::Uniform { max_root })
}
