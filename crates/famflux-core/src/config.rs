//! Run-time tunables for the search, shared between the CLI surface and
//! JSON parameter files.

use std::fs;
use std::path::Path;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::FfResult;
use crate::optimizer::SimplexOptions;

#[derive(Args, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    #[arg(long, default_value_t = 1e-6, help = "Simplex diameter tolerance")]
    pub tolx: f64,

    #[arg(long, default_value_t = 1e-6, help = "Simplex score-range tolerance")]
    pub tolf: f64,

    #[arg(
        long,
        default_value_t = 250,
        help = "Max simplex iterations per optimization pass"
    )]
    pub max_iters: usize,

    #[arg(
        long,
        default_value_t = 0.05,
        help = "Relative perturbation seeding the simplex from nonzero coords"
    )]
    pub delta: f64,

    #[arg(
        long,
        default_value_t = 2.5e-4,
        help = "Absolute perturbation seeding the simplex from zero coords"
    )]
    pub zero_delta: f64,

    #[arg(
        long,
        default_value_t = 1000,
        help = "Null simulations per root size for p-values"
    )]
    pub pvalue_sims: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            tolx: 1e-6,
            tolf: 1e-6,
            max_iters: 250,
            delta: 0.05,
            zero_delta: 2.5e-4,
            pvalue_sims: 1000,
        }
    }
}

impl SearchParams {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> FfResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl From<&SearchParams> for SimplexOptions {
    fn from(params: &SearchParams) -> Self {
        SimplexOptions {
            tolx: params.tolx,
            tolf: params.tolf,
            max_iters: params.max_iters,
            delta: params.delta,
            zero_delta: params.zero_delta,
            ..SimplexOptions::default()
        }
    }
}
