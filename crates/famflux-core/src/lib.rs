pub mod cache;
pub mod config;
pub mod errmodel;
pub mod error;
pub mod family;
pub mod gammacats;
pub mod matrix;
pub mod model;
pub mod optimizer;
pub mod prior;
pub mod pruning;
pub mod rates;
pub mod reconstruct;
pub mod simulate;
pub mod tree;

pub use error::{FamFluxError, FfResult};

/// Default RNG seed; every run is reproducible unless the user overrides
/// the seed.
pub const DEFAULT_SEED: u64 = 12;
