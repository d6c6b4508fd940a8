use thiserror::Error;

#[derive(Error, Debug)]
pub enum FamFluxError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tree Parsing Error: {0}")]
    Tree(String),

    #[error("Input Error: {0}")]
    Input(String),

    #[error("Optimizer failed to initialize: {0}")]
    OptimizerInitialization(String),
}

pub type FfResult<T> = Result<T, FamFluxError>;
