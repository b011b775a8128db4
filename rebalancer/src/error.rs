//! Error types for the rebalancer.

use std::path::PathBuf;

/// All errors that can occur while loading inputs and computing a plan.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read holdings file {path}: {source}")]
    HoldingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse holdings JSON: {0}")]
    HoldingsParse(serde_json::Error),

    #[error("target file error: {0}")]
    Target(String),

    #[error("failed to read target file {path}: {source}")]
    TargetRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse target JSON: {0}")]
    TargetParse(serde_json::Error),

    #[error("failed to read price file {path}: {source}")]
    PricesRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse price JSON: {0}")]
    PricesParse(serde_json::Error),

    #[error("planning failed: {0}")]
    Plan(#[from] tradeplan::Error),

    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to write CSV output: {0}")]
    Csv(#[source] std::io::Error),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
