//! Error types for the portfolio analytics core.

use thiserror::Error;

/// Main error type for portfolio construction and analytics.
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Non-positive price at series start: {0}")]
    NonPositivePrice(f64),

    #[error("No asset has a complete history over the selected window")]
    EmptyInvestableSet,

    #[error("Optimization failed to converge after {attempts} attempts: {reason}")]
    OptimizationFailed { attempts: usize, reason: String },

    #[error("Invalid strategy name: {0}")]
    InvalidStrategyName(String),

    #[error("A strategy named {0:?} already exists")]
    DuplicateStrategy(String),

    #[error("Invalid date window: {0}")]
    InvalidWindow(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for portfolio operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;
