//! Configuration file support.
//!
//! Allows loading analysis settings from TOML files for reproducible runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::allocation::MarkowitzParams;
use crate::error::{PortfolioError, Result};
use crate::session::SessionOptions;
use crate::types::DateWindow;

/// Complete analysis configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Data source settings.
    #[serde(default)]
    pub data: DataSettings,
    /// Backtest window and investable-set settings.
    #[serde(default)]
    pub analysis: AnalysisSettings,
    /// Markowitz optimizer settings.
    #[serde(default)]
    pub markowitz: MarkowitzSettings,
}

/// Data source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Path to the asset list CSV.
    #[serde(default = "default_assets_path")]
    pub assets: String,
    /// Directory containing per-asset history CSVs.
    #[serde(default = "default_histories_dir")]
    pub histories: String,
}

fn default_assets_path() -> String { "data/assets.csv".to_string() }
fn default_histories_dir() -> String { "data/histories".to_string() }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            assets: default_assets_path(),
            histories: default_histories_dir(),
        }
    }
}

/// Backtest window and investable-set settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Maximum number of coins in the investable set, by market cap.
    #[serde(default = "default_max_coins")]
    pub max_coins: usize,
    /// Window start (YYYY-MM-DD). Defaults to a year before the data end.
    #[serde(default)]
    pub start_date: Option<String>,
    /// Window end (YYYY-MM-DD). Defaults to the data end.
    #[serde(default)]
    pub end_date: Option<String>,
}

fn default_max_coins() -> usize { 10 }

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_coins: 10,
            start_date: None,
            end_date: None,
        }
    }
}

/// Markowitz optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkowitzSettings {
    /// Trailing lookback in days before the window start.
    #[serde(default = "default_analysis_days")]
    pub analysis_days: i64,
    /// Annualized risk-free rate.
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Retry budget for degenerate covariance matrices.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_analysis_days() -> i64 { 365 }
fn default_max_attempts() -> usize { 10 }

impl Default for MarkowitzSettings {
    fn default() -> Self {
        Self {
            analysis_days: 365,
            risk_free_rate: 0.0,
            max_attempts: 10,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        info!(path = %path.as_ref().display(), "loaded configuration");
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a TOML file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PortfolioError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.analysis.max_coins == 0 {
            return Err(PortfolioError::ConfigError(
                "max_coins must be at least 1".to_string(),
            ));
        }
        if self.markowitz.analysis_days <= 0 {
            return Err(PortfolioError::ConfigError(
                "analysis_days must be positive".to_string(),
            ));
        }
        if self.markowitz.max_attempts == 0 {
            return Err(PortfolioError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured window, when both endpoints are present.
    pub fn window(&self) -> Result<Option<DateWindow>> {
        match (&self.analysis.start_date, &self.analysis.end_date) {
            (Some(start), Some(end)) => {
                let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
                let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")?;
                Ok(Some(DateWindow::new(start, end)?))
            }
            (None, None) => Ok(None),
            _ => Err(PortfolioError::ConfigError(
                "start_date and end_date must be set together".to_string(),
            )),
        }
    }

    /// Session options derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_coins: self.analysis.max_coins,
            markowitz: MarkowitzParams {
                analysis_days: self.markowitz.analysis_days,
                risk_free_rate: self.markowitz.risk_free_rate,
                max_attempts: self.markowitz.max_attempts,
            },
        }
    }

    /// An example configuration with every field spelled out.
    pub fn example() -> &'static str {
        r#"# coinfolio analysis configuration

[data]
# Asset list CSV: id,symbol,name,market_cap_usd rows, market-cap descending.
assets = "data/assets.csv"
# Directory of per-asset daily history CSVs named {id}.csv.
histories = "data/histories"

[analysis]
# Investable set is the top N assets by market cap with complete histories.
max_coins = 10
# Backtest window; omit both to default to the last year of data.
# start_date = "2023-01-01"
# end_date = "2024-01-01"

[markowitz]
# Trailing lookback (days) ending at the window start.
analysis_days = 365
risk_free_rate = 0.0
max_attempts = 10
"#
    }
}
