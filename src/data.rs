//! Loading and snapshotting of asset metadata and daily price histories.
//!
//! The price data source and the market-capitalization source are external
//! collaborators; this module owns the seam: CSV parsing with tolerant
//! headers, invariant validation, and the immutable per-session `PriceStore`
//! snapshot everything downstream computes from.

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{PortfolioError, Result};
use crate::types::{AssetInfo, PriceHistory, PricePoint};

/// Raw asset metadata row.
#[derive(Debug, Deserialize)]
struct AssetRow {
    #[serde(alias = "Id", alias = "id", alias = "ID", alias = "coin_id")]
    id: String,
    #[serde(alias = "Symbol", alias = "symbol", alias = "ticker")]
    symbol: String,
    #[serde(alias = "Name", alias = "name")]
    name: String,
    #[serde(
        alias = "market_cap",
        alias = "market_cap_usd",
        alias = "marketCapUsd",
        alias = "MarketCap",
        default
    )]
    market_cap: Option<f64>,
}

/// Raw daily price observation row.
#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(alias = "Date", alias = "date", alias = "day", alias = "time")]
    date: String,
    #[serde(alias = "Price", alias = "price", alias = "priceUsd", alias = "close")]
    price: f64,
}

/// Loader behavior for malformed rows.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Skip rows with unparsable dates or prices instead of failing.
    pub skip_invalid: bool,
    /// Date format for history rows (defaults to `%Y-%m-%d`).
    pub date_format: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            skip_invalid: true,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

/// Load the asset list (market-cap-descending) from a CSV file.
pub fn load_assets(path: impl AsRef<Path>) -> Result<Vec<AssetInfo>> {
    let file = File::open(path.as_ref())?;
    let assets = read_assets(file)?;
    info!(count = assets.len(), path = %path.as_ref().display(), "loaded asset list");
    Ok(assets)
}

/// Parse the asset list from any reader. Source order (market-cap
/// descending) is preserved.
pub fn read_assets(reader: impl Read) -> Result<Vec<AssetInfo>> {
    let mut csv_reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut assets = Vec::new();
    for row in csv_reader.deserialize() {
        let row: AssetRow = row?;
        assets.push(AssetInfo {
            id: row.id,
            symbol: row.symbol,
            name: row.name,
            // Missing caps default to 0 and never fail the pipeline.
            market_cap: row.market_cap.unwrap_or(0.0),
        });
    }
    if assets.is_empty() {
        return Err(PortfolioError::DataError(
            "asset list is empty".to_string(),
        ));
    }
    Ok(assets)
}

/// Load one asset's daily price history from a CSV file.
pub fn load_history(path: impl AsRef<Path>, config: &DataConfig) -> Result<PriceHistory> {
    let file = File::open(path.as_ref())?;
    read_history(file, config)
}

/// Parse a price history from any reader, enforcing the ordering and price
/// invariants.
pub fn read_history(reader: impl Read, config: &DataConfig) -> Result<PriceHistory> {
    let mut csv_reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut points = Vec::new();
    for row in csv_reader.deserialize() {
        let row: PriceRow = match row {
            Ok(row) => row,
            Err(e) if config.skip_invalid => {
                warn!(error = %e, "skipping malformed history row");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let date = match NaiveDate::parse_from_str(&row.date, &config.date_format) {
            Ok(date) => date,
            Err(e) if config.skip_invalid => {
                warn!(date = %row.date, error = %e, "skipping row with unparsable date");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        points.push(PricePoint::new(date, row.price));
    }
    PriceHistory::new(points)
}

/// Load histories for every asset from `dir/{id}.csv`.
///
/// Assets without a history file get an empty history: partial coverage is
/// an expected condition, filtered later by the investable-set rule.
pub fn load_histories(
    dir: impl AsRef<Path>,
    assets: &[AssetInfo],
    config: &DataConfig,
) -> Result<HashMap<String, PriceHistory>> {
    let mut histories = HashMap::with_capacity(assets.len());
    for asset in assets {
        let path = dir.as_ref().join(format!("{}.csv", asset.id));
        let history = if path.exists() {
            load_history(&path, config)?
        } else {
            warn!(asset = %asset.id, "no history file, treating as unlisted");
            PriceHistory::default()
        };
        debug!(asset = %asset.id, days = history.len(), "loaded history");
        histories.insert(asset.id.clone(), history);
    }
    Ok(histories)
}

/// Immutable per-session snapshot of the market data.
///
/// Holds the asset list in market-cap-descending order, each asset's price
/// history, and the market-cap lookup. Created once per session; everything
/// downstream is a deterministic function of this snapshot.
#[derive(Debug, Clone)]
pub struct PriceStore {
    assets: Vec<AssetInfo>,
    asset_ids: Vec<String>,
    histories: HashMap<String, PriceHistory>,
}

impl PriceStore {
    pub fn new(assets: Vec<AssetInfo>, histories: HashMap<String, PriceHistory>) -> Result<Self> {
        if assets.is_empty() {
            return Err(PortfolioError::DataError(
                "cannot build a price store without assets".to_string(),
            ));
        }
        for asset in &assets {
            if !histories.contains_key(&asset.id) {
                return Err(PortfolioError::DataError(format!(
                    "no history entry for asset {:?}",
                    asset.id
                )));
            }
        }
        let asset_ids = assets.iter().map(|a| a.id.clone()).collect();
        Ok(Self {
            assets,
            asset_ids,
            histories,
        })
    }

    /// Load a complete store from an asset list file and a history directory.
    pub fn load(
        assets_path: impl AsRef<Path>,
        histories_dir: impl AsRef<Path>,
        config: &DataConfig,
    ) -> Result<Self> {
        let assets = load_assets(assets_path)?;
        let histories = load_histories(histories_dir, &assets, config)?;
        Self::new(assets, histories)
    }

    pub fn assets(&self) -> &[AssetInfo] {
        &self.assets
    }

    /// Asset ids in market-cap-descending order.
    pub fn asset_ids(&self) -> &[String] {
        &self.asset_ids
    }

    pub fn history(&self, asset: &str) -> Option<&PriceHistory> {
        self.histories.get(asset)
    }

    /// Market cap lookup keyed by asset id; unknown assets are absent.
    pub fn market_caps(&self) -> HashMap<String, f64> {
        self.assets
            .iter()
            .map(|a| (a.id.clone(), a.market_cap))
            .collect()
    }

    /// Earliest observation date across all histories.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.histories
            .values()
            .filter_map(|h| h.first_date())
            .min()
    }

    /// Latest observation date across all histories.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.histories.values().filter_map(|h| h.last_date()).max()
    }
}
