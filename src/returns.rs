//! Return series construction: day-over-day returns, investable-set
//! filtering, and rebased (indexed-to-1) cumulative series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::data::PriceStore;
use crate::error::{PortfolioError, Result};
use crate::types::DateWindow;

/// Day-over-day simple returns for every asset, aligned on the union date
/// index of all histories.
///
/// The index keeps every observed date; returns live on the second date of
/// each consecutive pair. A cell is `None` where the asset has no observation
/// on either side of the day boundary. Columns keep the store's
/// market-cap-descending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnTable {
    /// Union of all observation dates, ascending.
    index: Vec<NaiveDate>,
    columns: Vec<String>,
    /// Per-asset simple returns, parallel to `index[1..]`.
    cells: HashMap<String, Vec<Option<f64>>>,
}

impl ReturnTable {
    /// Derive simple returns from the price snapshot.
    pub fn from_store(store: &PriceStore) -> Self {
        let mut all_dates: BTreeSet<NaiveDate> = BTreeSet::new();
        for asset in store.asset_ids() {
            if let Some(history) = store.history(asset) {
                for p in history.points() {
                    all_dates.insert(p.date);
                }
            }
        }
        let index: Vec<NaiveDate> = all_dates.into_iter().collect();

        let mut cells = HashMap::new();
        let columns: Vec<String> = store.asset_ids().to_vec();
        for asset in &columns {
            let history = store.history(asset);
            let mut column = Vec::with_capacity(index.len().saturating_sub(1));
            for pair in index.windows(2) {
                let cell = history.and_then(|h| {
                    let prev = h.price_on(pair[0])?;
                    let curr = h.price_on(pair[1])?;
                    if prev > 0.0 {
                        Some(curr / prev - 1.0)
                    } else {
                        None
                    }
                });
                column.push(cell);
            }
            cells.insert(asset.clone(), column);
        }

        debug!(
            assets = columns.len(),
            days = index.len(),
            "built return table"
        );
        Self {
            index,
            columns,
            cells,
        }
    }

    /// Dates carrying a return value (the union index minus its first date).
    pub fn dates(&self) -> &[NaiveDate] {
        if self.index.is_empty() {
            &self.index
        } else {
            &self.index[1..]
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Simple returns for one asset, aligned to `dates()`.
    pub fn simple_returns(&self, asset: &str) -> Option<&[Option<f64>]> {
        self.cells.get(asset).map(|v| v.as_slice())
    }

    /// Growth factors `p[t]/p[t-1]` for one asset. The compounding form
    /// consumed by rebasing; kept distinct from `simple_returns` by contract.
    pub fn growth_factors(&self, asset: &str) -> Option<Vec<Option<f64>>> {
        self.cells
            .get(asset)
            .map(|col| col.iter().map(|r| r.map(|r| 1.0 + r)).collect())
    }

    /// The anchor is the first observed date inside the window: the date the
    /// rebased series is pinned to 1.0 on. The returned range covers the
    /// return rows strictly after the anchor, up to the window end.
    fn window_anchor(&self, window: DateWindow) -> Result<(usize, std::ops::Range<usize>)> {
        let anchor = self.index.partition_point(|d| *d < window.start);
        if anchor >= self.index.len() || self.index[anchor] > window.end {
            return Err(PortfolioError::InvalidWindow(format!(
                "no observations between {} and {}",
                window.start, window.end
            )));
        }
        let hi = self.index.partition_point(|d| *d <= window.end);
        // Return row i corresponds to index date i + 1.
        Ok((anchor, anchor..hi - 1))
    }

    /// Assets with a complete (gap-free) return history over the window, in
    /// the original market-cap-descending order.
    ///
    /// Completeness means a return on every date after the window's anchor
    /// date, which implies a price on the anchor date itself. Assets listed
    /// after the window start therefore drop out.
    pub fn investable_assets(&self, window: DateWindow) -> Vec<String> {
        let Ok((_, rows)) = self.window_anchor(window) else {
            return Vec::new();
        };
        self.columns
            .iter()
            .filter(|asset| {
                self.cells
                    .get(*asset)
                    .map(|col| col[rows.clone()].iter().all(|c| c.is_some()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Cumulative rebased series over the window for the given assets.
    ///
    /// Every column starts at exactly 1.0 on the anchor date (no gain on day
    /// one) and compounds forward through the window's growth factors, so the
    /// value on date `t` is `price[t] / price[anchor]`.
    pub fn rebase(&self, assets: &[String], window: DateWindow) -> Result<RebasedTable> {
        if assets.is_empty() {
            return Err(PortfolioError::EmptyInvestableSet);
        }
        let (anchor, rows) = self.window_anchor(window)?;

        let mut dates = Vec::with_capacity(rows.len() + 1);
        dates.push(self.index[anchor]);
        dates.extend_from_slice(&self.index[anchor + 1..anchor + 1 + rows.len()]);

        let mut values = Vec::with_capacity(assets.len());
        for asset in assets {
            let col = self
                .cells
                .get(asset)
                .ok_or_else(|| PortfolioError::DataError(format!("unknown asset {:?}", asset)))?;
            let mut series = Vec::with_capacity(dates.len());
            let mut level = 1.0;
            series.push(level);
            for cell in &col[rows.clone()] {
                let r = cell.ok_or_else(|| {
                    PortfolioError::InsufficientData(format!(
                        "{} has a gap inside the window {}",
                        asset, window
                    ))
                })?;
                level *= 1.0 + r;
                series.push(level);
            }
            values.push(series);
        }

        Ok(RebasedTable {
            dates,
            columns: assets.to_vec(),
            values,
        })
    }
}

/// Cumulative return series indexed to 1.0 at the window start, one column
/// per investable asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebasedTable {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    /// Column-major values, parallel to `columns`; each series is parallel
    /// to `dates`.
    values: Vec<Vec<f64>>,
}

impl RebasedTable {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn series(&self, asset: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == asset)
            .map(|i| self.values[i].as_slice())
    }

    pub(crate) fn from_parts(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            dates,
            columns,
            values,
        }
    }
}
