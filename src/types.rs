//! Core data types for the portfolio analytics core.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PortfolioError, Result};

/// A single daily price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// An ordered-by-date daily price series for one asset.
///
/// Invariants: dates strictly increasing, prices non-negative. Validated on
/// construction and immutable afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    points: Vec<PricePoint>,
}

impl PriceHistory {
    /// Build a history from observations, enforcing ordering and price sign.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(PortfolioError::DataError(format!(
                    "price history dates must be strictly increasing: {} then {}",
                    pair[0].date, pair[1].date
                )));
            }
        }
        if let Some(p) = points.iter().find(|p| p.price < 0.0) {
            return Err(PortfolioError::DataError(format!(
                "negative price {} on {}",
                p.price, p.date
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Price on a given date, if observed.
    pub fn price_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].price)
    }

    /// Observations with dates in `[start, end]`.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> &[PricePoint] {
        let lo = self.points.partition_point(|p| p.date < start);
        let hi = self.points.partition_point(|p| p.date <= end);
        &self.points[lo..hi]
    }
}

/// Asset metadata from the market data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Source identifier (e.g. "bitcoin").
    pub id: String,
    /// Ticker symbol (e.g. "BTC").
    pub symbol: String,
    /// Display name (e.g. "Bitcoin").
    pub name: String,
    /// Market capitalization in USD; 0 when the source has no value.
    pub market_cap: f64,
}

/// An inclusive date window for backtesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(PortfolioError::InvalidWindow(format!(
                "start {} must precede end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days spanned, inclusive of both endpoints.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Whether a performance row describes a constructed portfolio or a single coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Portfolio,
    Coin,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Portfolio => write!(f, "Portfolio"),
            AssetKind::Coin => write!(f, "Coin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn history_rejects_unsorted_dates() {
        let points = vec![
            PricePoint::new(d(2024, 1, 2), 10.0),
            PricePoint::new(d(2024, 1, 1), 11.0),
        ];
        assert!(PriceHistory::new(points).is_err());
    }

    #[test]
    fn history_rejects_duplicate_dates() {
        let points = vec![
            PricePoint::new(d(2024, 1, 1), 10.0),
            PricePoint::new(d(2024, 1, 1), 11.0),
        ];
        assert!(PriceHistory::new(points).is_err());
    }

    #[test]
    fn history_rejects_negative_prices() {
        let points = vec![PricePoint::new(d(2024, 1, 1), -1.0)];
        assert!(PriceHistory::new(points).is_err());
    }

    #[test]
    fn history_slice_is_inclusive() {
        let points = (1..=5)
            .map(|i| PricePoint::new(d(2024, 1, i), i as f64))
            .collect();
        let history = PriceHistory::new(points).unwrap();
        let slice = history.slice(d(2024, 1, 2), d(2024, 1, 4));
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].date, d(2024, 1, 2));
        assert_eq!(slice[2].date, d(2024, 1, 4));
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(DateWindow::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
        assert!(DateWindow::new(d(2024, 1, 1), d(2024, 1, 1)).is_err());
    }

    #[test]
    fn window_num_days_inclusive() {
        let w = DateWindow::new(d(2024, 1, 1), d(2024, 1, 10)).unwrap();
        assert_eq!(w.num_days(), 10);
        assert!(w.contains(d(2024, 1, 1)));
        assert!(w.contains(d(2024, 1, 10)));
        assert!(!w.contains(d(2024, 1, 11)));
    }
}
