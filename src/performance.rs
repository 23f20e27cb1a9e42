//! Performance table: ranked risk/return metrics for every strategy and
//! asset in the unified table, plus terminal/JSON/CSV formatting.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tabled::{builder::Builder, settings::Style};
use tracing::warn;

use crate::error::Result;
use crate::metrics;
use crate::portfolio::UnifiedTable;
use crate::types::AssetKind;

/// Derived metrics for one column of the unified table.
///
/// Percentages are stored as percents (10.0 = 10%); the risk-adjusted ratio
/// is unitless; market cap is in millions of USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub name: String,
    pub kind: AssetKind,
    pub return_pct: f64,
    pub annual_return_pct: f64,
    pub annual_vol_pct: f64,
    pub risk_adjusted: f64,
    pub max_drawdown_pct: f64,
    pub market_cap_musd: f64,
}

/// Sortable columns of the performance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceColumn {
    Return,
    AnnualReturn,
    Volatility,
    RiskAdjusted,
    MaxDrawdown,
    MarketCap,
}

/// One row per unified column, portfolios and coins alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceTable {
    rows: Vec<PerformanceRow>,
}

impl PerformanceTable {
    /// Compute metrics for every column of the unified table.
    ///
    /// A metric failure in one column never aborts the rest: the failing
    /// column is reported with NaN cells. Missing market caps default to 0.
    pub fn build(unified: &UnifiedTable, market_caps: &HashMap<String, f64>) -> Self {
        let rows = unified
            .columns()
            .iter()
            .map(|col| {
                let series = col.series.as_slice();
                let return_pct = metrics::absolute_return(series);
                let annual_return_pct = metrics::annual_return(series);
                let annual_vol_pct = metrics::annual_vol(series);
                let risk_adjusted = metrics::risk_adjusted_return(series);
                let drawdown = metrics::max_drawdown(series);

                if let Err(e) = &return_pct {
                    warn!(column = %col.name, error = %e, "metrics failed, reporting NaN");
                }

                PerformanceRow {
                    name: col.name.clone(),
                    kind: col.kind,
                    return_pct: return_pct.map(|r| r * 100.0).unwrap_or(f64::NAN),
                    annual_return_pct: annual_return_pct.map(|r| r * 100.0).unwrap_or(f64::NAN),
                    annual_vol_pct: annual_vol_pct.map(|v| v * 100.0).unwrap_or(f64::NAN),
                    risk_adjusted: risk_adjusted.unwrap_or(f64::NAN),
                    max_drawdown_pct: drawdown
                        .map(|dd| dd.magnitude * 100.0)
                        .unwrap_or(f64::NAN),
                    market_cap_musd: market_caps.get(&col.name).copied().unwrap_or(0.0) / 1e6,
                }
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[PerformanceRow] {
        &self.rows
    }

    pub fn row(&self, name: &str) -> Option<&PerformanceRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Sort descending by the chosen column; NaN rows sink to the bottom.
    pub fn sort_by(&mut self, column: PerformanceColumn) {
        let key = |row: &PerformanceRow| -> f64 {
            match column {
                PerformanceColumn::Return => row.return_pct,
                PerformanceColumn::AnnualReturn => row.annual_return_pct,
                PerformanceColumn::Volatility => row.annual_vol_pct,
                PerformanceColumn::RiskAdjusted => row.risk_adjusted,
                PerformanceColumn::MaxDrawdown => row.max_drawdown_pct,
                PerformanceColumn::MarketCap => row.market_cap_musd,
            }
        };
        self.rows.sort_by(|a, b| {
            let (ka, kb) = (key(a), key(b));
            match (ka.is_nan(), kb.is_nan()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal),
            }
        });
    }
}

/// Format performance results for terminal display.
pub struct PerformanceFormatter;

impl PerformanceFormatter {
    /// Render the table with rounded borders.
    pub fn render(table: &PerformanceTable) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Asset",
            "Type",
            "Return %",
            "Annual %",
            "Vol %",
            "Risk adj",
            "Max loss %",
            "Mkt cap $M",
        ]);
        for row in table.rows() {
            builder.push_record([
                row.name.clone(),
                row.kind.to_string(),
                Self::fmt_cell(row.return_pct),
                Self::fmt_cell(row.annual_return_pct),
                Self::fmt_cell(row.annual_vol_pct),
                Self::fmt_cell(row.risk_adjusted),
                Self::fmt_cell(row.max_drawdown_pct),
                format!("{:.0}", row.market_cap_musd),
            ]);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    fn fmt_cell(value: f64) -> String {
        if value.is_nan() {
            "-".to_string()
        } else {
            format!("{:.2}", value)
        }
    }

    /// Format a percentage change with color.
    pub fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    /// Export the table to JSON.
    pub fn to_json(table: &PerformanceTable) -> Result<String> {
        Ok(serde_json::to_string_pretty(table.rows())?)
    }

    /// Get CSV header.
    pub fn csv_header() -> &'static str {
        "asset,type,return_pct,annual_return_pct,annual_vol_pct,risk_adjusted,max_drawdown_pct,market_cap_musd"
    }

    /// Export one row to a CSV line.
    pub fn to_csv_line(row: &PerformanceRow) -> String {
        format!(
            "{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.2}",
            row.name,
            row.kind,
            row.return_pct,
            row.annual_return_pct,
            row.annual_vol_pct,
            row.risk_adjusted,
            row.max_drawdown_pct,
            row.market_cap_musd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{uniform_weights, StrategyRegistry};
    use crate::portfolio::unify;
    use crate::returns::RebasedTable;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn unified_fixture() -> UnifiedTable {
        let rebased = RebasedTable::from_parts(
            vec![d(1), d(2), d(3), d(4)],
            vec!["up".to_string(), "flat".to_string()],
            vec![
                vec![1.0, 1.1, 1.2, 1.3],
                vec![1.0, 1.0, 1.0, 1.0],
            ],
        );
        let mut registry = StrategyRegistry::new();
        registry
            .insert(
                "Uniform",
                uniform_weights(&["up".to_string(), "flat".to_string()]).unwrap(),
            )
            .unwrap();
        unify(&rebased, &registry).unwrap()
    }

    #[test]
    fn table_has_one_row_per_column() {
        let unified = unified_fixture();
        let table = PerformanceTable::build(&unified, &HashMap::new());
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.row("Uniform").unwrap().kind, AssetKind::Portfolio);
        assert_eq!(table.row("up").unwrap().kind, AssetKind::Coin);
    }

    #[test]
    fn zero_volatility_yields_nan_not_error() {
        let unified = unified_fixture();
        let table = PerformanceTable::build(&unified, &HashMap::new());
        let flat = table.row("flat").unwrap();
        assert!(flat.risk_adjusted.is_nan());
        assert_eq!(flat.return_pct, 0.0);
        assert_eq!(flat.annual_vol_pct, 0.0);
        // The failing ratio never poisoned other rows.
        assert!(table.row("up").unwrap().risk_adjusted.is_finite());
    }

    #[test]
    fn market_caps_default_to_zero() {
        let unified = unified_fixture();
        let mut caps = HashMap::new();
        caps.insert("up".to_string(), 2_000_000_000.0);
        let table = PerformanceTable::build(&unified, &caps);
        assert_eq!(table.row("up").unwrap().market_cap_musd, 2000.0);
        assert_eq!(table.row("flat").unwrap().market_cap_musd, 0.0);
    }

    #[test]
    fn sort_puts_nan_last() {
        let unified = unified_fixture();
        let mut table = PerformanceTable::build(&unified, &HashMap::new());
        table.sort_by(PerformanceColumn::RiskAdjusted);
        let names: Vec<&str> = table.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(*names.last().unwrap(), "flat");
    }

    #[test]
    fn sort_descending_by_return() {
        let unified = unified_fixture();
        let mut table = PerformanceTable::build(&unified, &HashMap::new());
        table.sort_by(PerformanceColumn::Return);
        assert_eq!(table.rows()[0].name, "up");
    }

    #[test]
    fn render_marks_nan_cells() {
        let unified = unified_fixture();
        let table = PerformanceTable::build(&unified, &HashMap::new());
        let rendered = PerformanceFormatter::render(&table);
        assert!(rendered.contains("Uniform"));
        assert!(rendered.contains('-'));
    }

    #[test]
    fn json_export_round_trips() {
        let unified = unified_fixture();
        let table = PerformanceTable::build(&unified, &HashMap::new());
        let json = PerformanceFormatter::to_json(&table).unwrap();
        assert!(json.contains("Uniform"));
    }

    #[test]
    fn csv_line_matches_header_arity() {
        let unified = unified_fixture();
        let table = PerformanceTable::build(&unified, &HashMap::new());
        let line = PerformanceFormatter::to_csv_line(&table.rows()[0]);
        let fields = line.split(',').count();
        let headers = PerformanceFormatter::csv_header().split(',').count();
        assert_eq!(fields, headers);
    }
}
