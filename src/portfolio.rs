//! Portfolio aggregation: weighted portfolio series and the unified table
//! joining every strategy with every investable asset.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::allocation::{StrategyRegistry, WeightMap};
use crate::error::{PortfolioError, Result};
use crate::returns::RebasedTable;
use crate::types::AssetKind;

/// A single portfolio's cumulative value series, starting at 1.0.
///
/// Weights are first restricted to the assets present in the rebased table
/// and renormalized over that intersection, so the result is invariant to
/// uniformly rescaling all weights by a positive constant.
pub fn portfolio_returns(rebased: &RebasedTable, weights: &WeightMap) -> Result<Vec<f64>> {
    let restricted = weights.restricted_to(rebased.columns())?;

    let mut series = vec![0.0; rebased.num_rows()];
    for asset in rebased.columns() {
        let w = restricted.get(asset);
        if w == 0.0 {
            continue;
        }
        let column = rebased.series(asset).ok_or_else(|| {
            PortfolioError::DataError(format!("missing rebased series for {:?}", asset))
        })?;
        for (acc, value) in series.iter_mut().zip(column.iter()) {
            *acc += w * value;
        }
    }
    Ok(series)
}

/// Strategy columns first (registry order), then raw asset columns: every
/// series rebased to 1.0 at the window start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedTable {
    dates: Vec<NaiveDate>,
    columns: Vec<UnifiedColumn>,
}

/// One column of the unified table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedColumn {
    pub name: String,
    pub kind: AssetKind,
    pub series: Vec<f64>,
}

impl UnifiedTable {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[UnifiedColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&UnifiedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Build the unified table from the rebased assets and the registry.
///
/// A strategy whose weights no longer intersect the investable set is skipped
/// with a warning rather than failing the whole table.
pub fn unify(rebased: &RebasedTable, registry: &StrategyRegistry) -> Result<UnifiedTable> {
    let mut columns = Vec::with_capacity(registry.len() + rebased.columns().len());

    for (name, weights) in registry.iter() {
        match portfolio_returns(rebased, weights) {
            Ok(series) => columns.push(UnifiedColumn {
                name: name.clone(),
                kind: AssetKind::Portfolio,
                series,
            }),
            Err(e) => {
                warn!(strategy = %name, error = %e, "skipping strategy column");
            }
        }
    }

    for asset in rebased.columns() {
        let series = rebased.series(asset).ok_or_else(|| {
            PortfolioError::DataError(format!("missing rebased series for {:?}", asset))
        })?;
        columns.push(UnifiedColumn {
            name: asset.clone(),
            kind: AssetKind::Coin,
            series: series.to_vec(),
        });
    }

    if columns.is_empty() {
        return Err(PortfolioError::EmptyInvestableSet);
    }

    Ok(UnifiedTable {
        dates: rebased.dates().to_vec(),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{bespoke_weights, uniform_weights};
    use crate::returns::RebasedTable;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn rebased_two_assets() -> RebasedTable {
        RebasedTable::from_parts(
            vec![d(1), d(2), d(3)],
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 1.1, 1.21], vec![1.0, 0.9, 0.99]],
        )
    }

    #[test]
    fn portfolio_series_is_weighted_average() {
        let rebased = rebased_two_assets();
        let weights = bespoke_weights(&[("a".to_string(), 0.5), ("b".to_string(), 0.5)]).unwrap();
        let series = portfolio_returns(&rebased, &weights).unwrap();
        assert_eq!(series[0], 1.0);
        assert!((series[1] - 1.0).abs() < 1e-12);
        assert!((series[2] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn portfolio_invariant_to_uniform_rescaling() {
        let rebased = rebased_two_assets();
        let base = bespoke_weights(&[("a".to_string(), 0.3), ("b".to_string(), 0.7)]).unwrap();
        let scaled = bespoke_weights(&[("a".to_string(), 3.0), ("b".to_string(), 7.0)]).unwrap();
        let s1 = portfolio_returns(&rebased, &base).unwrap();
        let s2 = portfolio_returns(&rebased, &scaled).unwrap();
        for (x, y) in s1.iter().zip(s2.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn equal_columns_make_weighting_irrelevant() {
        let rebased = RebasedTable::from_parts(
            vec![d(1), d(2)],
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 1.5], vec![1.0, 1.5]],
        );
        let uniform = uniform_weights(&["a".to_string(), "b".to_string()]).unwrap();
        let skewed = bespoke_weights(&[("a".to_string(), 0.9), ("b".to_string(), 0.1)]).unwrap();
        let s1 = portfolio_returns(&rebased, &uniform).unwrap();
        let s2 = portfolio_returns(&rebased, &skewed).unwrap();
        for (x, y) in s1.iter().zip(s2.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn weights_outside_investable_set_renormalize() {
        let rebased = rebased_two_assets();
        // Half the weight sits on an asset that fell out of the set.
        let weights = bespoke_weights(&[
            ("a".to_string(), 0.5),
            ("gone".to_string(), 0.5),
        ])
        .unwrap();
        let series = portfolio_returns(&rebased, &weights).unwrap();
        let alpha_only = rebased.series("a").unwrap();
        for (x, y) in series.iter().zip(alpha_only.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn unify_orders_strategies_before_assets() {
        let rebased = rebased_two_assets();
        let mut registry = StrategyRegistry::new();
        registry
            .insert(
                "Uniform",
                uniform_weights(&["a".to_string(), "b".to_string()]).unwrap(),
            )
            .unwrap();
        registry
            .insert("Solo", bespoke_weights(&[("a".to_string(), 1.0)]).unwrap())
            .unwrap();
        let unified = unify(&rebased, &registry).unwrap();
        assert_eq!(unified.column_names(), vec!["Uniform", "Solo", "a", "b"]);
        assert_eq!(unified.column("Uniform").unwrap().kind, AssetKind::Portfolio);
        assert_eq!(unified.column("a").unwrap().kind, AssetKind::Coin);
        for col in unified.columns() {
            assert_eq!(col.series[0], 1.0);
        }
    }

    #[test]
    fn unify_skips_strategies_with_no_overlap() {
        let rebased = rebased_two_assets();
        let mut registry = StrategyRegistry::new();
        registry
            .insert("Ghost", bespoke_weights(&[("gone".to_string(), 1.0)]).unwrap())
            .unwrap();
        registry
            .insert(
                "Uniform",
                uniform_weights(&["a".to_string(), "b".to_string()]).unwrap(),
            )
            .unwrap();
        let unified = unify(&rebased, &registry).unwrap();
        assert_eq!(unified.column_names(), vec!["Uniform", "a", "b"]);
    }
}
