//! Allocation policies and the strategy registry.
//!
//! A strategy is a named mapping from asset identifier to normalized weight.
//! Built-in policies are Uniform (equal weight across the investable set) and
//! Markowitz (long-only max-Sharpe over a trailing lookback window); bespoke
//! user weights are normalized and stored under a user-chosen name.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::data::PriceStore;
use crate::error::{PortfolioError, Result};

/// Built-in strategy names seeded into every registry.
pub const UNIFORM: &str = "Uniform";
pub const MARKOWITZ: &str = "Markowitz";

/// A normalized, long-only weight mapping.
///
/// Invariant: all weights are non-negative and sum to 1.0 over the assets
/// present in the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightMap {
    weights: HashMap<String, f64>,
}

impl WeightMap {
    /// Normalize arbitrary positive relative weights to sum to 1.0.
    ///
    /// Zero-weight entries are allowed and preserved; negative weights and an
    /// all-zero total are rejected.
    pub fn normalized(pairs: impl IntoIterator<Item = (String, f64)>) -> Result<Self> {
        let weights: HashMap<String, f64> = pairs.into_iter().collect();
        if weights.is_empty() {
            return Err(PortfolioError::InvalidWeights(
                "no assets supplied".to_string(),
            ));
        }
        if let Some((asset, &w)) = weights.iter().find(|(_, &w)| w < 0.0 || !w.is_finite()) {
            return Err(PortfolioError::InvalidWeights(format!(
                "weight {} for {} must be a non-negative number",
                w, asset
            )));
        }
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return Err(PortfolioError::InvalidWeights(
                "weights must sum to a positive total".to_string(),
            ));
        }
        Ok(Self {
            weights: weights.into_iter().map(|(a, w)| (a, w / total)).collect(),
        })
    }

    pub fn get(&self, asset: &str) -> f64 {
        self.weights.get(asset).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.weights.iter()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Restrict to the intersection with `assets` and renormalize over it.
    ///
    /// Fails when the intersection is empty or carries zero total weight.
    pub fn restricted_to(&self, assets: &[String]) -> Result<WeightMap> {
        let kept: HashMap<String, f64> = assets
            .iter()
            .filter_map(|a| self.weights.get(a).map(|&w| (a.clone(), w)))
            .collect();
        if kept.is_empty() {
            return Err(PortfolioError::InvalidWeights(
                "no weighted asset is present in the investable set".to_string(),
            ));
        }
        WeightMap::normalized(kept)
    }
}

/// Equal weight for every member of the investable set.
pub fn uniform_weights(assets: &[String]) -> Result<WeightMap> {
    if assets.is_empty() {
        return Err(PortfolioError::EmptyInvestableSet);
    }
    let w = 1.0 / assets.len() as f64;
    WeightMap::normalized(assets.iter().map(|a| (a.clone(), w)))
}

/// User-supplied relative weights normalized to sum to 1.0.
pub fn bespoke_weights(pairs: &[(String, f64)]) -> Result<WeightMap> {
    WeightMap::normalized(pairs.iter().cloned())
}

/// Tuning for the Markowitz max-Sharpe solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkowitzParams {
    /// Trailing lookback window, in days, ending at the portfolio start date.
    pub analysis_days: i64,
    /// Annualized risk-free rate used for excess returns.
    pub risk_free_rate: f64,
    /// Bounded retry budget for degenerate covariance matrices.
    pub max_attempts: usize,
}

impl Default for MarkowitzParams {
    fn default() -> Self {
        Self {
            analysis_days: 365,
            risk_free_rate: 0.0,
            max_attempts: 10,
        }
    }
}

/// Long-only, fully-invested max-Sharpe weights for the investable set.
///
/// Expected returns and the sample covariance matrix are estimated from daily
/// returns over the trailing lookback window ending at `start`, aligned on
/// the dates where every asset has an observation. The solve retries with an
/// escalating diagonal ridge when the covariance matrix is degenerate; on
/// exhaustion the error is recoverable and callers fall back (keep prior
/// weights) rather than crash.
pub fn markowitz_weights(
    store: &PriceStore,
    assets: &[String],
    start: NaiveDate,
    params: &MarkowitzParams,
) -> Result<WeightMap> {
    if assets.is_empty() {
        return Err(PortfolioError::EmptyInvestableSet);
    }

    let lookback_start = start - Duration::days(params.analysis_days);
    let returns = aligned_lookback_returns(store, assets, lookback_start, start)?;
    let n = assets.len();
    let obs = returns[0].len() as f64;

    // Mean daily return and sample covariance, annualized to 365 days.
    let means: Vec<f64> = returns.iter().map(|r| r.iter().sum::<f64>() / obs).collect();
    let expected: Vec<f64> = means.iter().map(|m| m * 365.0).collect();
    let mut covariance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let cov = returns[i]
                .iter()
                .zip(returns[j].iter())
                .map(|(ri, rj)| (ri - means[i]) * (rj - means[j]))
                .sum::<f64>()
                / (obs - 1.0);
            covariance[i][j] = cov * 365.0;
        }
    }

    let scale = (0..n).map(|i| covariance[i][i]).sum::<f64>() / n as f64;
    let mut last_reason = String::new();
    for attempt in 0..params.max_attempts {
        let mut conditioned = covariance.clone();
        if attempt > 0 {
            // Re-condition a degenerate matrix before retrying.
            let ridge = scale.max(1e-12) * 1e-6 * 10f64.powi(attempt as i32 - 1);
            for (i, row) in conditioned.iter_mut().enumerate() {
                row[i] += ridge;
            }
        }
        match solve_max_sharpe(&expected, &conditioned, params.risk_free_rate) {
            Ok(x) => {
                debug!(attempt, "max-Sharpe solve converged");
                return WeightMap::normalized(
                    assets.iter().cloned().zip(x.iter().copied()),
                );
            }
            Err(e) => {
                warn!(attempt, error = %e, "max-Sharpe solve failed, retrying");
                last_reason = e.to_string();
            }
        }
    }

    Err(PortfolioError::OptimizationFailed {
        attempts: params.max_attempts,
        reason: last_reason,
    })
}

/// Daily returns per asset over `[lookback_start, start]`, aligned on the
/// dates where every asset has a price.
fn aligned_lookback_returns(
    store: &PriceStore,
    assets: &[String],
    lookback_start: NaiveDate,
    start: NaiveDate,
) -> Result<Vec<Vec<f64>>> {
    let mut common: Option<Vec<NaiveDate>> = None;
    for asset in assets {
        let history = store
            .history(asset)
            .ok_or_else(|| PortfolioError::DataError(format!("unknown asset {:?}", asset)))?;
        let dates: Vec<NaiveDate> = history
            .slice(lookback_start, start)
            .iter()
            .map(|p| p.date)
            .collect();
        common = Some(match common {
            None => dates,
            Some(prev) => {
                // Both sides are sorted; keep the intersection.
                let mut merged = Vec::with_capacity(prev.len().min(dates.len()));
                let (mut i, mut j) = (0, 0);
                while i < prev.len() && j < dates.len() {
                    match prev[i].cmp(&dates[j]) {
                        std::cmp::Ordering::Less => i += 1,
                        std::cmp::Ordering::Greater => j += 1,
                        std::cmp::Ordering::Equal => {
                            merged.push(prev[i]);
                            i += 1;
                            j += 1;
                        }
                    }
                }
                merged
            }
        });
    }

    let common = common.unwrap_or_default();
    if common.len() < 3 {
        return Err(PortfolioError::InsufficientData(format!(
            "only {} aligned observations in the {} day lookback before {}",
            common.len(),
            (start - lookback_start).num_days(),
            start
        )));
    }

    let mut returns = Vec::with_capacity(assets.len());
    for asset in assets {
        let history = store
            .history(asset)
            .ok_or_else(|| PortfolioError::DataError(format!("unknown asset {:?}", asset)))?;
        let mut series = Vec::with_capacity(common.len() - 1);
        for pair in common.windows(2) {
            let prev = history.price_on(pair[0]).unwrap_or(0.0);
            let curr = history.price_on(pair[1]).unwrap_or(0.0);
            if prev <= 0.0 {
                return Err(PortfolioError::NonPositivePrice(prev));
            }
            series.push(curr / prev - 1.0);
        }
        returns.push(series);
    }
    Ok(returns)
}

/// Solve for max-Sharpe weights via the standard transform: minimize `w'Σw`
/// subject to `(μ - rf)'w = 1`, `w >= 0`, then renormalize to sum to 1.
///
/// When every excess return is non-positive the transform is infeasible and
/// the minimum-variance portfolio is returned instead.
fn solve_max_sharpe(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
) -> Result<Vec<f64>> {
    let excess: Vec<f64> = expected_returns
        .iter()
        .map(|&r| r - risk_free_rate)
        .collect();

    if excess.iter().all(|&r| r <= 0.0) {
        return solve_min_variance(covariance);
    }

    let x = solve_qp(covariance, &excess, 1.0)?;
    let total: f64 = x.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(PortfolioError::OptimizationFailed {
            attempts: 1,
            reason: "solver returned a non-positive weight total".to_string(),
        });
    }
    Ok(x.iter().map(|&w| (w / total).max(0.0)).collect())
}

/// Minimum-variance portfolio: minimize `w'Σw` subject to `sum(w) = 1`,
/// `w >= 0`.
fn solve_min_variance(covariance: &[Vec<f64>]) -> Result<Vec<f64>> {
    let ones = vec![1.0; covariance.len()];
    let x = solve_qp(covariance, &ones, 1.0)?;
    Ok(x.iter().map(|&w| w.max(0.0)).collect())
}

/// Minimize `w'Pw` subject to `c'w = rhs`, `w >= 0` with Clarabel.
fn solve_qp(p_matrix: &[Vec<f64>], equality: &[f64], rhs: f64) -> Result<Vec<f64>> {
    use clarabel::algebra::*;
    use clarabel::solver::*;

    let n = equality.len();

    // P in CSC format, near-zero entries dropped.
    let mut p_data = Vec::new();
    let mut p_indices = Vec::new();
    let mut p_indptr = vec![0];
    for j in 0..n {
        for (i, row) in p_matrix.iter().enumerate() {
            let val = row[j];
            if val.abs() > 1e-12 {
                p_data.push(val);
                p_indices.push(i);
            }
        }
        p_indptr.push(p_data.len());
    }
    let p = CscMatrix::new(n, n, p_indptr, p_indices, p_data);

    let q = vec![0.0; n];

    // Constraints: one equality row, then n non-negativity rows (-w <= 0).
    let mut a_data = Vec::new();
    let mut a_indices = Vec::new();
    let mut a_indptr = vec![0];
    for (j, &coeff) in equality.iter().enumerate() {
        a_data.push(coeff);
        a_indices.push(0);
        a_data.push(-1.0);
        a_indices.push(1 + j);
        a_indptr.push(a_data.len());
    }
    let a = CscMatrix::new(1 + n, n, a_indptr, a_indices, a_data);

    let mut b = vec![rhs];
    b.extend(vec![0.0; n]);
    let cones = [ZeroConeT(1), NonnegativeConeT(n)];

    let settings = DefaultSettingsBuilder::default()
        .max_iter(100)
        .verbose(false)
        .build()
        .map_err(|e| PortfolioError::OptimizationFailed {
            attempts: 1,
            reason: format!("failed to build solver settings: {}", e),
        })?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
    solver.solve();

    if !matches!(solver.solution.status, SolverStatus::Solved) {
        return Err(PortfolioError::OptimizationFailed {
            attempts: 1,
            reason: format!("solver status {:?}", solver.solution.status),
        });
    }

    Ok(solver.solution.x.clone())
}

/// Insertion-ordered mapping from strategy name to weights.
///
/// Seeded with the built-in strategies at session start; bespoke strategies
/// are appended by explicit user action and persist for the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyRegistry {
    entries: Vec<(String, WeightMap)>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a strategy. Empty and duplicate names are rejected at the
    /// boundary; the registry is left unchanged on error.
    pub fn insert(&mut self, name: impl Into<String>, weights: WeightMap) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PortfolioError::InvalidStrategyName(
                "name must not be empty".to_string(),
            ));
        }
        if self.contains(&name) {
            return Err(PortfolioError::DuplicateStrategy(name));
        }
        self.entries.push((name, weights));
        Ok(())
    }

    /// Replace an existing strategy's weights in place, keeping its position.
    pub fn replace(&mut self, name: &str, weights: WeightMap) -> Result<()> {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => {
                entry.1 = weights;
                Ok(())
            }
            None => Err(PortfolioError::InvalidStrategyName(format!(
                "no strategy named {:?}",
                name
            ))),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&WeightMap> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, w)| w)
    }

    /// Strategies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &WeightMap)> {
        self.entries.iter().map(|(n, w)| (n, w))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
