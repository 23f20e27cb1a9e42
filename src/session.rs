//! Explicit session context: the immutable price snapshot, the selected
//! window, the strategy registry, and memoized derived tables.
//!
//! Every user interaction recomputes a deterministic function of
//! (snapshot, window, registry). The session owns the memoization: derived
//! tables are cached until an input changes, and each mutation is an atomic
//! replace-then-invalidate. Single-threaded by design; no locking.

use chrono::Duration;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::allocation::{
    self, markowitz_weights, uniform_weights, MarkowitzParams, StrategyRegistry, WeightMap,
};
use crate::data::PriceStore;
use crate::error::{PortfolioError, Result};
use crate::performance::PerformanceTable;
use crate::portfolio::{unify, UnifiedTable};
use crate::returns::{RebasedTable, ReturnTable};
use crate::types::DateWindow;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Cap on the investable set, taken in market-cap-descending order.
    pub max_coins: usize,
    /// Markowitz solve parameters.
    pub markowitz: MarkowitzParams,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_coins: 10,
            markowitz: MarkowitzParams::default(),
        }
    }
}

/// Owns all per-session state; the core reads it as an explicit input rather
/// than ambient globals.
#[derive(Debug)]
pub struct Session {
    store: PriceStore,
    returns: ReturnTable,
    window: DateWindow,
    registry: StrategyRegistry,
    options: SessionOptions,

    // Derived tables, memoized per (window, registry) input state.
    investable: Option<Vec<String>>,
    rebased: Option<RebasedTable>,
    unified: Option<UnifiedTable>,
    performance: Option<PerformanceTable>,
}

impl Session {
    /// Build a session over a snapshot, seeding the registry with the
    /// built-in strategies for the initial window.
    ///
    /// Defaults the window to the last 365 days of the snapshot when none is
    /// given. Markowitz non-convergence during seeding degrades to a warning:
    /// the session starts with the Uniform built-in only.
    pub fn new(
        store: PriceStore,
        window: Option<DateWindow>,
        options: SessionOptions,
    ) -> Result<Self> {
        let last = store.last_date().ok_or_else(|| {
            PortfolioError::InsufficientData("price store has no observations".to_string())
        })?;
        let first = store.first_date().unwrap_or(last);
        let window = match window {
            Some(w) => w,
            None => DateWindow::new((last - Duration::days(365)).max(first), last)?,
        };

        let returns = ReturnTable::from_store(&store);
        let mut session = Self {
            store,
            returns,
            window,
            registry: StrategyRegistry::new(),
            options,
            investable: None,
            rebased: None,
            unified: None,
            performance: None,
        };
        session.validate_window(window)?;
        session.seed_builtins()?;
        info!(window = %session.window, "session ready");
        Ok(session)
    }

    pub fn store(&self) -> &PriceStore {
        &self.store
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    fn validate_window(&self, window: DateWindow) -> Result<()> {
        let first = self.store.first_date().unwrap_or(window.start);
        let last = self.store.last_date().unwrap_or(window.end);
        if window.start < first || window.end > last {
            return Err(PortfolioError::InvalidWindow(format!(
                "{} lies outside the available history {} to {}",
                window, first, last
            )));
        }
        Ok(())
    }

    /// Select a new backtest window, invalidating every derived table.
    pub fn set_window(&mut self, window: DateWindow) -> Result<()> {
        self.validate_window(window)?;
        self.window = window;
        self.invalidate_all();
        self.refresh_builtins();
        Ok(())
    }

    /// Register a bespoke strategy from relative weights.
    ///
    /// Name validation happens at the boundary; on error the registry is
    /// unchanged. On success the unified and performance tables recompute on
    /// next access.
    pub fn add_strategy(&mut self, name: &str, relative: &[(String, f64)]) -> Result<()> {
        let weights = allocation::bespoke_weights(relative)?;
        self.registry.insert(name, weights)?;
        self.unified = None;
        self.performance = None;
        info!(strategy = %name, "added bespoke strategy");
        Ok(())
    }

    /// The investable set for the current window: assets with complete
    /// histories, capped at `max_coins`, in market-cap-descending order.
    pub fn investable(&mut self) -> &[String] {
        if self.investable.is_none() {
            let mut assets = self.returns.investable_assets(self.window);
            assets.truncate(self.options.max_coins);
            self.investable = Some(assets);
        }
        self.investable.as_deref().unwrap_or_default()
    }

    /// Rebased series for the investable set over the current window.
    pub fn rebased(&mut self) -> Result<&RebasedTable> {
        if self.rebased.is_none() {
            let assets = self.investable().to_vec();
            if assets.is_empty() {
                return Err(PortfolioError::EmptyInvestableSet);
            }
            let table = self.returns.rebase(&assets, self.window)?;
            self.rebased = Some(table);
        }
        self.rebased
            .as_ref()
            .ok_or(PortfolioError::EmptyInvestableSet)
    }

    /// The unified returns table: every strategy plus every investable asset.
    pub fn unified(&mut self) -> Result<&UnifiedTable> {
        if self.unified.is_none() {
            let rebased = self.rebased()?.clone();
            let table = unify(&rebased, &self.registry)?;
            self.unified = Some(table);
        }
        self.unified
            .as_ref()
            .ok_or(PortfolioError::EmptyInvestableSet)
    }

    /// The performance table for the current unified table.
    pub fn performance(&mut self) -> Result<&PerformanceTable> {
        if self.performance.is_none() {
            let caps = self.store.market_caps();
            let unified = self.unified()?;
            let table = PerformanceTable::build(unified, &caps);
            self.performance = Some(table);
        }
        self.performance
            .as_ref()
            .ok_or(PortfolioError::EmptyInvestableSet)
    }

    fn invalidate_all(&mut self) {
        self.investable = None;
        self.rebased = None;
        self.unified = None;
        self.performance = None;
    }

    fn seed_builtins(&mut self) -> Result<()> {
        let assets = self.investable().to_vec();
        if assets.is_empty() {
            warn!(window = %self.window, "empty investable set, no built-in strategies");
            return Ok(());
        }
        self.registry
            .insert(allocation::UNIFORM, uniform_weights(&assets)?)?;
        match self.solve_markowitz(&assets) {
            Ok(weights) => self.registry.insert(allocation::MARKOWITZ, weights)?,
            Err(e) => {
                warn!(error = %e, "Markowitz seeding failed, strategy disabled for this window")
            }
        }
        Ok(())
    }

    /// Recompute built-in weights for the current window, keeping prior
    /// weights when the optimizer does not converge.
    fn refresh_builtins(&mut self) {
        let assets = self.investable().to_vec();
        if assets.is_empty() {
            return;
        }
        match uniform_weights(&assets) {
            Ok(weights) => self.upsert_builtin(allocation::UNIFORM, weights),
            Err(e) => warn!(error = %e, "uniform refresh failed"),
        }
        match self.solve_markowitz(&assets) {
            Ok(weights) => self.upsert_builtin(allocation::MARKOWITZ, weights),
            Err(e) => {
                // Recoverable: keep whatever weights the registry already has.
                warn!(error = %e, "Markowitz refresh failed, keeping prior weights");
            }
        }
    }

    fn upsert_builtin(&mut self, name: &str, weights: WeightMap) {
        let result = if self.registry.contains(name) {
            self.registry.replace(name, weights)
        } else {
            self.registry.insert(name, weights)
        };
        if let Err(e) = result {
            warn!(strategy = %name, error = %e, "failed to update built-in strategy");
        }
    }

    fn solve_markowitz(&self, assets: &[String]) -> Result<WeightMap> {
        markowitz_weights(
            &self.store,
            assets,
            self.window.start,
            &self.options.markowitz,
        )
    }

    /// Market caps for display; unknown assets are simply absent.
    pub fn market_caps(&self) -> HashMap<String, f64> {
        self.store.market_caps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetInfo, PriceHistory, PricePoint};
    use chrono::NaiveDate;

    fn d(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(offset)
    }

    fn test_store(days: i64) -> PriceStore {
        let specs = [("alpha", 0.002, 0.01), ("beta", 0.001, 0.015)];
        let assets: Vec<AssetInfo> = specs
            .iter()
            .enumerate()
            .map(|(i, (id, _, _))| AssetInfo {
                id: id.to_string(),
                symbol: id.to_uppercase(),
                name: id.to_string(),
                market_cap: (1000 - i as i64) as f64 * 1e9,
            })
            .collect();
        let mut histories = HashMap::new();
        for (k, &(id, drift, wiggle)) in specs.iter().enumerate() {
            let mut price = 100.0 * (k + 1) as f64;
            let freq = 0.6 + 0.4 * k as f64;
            let mut points = Vec::new();
            for t in 0..days {
                price *= 1.0 + drift + (t as f64 * freq + k as f64).sin() * wiggle;
                points.push(PricePoint::new(d(t), price));
            }
            histories.insert(id.to_string(), PriceHistory::new(points).unwrap());
        }
        PriceStore::new(assets, histories).unwrap()
    }

    #[test]
    fn session_seeds_builtin_strategies() {
        let store = test_store(800);
        let mut session = Session::new(store, None, SessionOptions::default()).unwrap();
        let names = session.registry().names();
        assert!(names.contains(&allocation::UNIFORM.to_string()));
        assert!(names.contains(&allocation::MARKOWITZ.to_string()));
        assert!(session.performance().is_ok());
    }

    #[test]
    fn window_outside_history_is_rejected() {
        let store = test_store(800);
        let mut session = Session::new(store, None, SessionOptions::default()).unwrap();
        let bad = DateWindow::new(d(-100), d(10)).unwrap();
        assert!(session.set_window(bad).is_err());
    }

    #[test]
    fn set_window_invalidates_derived_tables() {
        let store = test_store(800);
        let window = DateWindow::new(d(500), d(799)).unwrap();
        let mut session =
            Session::new(store, Some(window), SessionOptions::default()).unwrap();
        let before = session.unified().unwrap().dates().len();

        let shorter = DateWindow::new(d(700), d(799)).unwrap();
        session.set_window(shorter).unwrap();
        let after = session.unified().unwrap().dates().len();
        assert!(after < before);
        assert_eq!(session.window(), shorter);
    }

    #[test]
    fn add_strategy_appears_in_unified_table() {
        let store = test_store(800);
        let mut session = Session::new(store, None, SessionOptions::default()).unwrap();
        session
            .add_strategy("Mine", &[("alpha".to_string(), 2.0), ("beta".to_string(), 1.0)])
            .unwrap();
        let names = session.unified().unwrap().column_names();
        assert!(names.contains(&"Mine".to_string()));
    }

    #[test]
    fn duplicate_strategy_leaves_session_usable() {
        let store = test_store(800);
        let mut session = Session::new(store, None, SessionOptions::default()).unwrap();
        session
            .add_strategy("Mine", &[("alpha".to_string(), 1.0)])
            .unwrap();
        let err = session.add_strategy("Mine", &[("beta".to_string(), 1.0)]);
        assert!(matches!(err, Err(PortfolioError::DuplicateStrategy(_))));
        assert!(session.performance().is_ok());
    }

    #[test]
    fn max_coins_caps_investable_set() {
        let store = test_store(800);
        let options = SessionOptions {
            max_coins: 1,
            ..SessionOptions::default()
        };
        let mut session = Session::new(store, None, options).unwrap();
        assert_eq!(session.investable().to_vec(), vec!["alpha".to_string()]);
    }
}
