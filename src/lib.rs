//! Coinfolio - a backtesting and analytics core for cryptocurrency portfolios.
//!
//! # Overview
//!
//! Coinfolio turns raw per-asset price histories into portfolio allocations,
//! rebased cumulative return series, and a consistent set of risk metrics for
//! ranking and charting:
//!
//! - **Risk metrics**: absolute/annualized return, annualized volatility,
//!   maximum drawdown with its peak/trough markers
//! - **Return series**: day-over-day returns and indexed-to-1 rebased series
//!   over arbitrary date windows, restricted to assets with complete history
//! - **Weight strategies**: Uniform, Markowitz max-Sharpe (long-only, fully
//!   invested, trailing-lookback estimation), and bespoke user weights
//! - **Portfolio aggregation**: weighted portfolio series and a unified table
//!   joining every strategy with every investable asset
//! - **Performance table**: ranked metrics for every portfolio and coin
//!
//! # Quick Start
//!
//! ```no_run
//! use coinfolio::data::{DataConfig, PriceStore};
//! use coinfolio::session::{Session, SessionOptions};
//!
//! // Snapshot the market data once per session.
//! let store = PriceStore::load("data/assets.csv", "data/histories", &DataConfig::default())
//!     .unwrap();
//!
//! // The session owns the selected window, the strategy registry, and the
//! // memoized derived tables.
//! let mut session = Session::new(store, None, SessionOptions::default()).unwrap();
//!
//! // Register a bespoke strategy and rank everything.
//! session
//!     .add_strategy("Mine", &[("bitcoin".to_string(), 3.0), ("ethereum".to_string(), 1.0)])
//!     .unwrap();
//! let performance = session.performance().unwrap();
//! for row in performance.rows() {
//!     println!("{}: {:.2}%", row.name, row.return_pct);
//! }
//! ```
//!
//! # Design notes
//!
//! The price snapshot is immutable for the session lifetime; every derived
//! table is a pure function of (snapshot, window, registry) and memoized by
//! the session. Sparse data is an expected condition: assets without complete
//! history over a window are filtered out, and missing market caps default to
//! zero. Optimizer non-convergence is recoverable - prior weights are kept and
//! a warning is surfaced instead of a crash.

pub mod allocation;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod performance;
pub mod portfolio;
pub mod returns;
pub mod session;
pub mod types;

pub use allocation::{
    bespoke_weights, markowitz_weights, uniform_weights, MarkowitzParams, StrategyRegistry,
    WeightMap, MARKOWITZ, UNIFORM,
};
pub use config::AnalysisConfig;
pub use data::{DataConfig, PriceStore};
pub use error::{PortfolioError, Result};
pub use metrics::{
    absolute_return, annual_return, annual_vol, max_drawdown, risk_adjusted_return, Drawdown,
};
pub use performance::{
    PerformanceColumn, PerformanceFormatter, PerformanceRow, PerformanceTable,
};
pub use portfolio::{portfolio_returns, unify, UnifiedColumn, UnifiedTable};
pub use returns::{RebasedTable, ReturnTable};
pub use session::{Session, SessionOptions};
pub use types::{AssetInfo, AssetKind, DateWindow, PriceHistory, PricePoint};
