//! Risk and performance metrics over daily price series.
//!
//! All functions operate on plain price slices and return fractional values
//! (0.10 = 10%). Annualization assumes 365 trading days: crypto markets trade
//! every day, unlike traditional 252-day markets.

use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, Result};

/// Days per year used for annualization.
pub const TRADING_DAYS: f64 = 365.0;

/// The single deepest peak-to-trough decline of a price series.
///
/// Only the deepest drawdown is reported, not the longest or the most recent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    /// Decline from peak to trough as a positive fraction of the peak.
    pub magnitude: f64,
    /// Index of the peak preceding the trough.
    pub peak: usize,
    /// Index of the trough.
    pub trough: usize,
}

fn check_series(prices: &[f64]) -> Result<()> {
    if prices.len() < 2 {
        return Err(PortfolioError::InsufficientData(format!(
            "need at least 2 prices, have {}",
            prices.len()
        )));
    }
    if prices[0] <= 0.0 {
        return Err(PortfolioError::NonPositivePrice(prices[0]));
    }
    Ok(())
}

/// Total return over the series: `prices[last] / prices[0] - 1`.
pub fn absolute_return(prices: &[f64]) -> Result<f64> {
    check_series(prices)?;
    Ok(prices[prices.len() - 1] / prices[0] - 1.0)
}

/// Absolute return compounded to a 365-day annualized rate.
///
/// Operates on the raw fractional return, never a pre-scaled percentage:
/// `(1 + r)^(365/n) - 1` with `n` the series length.
pub fn annual_return(prices: &[f64]) -> Result<f64> {
    let r = absolute_return(prices)?;
    Ok((1.0 + r).powf(TRADING_DAYS / prices.len() as f64) - 1.0)
}

/// Annualized volatility: sample standard deviation of day-over-day
/// percentage change, scaled by `sqrt(365)`.
pub fn annual_vol(prices: &[f64]) -> Result<f64> {
    check_series(prices)?;
    let mut changes = Vec::with_capacity(prices.len() - 1);
    for w in prices.windows(2) {
        if w[0] <= 0.0 {
            return Err(PortfolioError::NonPositivePrice(w[0]));
        }
        changes.push(w[1] / w[0] - 1.0);
    }
    if changes.len() < 2 {
        return Err(PortfolioError::InsufficientData(
            "need at least 2 returns for volatility".to_string(),
        ));
    }
    let n = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / n;
    // Sample variance (n-1 divisor).
    let variance = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Ok(variance.sqrt() * TRADING_DAYS.sqrt())
}

/// Maximum drawdown with the indices of its peak and trough.
///
/// The trough is the point of largest drop below any prior running maximum;
/// the peak is the highest price before the trough. A monotonically
/// non-decreasing series yields magnitude 0 with peak == trough == 0.
pub fn max_drawdown(prices: &[f64]) -> Result<Drawdown> {
    check_series(prices)?;

    let mut running_max = prices[0];
    let mut trough = 0;
    let mut deepest = 0.0;
    for (i, &p) in prices.iter().enumerate() {
        running_max = running_max.max(p);
        let drop = running_max - p;
        if drop > deepest {
            deepest = drop;
            trough = i;
        }
    }

    if trough == 0 {
        // Never fell below a prior peak.
        return Ok(Drawdown {
            magnitude: 0.0,
            peak: 0,
            trough: 0,
        });
    }

    let mut peak = 0;
    for i in 1..trough {
        if prices[i] > prices[peak] {
            peak = i;
        }
    }

    let magnitude = if prices[peak] > 0.0 {
        (prices[peak] - prices[trough]) / prices[peak]
    } else {
        0.0
    };

    Ok(Drawdown {
        magnitude,
        peak,
        trough,
    })
}

/// Absolute return per unit of annualized volatility.
///
/// A simplified Sharpe-like ranking metric. Zero volatility makes the ratio
/// undefined and yields NaN rather than an error.
pub fn risk_adjusted_return(prices: &[f64]) -> Result<f64> {
    let rtn = absolute_return(prices)?;
    let vol = annual_vol(prices)?;
    if vol == 0.0 {
        return Ok(f64::NAN);
    }
    Ok(rtn / vol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_return_matches_ratio() {
        let prices = vec![100.0, 110.0, 121.0];
        let r = absolute_return(&prices).unwrap();
        assert!((r - 0.21).abs() < 1e-12);
    }

    #[test]
    fn absolute_return_zero_on_constant_series() {
        let prices = vec![42.0; 10];
        assert_eq!(absolute_return(&prices).unwrap(), 0.0);
    }

    #[test]
    fn absolute_return_rejects_short_series() {
        assert!(absolute_return(&[100.0]).is_err());
        assert!(absolute_return(&[]).is_err());
    }

    #[test]
    fn absolute_return_rejects_non_positive_base() {
        assert!(absolute_return(&[0.0, 1.0]).is_err());
        assert!(absolute_return(&[-5.0, 1.0]).is_err());
    }

    #[test]
    fn annual_return_compounds_fractional_return() {
        // A series that doubles over exactly one year annualizes to +100%.
        let mut prices = vec![0.0; 365];
        for (i, p) in prices.iter_mut().enumerate() {
            *p = 100.0 * 2.0_f64.powf(i as f64 / 364.0);
        }
        prices[364] = 200.0;
        let r = annual_return(&prices).unwrap();
        assert!((r - 1.0).abs() < 1e-9, "annualized {}", r);
    }

    #[test]
    fn annual_vol_zero_on_constant_series() {
        let prices = vec![50.0; 30];
        assert_eq!(annual_vol(&prices).unwrap(), 0.0);
    }

    #[test]
    fn annual_vol_scales_daily_std() {
        // Alternating +10%/-10% days: sample std of changes times sqrt(365).
        let mut prices = vec![100.0];
        for i in 0..20 {
            let last = *prices.last().unwrap();
            let factor = if i % 2 == 0 { 1.1 } else { 0.9 };
            prices.push(last * factor);
        }
        let vol = annual_vol(&prices).unwrap();
        assert!(vol > 0.0);
        let changes: Vec<f64> = prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        let n = changes.len() as f64;
        let mean = changes.iter().sum::<f64>() / n;
        let var = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert!((vol - var.sqrt() * 365.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_on_known_series() {
        let dd = max_drawdown(&[100.0, 50.0, 200.0]).unwrap();
        assert!((dd.magnitude - 0.5).abs() < 1e-12);
        assert_eq!(dd.peak, 0);
        assert_eq!(dd.trough, 1);
    }

    #[test]
    fn max_drawdown_zero_on_increasing_series() {
        let prices: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let dd = max_drawdown(&prices).unwrap();
        assert_eq!(dd.magnitude, 0.0);
        assert_eq!(dd.peak, 0);
        assert_eq!(dd.trough, 0);
    }

    #[test]
    fn max_drawdown_picks_deepest_episode() {
        // Two drawdowns: 100->80 (20%) and 120->60 (50%).
        let prices = vec![100.0, 80.0, 120.0, 60.0, 90.0];
        let dd = max_drawdown(&prices).unwrap();
        assert!((dd.magnitude - 0.5).abs() < 1e-12);
        assert_eq!(dd.peak, 2);
        assert_eq!(dd.trough, 3);
    }

    #[test]
    fn risk_adjusted_return_nan_on_zero_vol() {
        let prices = vec![10.0; 5];
        assert!(risk_adjusted_return(&prices).unwrap().is_nan());
    }

    #[test]
    fn risk_adjusted_return_is_ratio() {
        let prices = vec![100.0, 102.0, 99.0, 105.0, 110.0];
        let ratio = risk_adjusted_return(&prices).unwrap();
        let expected = absolute_return(&prices).unwrap() / annual_vol(&prices).unwrap();
        assert!((ratio - expected).abs() < 1e-12);
    }
}
