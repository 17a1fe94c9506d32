//! Daily log returns and annualized volatility.

use crate::asset_key::AssetKey;
use crate::error::RiskError;
use crate::time_series::TimeSeriesPoint;

/// Closing prices for one asset, ascending by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    asset: AssetKey,
    points: Vec<TimeSeriesPoint>,
}

impl PriceSeries {
    /// Wraps raw collaborator output, sorting by timestamp since sources
    /// are not required to return points in order.
    pub fn new(asset: AssetKey, mut points: Vec<TimeSeriesPoint>) -> Self {
        points.sort_by_key(|point| point.timestamp);
        PriceSeries { asset, points }
    }

    pub fn asset(&self) -> &AssetKey {
        &self.asset
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent close.
    pub fn last_price(&self) -> Option<f64> {
        self.points.last().map(|point| point.close_price)
    }
}

/// Output of the volatility estimator for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityEstimate {
    /// Daily log returns, oldest first; one fewer than the price count
    pub returns: Vec<f64>,
    /// Sample standard deviation of `returns` scaled by sqrt(trading days)
    pub annual_volatility: f64,
    /// Most recent close, used as spot
    pub last_price: f64,
}

/// Calculates log returns between adjacent prices: ln(P_t / P_{t-1}).
///
/// Prices must be positive and finite; see [`estimate_volatility`] for the
/// validated entry point.
///
/// # Examples
/// ```
/// use note_risk::analytics::log_returns;
///
/// let returns = log_returns(&[100.0, 105.0, 103.0]);
/// assert_eq!(returns.len(), 2);
/// assert!((returns[0] - (105.0_f64 / 100.0).ln()).abs() < 1e-12);
/// ```
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|pair| (pair[1] / pair[0]).ln())
        .collect()
}

/// Sample standard deviation (n - 1 denominator).
///
/// Fewer than two values carry no spread, so the result is 0.0.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_squared_diff: f64 = values.iter().map(|&value| (value - mean).powi(2)).sum();

    (sum_squared_diff / (n - 1.0)).sqrt()
}

/// Estimates annualized volatility and spot from a price series.
///
/// # Errors
/// - `InsufficientData` when the series has fewer than two prices
/// - `DegenerateInput` when any price is zero, negative, or non-finite
pub fn estimate_volatility(
    series: &PriceSeries,
    trading_days_per_year: f64,
) -> Result<VolatilityEstimate, RiskError> {
    if series.len() < 2 {
        return Err(RiskError::InsufficientData {
            asset: series.asset().clone(),
            points: series.len(),
        });
    }

    let closes: Vec<f64> = series.points().iter().map(|p| p.close_price).collect();
    if let Some(bad) = closes.iter().find(|&&price| !(price.is_finite() && price > 0.0)) {
        return Err(RiskError::DegenerateInput(format!(
            "{} has a non-positive or non-finite close ({})",
            series.asset(),
            bad
        )));
    }

    let returns = log_returns(&closes);
    let annual_volatility = sample_std_dev(&returns) * trading_days_per_year.sqrt();
    let last_price = closes[closes.len() - 1];

    Ok(VolatilityEstimate {
        returns,
        annual_volatility,
        last_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn series(prices: &[f64]) -> PriceSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| TimeSeriesPoint::new(base + Duration::days(i as i64), p))
            .collect();
        PriceSeries::new(AssetKey::new("SPY").unwrap(), points)
    }

    #[test]
    fn test_log_returns_has_one_fewer_element() {
        assert!(log_returns(&[]).is_empty());
        assert!(log_returns(&[100.0]).is_empty());
        assert_eq!(log_returns(&[100.0, 101.0, 99.0]).len(), 2);
    }

    #[test]
    fn test_sample_std_dev_uses_n_minus_one() {
        // Population std dev of [1, 2, 3] is 0.8165; sample is exactly 1
        assert_relative_eq!(sample_std_dev(&[1.0, 2.0, 3.0]), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sample_std_dev_of_single_value_is_zero() {
        assert_eq!(sample_std_dev(&[0.013]), 0.0);
        assert_eq!(sample_std_dev(&[]), 0.0);
    }

    #[test]
    fn test_series_is_sorted_on_construction() {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let s = PriceSeries::new(
            AssetKey::new("SPY").unwrap(),
            vec![
                TimeSeriesPoint::new(base + Duration::days(2), 102.0),
                TimeSeriesPoint::new(base, 100.0),
                TimeSeriesPoint::new(base + Duration::days(1), 101.0),
            ],
        );
        let closes: Vec<f64> = s.points().iter().map(|p| p.close_price).collect();
        assert_eq!(closes, vec![100.0, 101.0, 102.0]);
        assert_eq!(s.last_price(), Some(102.0));
    }

    #[test]
    fn test_estimate_annualizes_by_sqrt_trading_days() {
        let prices = [100.0, 102.0, 99.0, 101.0, 103.0];
        let estimate = estimate_volatility(&series(&prices), 252.0).unwrap();

        let daily = sample_std_dev(&log_returns(&prices));
        assert_eq!(estimate.returns.len(), 4);
        assert_relative_eq!(estimate.annual_volatility, daily * 252.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(estimate.last_price, 103.0);
    }

    #[test]
    fn test_two_prices_give_zero_volatility() {
        let estimate = estimate_volatility(&series(&[100.0, 110.0]), 252.0).unwrap();
        assert_eq!(estimate.returns.len(), 1);
        assert_eq!(estimate.annual_volatility, 0.0);
    }

    #[test]
    fn test_single_price_is_insufficient() {
        let err = estimate_volatility(&series(&[100.0]), 252.0).unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData { points: 1, .. }));
    }

    #[test]
    fn test_non_positive_price_is_degenerate() {
        let err = estimate_volatility(&series(&[100.0, 0.0, 101.0]), 252.0).unwrap_err();
        assert!(matches!(err, RiskError::DegenerateInput(_)));

        let err = estimate_volatility(&series(&[100.0, f64::NAN]), 252.0).unwrap_err();
        assert!(matches!(err, RiskError::DegenerateInput(_)));
    }
}
