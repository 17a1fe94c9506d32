//! Closed-form probability that an asset finishes at or below its barrier.

use crate::error::RiskError;

/// Standard normal cumulative distribution.
///
/// Zelen & Severo polynomial approximation (Abramowitz & Stegun 26.2.17),
/// absolute error below 7.5e-8 over the real line.
pub fn normal_cdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_4;

    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let density = INV_SQRT_2PI * (-x * x / 2.0).exp();
    let poly = t
        * (0.319_381_53
            + t * (-0.356_563_782
                + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let tail = density * poly;

    if x > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Probability that a geometric Brownian motion started at `current_price`
/// with drift `risk_free_rate` and the given annualized volatility ends at or
/// below `barrier_price` after `years_to_maturity` years: Φ(-d2).
///
/// Policies:
/// - `years_to_maturity <= 0` returns 0.0 before any other check.
/// - Zero volatility is the deterministic limit: 1.0 if the spot is already
///   at or below the barrier, otherwise 0.0.
///
/// # Errors
/// `DegenerateInput` for non-positive or non-finite prices, negative or
/// non-finite volatility, or an infinite horizon.
pub fn breach_probability(
    current_price: f64,
    barrier_price: f64,
    volatility: f64,
    years_to_maturity: f64,
    risk_free_rate: f64,
) -> Result<f64, RiskError> {
    if years_to_maturity <= 0.0 {
        return Ok(0.0);
    }
    if !years_to_maturity.is_finite() {
        return Err(RiskError::DegenerateInput(format!(
            "time to maturity must be finite, got {}",
            years_to_maturity
        )));
    }
    if !(current_price.is_finite() && current_price > 0.0) {
        return Err(RiskError::DegenerateInput(format!(
            "spot price must be positive, got {}",
            current_price
        )));
    }
    if !(barrier_price.is_finite() && barrier_price > 0.0) {
        return Err(RiskError::DegenerateInput(format!(
            "barrier price must be positive, got {}",
            barrier_price
        )));
    }
    if !(volatility.is_finite() && volatility >= 0.0) {
        return Err(RiskError::DegenerateInput(format!(
            "volatility must be non-negative, got {}",
            volatility
        )));
    }

    if volatility == 0.0 {
        return Ok(if current_price <= barrier_price { 1.0 } else { 0.0 });
    }

    let drift = (risk_free_rate - 0.5 * volatility * volatility) * years_to_maturity;
    let d2 = ((current_price / barrier_price).ln() + drift) / (volatility * years_to_maturity.sqrt());

    Ok(normal_cdf(-d2).clamp(0.0, 1.0))
}
