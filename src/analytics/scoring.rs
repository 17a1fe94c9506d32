//! Composite 0-100 risk score.
//!
//! Market risk (worst-of breach probability scaled by the correlation
//! penalty, then adjusted for call structure and protection design) is
//! blended with an ordinal credit-risk score. The call and protection
//! multipliers are heuristics, not calibrated estimates.

use crate::analytics::correlation::correlation_penalty;
use crate::config::RiskModelConfig;
use crate::note::{CreditRating, ProtectionType};
use serde::Serialize;
use tracing::trace;

/// Inputs to [`composite_score`].
#[derive(Debug, Clone, Copy)]
pub struct ScoringInputs<'a> {
    pub credit_rating: &'a CreditRating,
    pub years_to_maturity: f64,
    pub protection_type: ProtectionType,
    /// Per-asset breach probabilities in [0, 1]
    pub asset_probabilities: &'a [f64],
    /// Pairwise return correlations; empty for a single-asset basket
    pub correlations: &'a [f64],
    /// Present only for autocallable notes
    pub no_call_period_months: Option<u32>,
}

/// The final score along with the intermediate figures that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub correlation_penalty: f64,
    /// Market risk after adjustments, clamped to [0, 100]
    pub market_risk_score: f64,
    pub credit_risk_score: f64,
    pub final_score: u8,
}

/// Multiplier for the no-call lock-in. Short lock-ins raise the odds of an
/// early call before a downturn; long ones extend downturn exposure. The
/// band between the two thresholds is neutral.
pub fn call_structure_multiplier(no_call_period_months: Option<u32>, config: &RiskModelConfig) -> f64 {
    match no_call_period_months {
        Some(months) if months < config.short_no_call_months => config.short_no_call_multiplier,
        Some(months) if months >= config.long_no_call_months => config.long_no_call_multiplier,
        _ => 1.0,
    }
}

pub fn protection_multiplier(protection_type: ProtectionType, config: &RiskModelConfig) -> f64 {
    match protection_type {
        ProtectionType::HardBuffer => config.hard_buffer_multiplier,
        ProtectionType::SoftBarrier => 1.0,
    }
}

/// Scores a note. Pure: identical inputs always give identical output.
pub fn composite_score(inputs: &ScoringInputs<'_>, config: &RiskModelConfig) -> ScoreBreakdown {
    // Worst-of: the note is impaired if any single asset breaches
    let worst = inputs
        .asset_probabilities
        .iter()
        .copied()
        .fold(0.0_f64, f64::max);
    let penalty = correlation_penalty(inputs.correlations, config.correlation_penalty_weight);

    let market_risk_raw = worst * 100.0
        * penalty
        * call_structure_multiplier(inputs.no_call_period_months, config)
        * protection_multiplier(inputs.protection_type, config);
    let market_risk_score = market_risk_raw.clamp(0.0, 100.0);

    let credit_risk_score = config.credit_scale.score(inputs.credit_rating);

    let blended = market_risk_score * config.market_risk_weight
        + credit_risk_score * config.credit_risk_weight;
    let final_score = blended.round().clamp(0.0, 100.0) as u8;

    trace!(
        worst,
        penalty,
        market_risk_score,
        credit_risk_score,
        years_to_maturity = inputs.years_to_maturity,
        final_score,
        "composite score"
    );

    ScoreBreakdown {
        correlation_penalty: penalty,
        market_risk_score,
        credit_risk_score,
        final_score,
    }
}
