//! Model constants for the risk pipeline.
//!
//! Every number that shapes a score lives here under a name, so a model
//! review can see (and a test can override) exactly what the heuristics are.
//! Defaults are the constants the model is calibrated with.

use crate::note::CreditRating;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Upper bound on `lookback_days`: a century of history.
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

/// Ordinal credit-risk table: rating -> score on a 0 (best) to 100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditScale {
    pub scores: BTreeMap<CreditRating, f64>,
    /// Score for any rating missing from `scores`.
    pub unrated_score: f64,
}

impl Default for CreditScale {
    fn default() -> Self {
        let scores = CreditRating::SCALE
            .iter()
            .cloned()
            .zip((0u32..).map(|step| f64::from(step * 10)))
            .collect();

        CreditScale {
            scores,
            unrated_score: 50.0,
        }
    }
}

impl CreditScale {
    /// Looks up a rating, falling back to `unrated_score` when the table has no entry.
    pub fn score(&self, rating: &CreditRating) -> f64 {
        match self.scores.get(rating) {
            Some(score) => *score,
            None => self.unrated_score,
        }
    }
}

/// Named constants consumed by the breach model and the composite scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskModelConfig {
    /// Drift used in the breach statistic (default 0.045)
    pub risk_free_rate: f64,
    /// Annualization factor for daily volatility (default 252)
    pub trading_days_per_year: f64,
    /// Calendar days of price history requested per asset (default 365)
    pub lookback_days: u32,
    /// Slope of the worst-of penalty in (1 - mean correlation) (default 0.5)
    pub correlation_penalty_weight: f64,
    /// No-call periods below this many months earn the short multiplier (default 6)
    pub short_no_call_months: u32,
    /// No-call periods of at least this many months earn the long multiplier (default 12)
    pub long_no_call_months: u32,
    pub short_no_call_multiplier: f64,
    pub long_no_call_multiplier: f64,
    /// Market-risk reduction for a hard buffer (default 0.7)
    pub hard_buffer_multiplier: f64,
    pub market_risk_weight: f64,
    pub credit_risk_weight: f64,
    pub credit_scale: CreditScale,
}

impl Default for RiskModelConfig {
    fn default() -> Self {
        RiskModelConfig {
            risk_free_rate: 0.045,
            trading_days_per_year: 252.0,
            lookback_days: 365,
            correlation_penalty_weight: 0.5,
            short_no_call_months: 6,
            long_no_call_months: 12,
            short_no_call_multiplier: 0.95,
            long_no_call_multiplier: 1.05,
            hard_buffer_multiplier: 0.7,
            market_risk_weight: 0.90,
            credit_risk_weight: 0.10,
            credit_scale: CreditScale::default(),
        }
    }
}

impl RiskModelConfig {
    /// Loads a config from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RiskModelConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would break the score's [0, 100] range or the
    /// breach model's preconditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::Invalid("risk_free_rate must be finite".into()));
        }
        if !(self.trading_days_per_year.is_finite() && self.trading_days_per_year > 0.0) {
            return Err(ConfigError::Invalid("trading_days_per_year must be positive".into()));
        }
        if self.lookback_days == 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::Invalid(format!(
                "lookback_days must be between 1 and {}, got {}",
                MAX_LOOKBACK_DAYS, self.lookback_days
            )));
        }
        if self.short_no_call_months > self.long_no_call_months {
            return Err(ConfigError::Invalid(
                "short_no_call_months cannot exceed long_no_call_months".into(),
            ));
        }

        let non_negative = [
            ("correlation_penalty_weight", self.correlation_penalty_weight),
            ("short_no_call_multiplier", self.short_no_call_multiplier),
            ("long_no_call_multiplier", self.long_no_call_multiplier),
            ("hard_buffer_multiplier", self.hard_buffer_multiplier),
            ("market_risk_weight", self.market_risk_weight),
            ("credit_risk_weight", self.credit_risk_weight),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be non-negative", name)));
            }
        }

        let weight_sum = self.market_risk_weight + self.credit_risk_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::Invalid(format!(
                "market and credit weights must sum to 1, got {}",
                weight_sum
            )));
        }

        let scores = self
            .credit_scale
            .scores
            .values()
            .chain(std::iter::once(&self.credit_scale.unrated_score));
        for score in scores {
            if !(0.0..=100.0).contains(score) {
                return Err(ConfigError::Invalid(format!(
                    "credit scores must lie in [0, 100], got {}",
                    score
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
