//! Analysis orchestration: from note terms and a market data source to a
//! complete [`RiskAnalysisResult`].

use crate::analytics::{
    breach_probability, composite_score, estimate_volatility, pairwise_correlations, PriceSeries,
    ScoringInputs,
};
use crate::asset_key::AssetKey;
use crate::config::RiskModelConfig;
use crate::error::RiskError;
use crate::note::NoteTerms;
use crate::time_series::{DateRange, PriceHistorySource};
use chrono::{NaiveDate, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-asset output of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRiskMetric {
    pub asset: AssetKey,
    /// Probability of finishing at or below the barrier, in percent (0-100)
    pub breach_probability: f64,
    pub annual_volatility: f64,
}

/// Result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysisResult {
    /// Composite risk score, 0 (lowest) to 100
    pub score: u8,
    /// One entry per basket asset, in basket order
    pub probabilities: Vec<AssetRiskMetric>,
    /// Worst-of multiplier, >= 1.0 (exactly 1.0 for a single asset)
    pub correlation_penalty: f64,
    pub summary: String,
}

/// Runs the risk pipeline against a market data source.
///
/// Each call is independent; the analyzer holds no state between analyses.
#[derive(Debug, Clone)]
pub struct RiskAnalyzer<S> {
    source: S,
    config: RiskModelConfig,
}

impl<S: PriceHistorySource> RiskAnalyzer<S> {
    /// Creates an analyzer with the default model constants.
    pub fn new(source: S) -> Self {
        Self::with_config(source, RiskModelConfig::default())
    }

    pub fn with_config(source: S, config: RiskModelConfig) -> Self {
        RiskAnalyzer { source, config }
    }

    pub fn config(&self) -> &RiskModelConfig {
        &self.config
    }

    /// Analyzes a note using history up to today.
    pub async fn analyze(&self, terms: &NoteTerms) -> Result<RiskAnalysisResult, RiskError> {
        self.analyze_as_of(terms, Utc::now().date_naive()).await
    }

    /// Analyzes a note using the `lookback_days` of history ending at `as_of`.
    ///
    /// # Errors
    /// Fails on invalid terms, on the first asset whose history is missing
    /// or shorter than two points, and on degenerate numeric input. No
    /// partial result is ever returned.
    pub async fn analyze_as_of(
        &self,
        terms: &NoteTerms,
        as_of: NaiveDate,
    ) -> Result<RiskAnalysisResult, RiskError> {
        terms.validate()?;

        let range = DateRange::trailing_days(as_of, self.config.lookback_days).ok_or_else(|| {
            RiskError::DegenerateInput(format!(
                "lookback of {} days before {} is out of the calendar range",
                self.config.lookback_days, as_of
            ))
        })?;
        info!(
            assets = terms.assets.len(),
            start = %range.start,
            end = %range.end,
            "starting risk analysis"
        );

        // Fan out one request per asset; every series is needed before
        // correlations can be computed, and the first failure aborts.
        let histories = try_join_all(
            terms
                .assets
                .iter()
                .map(|asset| self.fetch_series(asset, &range)),
        )
        .await?;

        let years_to_maturity = terms.years_to_maturity();
        let mut metrics = Vec::with_capacity(histories.len());
        let mut probabilities = Vec::with_capacity(histories.len());
        let mut returns = Vec::with_capacity(histories.len());

        for series in &histories {
            let estimate = estimate_volatility(series, self.config.trading_days_per_year)?;
            let barrier_price = estimate.last_price * (terms.protection_level / 100.0);
            let probability = breach_probability(
                estimate.last_price,
                barrier_price,
                estimate.annual_volatility,
                years_to_maturity,
                self.config.risk_free_rate,
            )?;

            debug!(
                asset = %series.asset(),
                points = series.len(),
                spot = estimate.last_price,
                barrier = barrier_price,
                volatility = estimate.annual_volatility,
                probability,
                "asset breach estimate"
            );

            metrics.push(AssetRiskMetric {
                asset: series.asset().clone(),
                breach_probability: probability * 100.0,
                annual_volatility: estimate.annual_volatility,
            });
            probabilities.push(probability);
            returns.push(estimate.returns);
        }

        let correlations = pairwise_correlations(&returns);
        let breakdown = composite_score(
            &ScoringInputs {
                credit_rating: &terms.credit_rating,
                years_to_maturity,
                protection_type: terms.protection_type,
                asset_probabilities: &probabilities,
                correlations: &correlations,
                no_call_period_months: terms.call_structure.no_call_period_months(),
            },
            &self.config,
        );

        info!(
            score = breakdown.final_score,
            market_risk = breakdown.market_risk_score,
            credit_risk = breakdown.credit_risk_score,
            correlation_penalty = breakdown.correlation_penalty,
            "risk analysis complete"
        );

        Ok(RiskAnalysisResult {
            score: breakdown.final_score,
            probabilities: metrics,
            correlation_penalty: breakdown.correlation_penalty,
            summary: summarize(terms),
        })
    }

    async fn fetch_series(&self, asset: &AssetKey, range: &DateRange) -> Result<PriceSeries, RiskError> {
        let points = self
            .source
            .fetch_history(asset, range)
            .await
            .map_err(|e| RiskError::DataUnavailable {
                asset: asset.clone(),
                reason: e.to_string(),
            })?;

        let series = PriceSeries::new(asset.clone(), points);
        if series.is_empty() {
            return Err(RiskError::DataUnavailable {
                asset: asset.clone(),
                reason: format!("no prices between {} and {}", range.start, range.end),
            });
        }

        Ok(series)
    }
}

fn summarize(terms: &NoteTerms) -> String {
    let assets: Vec<&str> = terms.assets.iter().map(AssetKey::as_str).collect();
    format!(
        "Based on {} with {} at {}%",
        assets.join(", "),
        terms.protection_type,
        terms.protection_level
    )
}
