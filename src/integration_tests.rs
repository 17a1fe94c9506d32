// Integration tests for end-to-end analyses across the pipeline

#[cfg(test)]
mod integration_tests {
    use crate::analytics::{
        breach_probability, composite_score, estimate_volatility, pairwise_correlations,
        PriceSeries, ScoringInputs,
    };
    use crate::asset_key::AssetKey;
    use crate::config::RiskModelConfig;
    use crate::error::RiskError;
    use crate::note::{CallStructure, CreditRating, NoteTerms, ProtectionType};
    use crate::risk::RiskAnalyzer;
    use crate::sqlite_provider::SqliteDataProvider;
    use crate::time_series::{
        DataProviderError, DateRange, InMemoryDataProvider, PriceHistorySource, TimeSeriesPoint,
    };
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;
    use tokio::sync::Barrier;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    }

    /// Deterministic oscillating price path ending on `as_of`.
    fn synthetic_history(days: usize, amplitude: f64, phase: f64) -> Vec<TimeSeriesPoint> {
        let end = Utc.with_ymd_and_hms(2024, 12, 31, 21, 0, 0).unwrap();
        let mut price = 100.0;
        (0..days)
            .map(|i| {
                if i > 0 {
                    price *= (amplitude * (i as f64 * 0.7 + phase).sin()).exp();
                }
                TimeSeriesPoint::new(end - Duration::days((days - 1 - i) as i64), price)
            })
            .collect()
    }

    fn note(assets: &[&str], protection_type: ProtectionType, call_structure: CallStructure) -> NoteTerms {
        NoteTerms {
            id: Some("TEST-1".to_string()),
            issuer: Some("Example Bank".to_string()),
            name: Some("Worst-of autocall".to_string()),
            credit_rating: CreditRating::AMinus,
            maturity_months: 24,
            call_structure,
            protection_type,
            protection_level: 70.0,
            coupon: Some(9.25),
            assets: assets.iter().map(|a| AssetKey::new(*a).unwrap()).collect(),
        }
    }

    fn key(ticker: &str) -> AssetKey {
        AssetKey::new(ticker).unwrap()
    }

    /// Full pipeline result matches composing the components by hand.
    #[tokio::test]
    async fn test_three_asset_basket_matches_components() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_data(key("SPY"), synthetic_history(300, 0.010, 0.0));
        provider.add_data(key("QQQ"), synthetic_history(300, 0.014, 0.4));
        provider.add_data(key("GLD"), synthetic_history(300, 0.008, 2.5));

        let terms = note(
            &["SPY", "QQQ", "GLD"],
            ProtectionType::SoftBarrier,
            CallStructure::Autocallable { no_call_period_months: 3 },
        );
        let config = RiskModelConfig::default();
        let result = RiskAnalyzer::new(provider.clone())
            .analyze_as_of(&terms, as_of())
            .await
            .unwrap();

        // Recompute by hand
        let range = DateRange::trailing_days(as_of(), config.lookback_days).unwrap();
        let mut probabilities = Vec::new();
        let mut returns = Vec::new();
        for asset in &terms.assets {
            let points = crate::time_series::DataProvider::get_time_series(&provider, asset, &range).unwrap();
            let estimate = estimate_volatility(&PriceSeries::new(asset.clone(), points), 252.0).unwrap();
            let p = breach_probability(
                estimate.last_price,
                estimate.last_price * 0.70,
                estimate.annual_volatility,
                2.0,
                0.045,
            )
            .unwrap();
            probabilities.push(p);
            returns.push(estimate.returns);
        }
        let correlations = pairwise_correlations(&returns);
        assert_eq!(correlations.len(), 3);
        let expected = composite_score(
            &ScoringInputs {
                credit_rating: &terms.credit_rating,
                years_to_maturity: 2.0,
                protection_type: terms.protection_type,
                asset_probabilities: &probabilities,
                correlations: &correlations,
                no_call_period_months: Some(3),
            },
            &config,
        );

        assert_eq!(result.score, expected.final_score);
        assert_relative_eq!(result.correlation_penalty, expected.correlation_penalty, epsilon = 1e-12);
        assert_eq!(result.probabilities.len(), 3);
        for (metric, p) in result.probabilities.iter().zip(&probabilities) {
            assert_relative_eq!(metric.breach_probability, p * 100.0, epsilon = 1e-9);
            assert!(metric.annual_volatility > 0.0);
        }
        assert_eq!(
            result.summary,
            "Based on SPY, QQQ, GLD with Soft Barrier at 70%"
        );
    }

    /// Metrics come back in basket order regardless of data source order.
    #[tokio::test]
    async fn test_metrics_follow_basket_order() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_data(key("XLE"), synthetic_history(60, 0.02, 1.0));
        provider.add_data(key("XLF"), synthetic_history(60, 0.01, 0.0));

        let terms = note(&["XLF", "XLE"], ProtectionType::HardBuffer, CallStructure::NonCallable);
        let result = RiskAnalyzer::new(provider).analyze_as_of(&terms, as_of()).await.unwrap();

        let order: Vec<&str> = result.probabilities.iter().map(|m| m.asset.as_str()).collect();
        assert_eq!(order, vec!["XLF", "XLE"]);
        assert!(result.correlation_penalty >= 1.0 && result.correlation_penalty <= 1.5);
    }

    /// Series of different lengths are correlated on their common trailing window.
    #[tokio::test]
    async fn test_uneven_histories_are_aligned() {
        let mut provider = InMemoryDataProvider::new();
        let long = synthetic_history(250, 0.01, 0.0);
        // Identical path over the last 100 days: perfectly correlated there
        let short = long[150..].to_vec();
        provider.add_data(key("SPY"), long);
        provider.add_data(key("IVV"), short);

        let terms = note(&["SPY", "IVV"], ProtectionType::SoftBarrier, CallStructure::NonCallable);
        let result = RiskAnalyzer::new(provider).analyze_as_of(&terms, as_of()).await.unwrap();

        assert_relative_eq!(result.correlation_penalty, 1.0, epsilon = 1e-9);
    }

    /// Constant prices mean zero volatility: deterministic, never NaN.
    #[tokio::test]
    async fn test_flat_history_yields_zero_breach() {
        let mut provider = InMemoryDataProvider::new();
        let flat: Vec<TimeSeriesPoint> = synthetic_history(30, 0.0, 0.0);
        provider.add_data(key("TLT"), flat);

        let terms = note(&["TLT"], ProtectionType::SoftBarrier, CallStructure::NonCallable);
        let result = RiskAnalyzer::new(provider).analyze_as_of(&terms, as_of()).await.unwrap();

        assert_eq!(result.probabilities[0].annual_volatility, 0.0);
        assert_eq!(result.probabilities[0].breach_probability, 0.0);
        // Market risk 0, A- credit 60 -> 6
        assert_eq!(result.score, 6);
    }

    #[tokio::test]
    async fn test_single_point_history_aborts_whole_basket() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_data(key("SPY"), synthetic_history(100, 0.01, 0.0));
        provider.add_data(key("FEZ"), synthetic_history(1, 0.01, 0.0));

        let terms = note(&["SPY", "FEZ"], ProtectionType::SoftBarrier, CallStructure::NonCallable);
        let err = RiskAnalyzer::new(provider).analyze_as_of(&terms, as_of()).await.unwrap_err();

        assert_eq!(
            err,
            RiskError::InsufficientData { asset: key("FEZ"), points: 1 }
        );
    }

    #[tokio::test]
    async fn test_unknown_asset_aborts_with_data_unavailable() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_data(key("SPY"), synthetic_history(100, 0.01, 0.0));

        let terms = note(&["SPY", "EFA"], ProtectionType::SoftBarrier, CallStructure::NonCallable);
        let err = RiskAnalyzer::new(provider).analyze_as_of(&terms, as_of()).await.unwrap_err();

        match err {
            RiskError::DataUnavailable { asset, .. } => assert_eq!(asset, key("EFA")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// History outside the lookback window is not used.
    #[tokio::test]
    async fn test_stale_history_is_unavailable() {
        let mut provider = InMemoryDataProvider::new();
        provider.add_data(key("DIA"), synthetic_history(100, 0.01, 0.0));

        let terms = note(&["DIA"], ProtectionType::SoftBarrier, CallStructure::NonCallable);
        let much_later = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        let err = RiskAnalyzer::new(provider).analyze_as_of(&terms, much_later).await.unwrap_err();

        assert!(matches!(err, RiskError::DataUnavailable { .. }));
    }

    /// Source whose requests only complete once every basket asset has asked.
    struct RendezvousSource {
        inner: InMemoryDataProvider,
        barrier: Arc<Barrier>,
    }

    #[async_trait]
    impl PriceHistorySource for RendezvousSource {
        async fn fetch_history(
            &self,
            asset: &AssetKey,
            range: &DateRange,
        ) -> Result<Vec<TimeSeriesPoint>, DataProviderError> {
            self.barrier.wait().await;
            self.inner.fetch_history(asset, range).await
        }
    }

    #[tokio::test]
    async fn test_histories_are_fetched_concurrently() {
        let mut inner = InMemoryDataProvider::new();
        for (i, ticker) in ["SPY", "QQQ", "IWM", "DIA"].iter().enumerate() {
            inner.add_data(key(ticker), synthetic_history(80, 0.01, i as f64));
        }
        let source = RendezvousSource {
            inner,
            barrier: Arc::new(Barrier::new(4)),
        };

        let terms = note(&["SPY", "QQQ", "IWM", "DIA"], ProtectionType::SoftBarrier, CallStructure::NonCallable);
        let analyzer = RiskAnalyzer::new(source);
        let analysis = analyzer.analyze_as_of(&terms, as_of());
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), analysis)
            .await
            .expect("sequential fetching would never pass the barrier")
            .unwrap();

        assert_eq!(result.probabilities.len(), 4);
    }

    /// SQLite store behind a tokio mutex drives the same pipeline.
    #[tokio::test]
    async fn test_sqlite_store_as_source() {
        let mut store = SqliteDataProvider::new_in_memory().unwrap();
        store.insert_time_series_batch(&key("SPY"), &synthetic_history(120, 0.012, 0.0)).unwrap();
        store.insert_time_series_batch(&key("QQQ"), &synthetic_history(120, 0.015, 0.9)).unwrap();

        let mut memory = InMemoryDataProvider::new();
        memory.add_data(key("SPY"), synthetic_history(120, 0.012, 0.0));
        memory.add_data(key("QQQ"), synthetic_history(120, 0.015, 0.9));

        let terms = note(
            &["SPY", "QQQ"],
            ProtectionType::HardBuffer,
            CallStructure::Autocallable { no_call_period_months: 12 },
        );
        let from_sqlite = RiskAnalyzer::new(tokio::sync::Mutex::new(store))
            .analyze_as_of(&terms, as_of())
            .await
            .unwrap();
        let from_memory = RiskAnalyzer::new(memory).analyze_as_of(&terms, as_of()).await.unwrap();

        assert_eq!(from_sqlite.score, from_memory.score);
        assert_relative_eq!(
            from_sqlite.correlation_penalty,
            from_memory.correlation_penalty,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_result_serializes_for_presentation() {
        let result = crate::risk::RiskAnalysisResult {
            score: 42,
            probabilities: vec![crate::risk::AssetRiskMetric {
                asset: key("SPY"),
                breach_probability: 5.9,
                annual_volatility: 0.2,
            }],
            correlation_penalty: 1.0,
            summary: "Based on SPY with Soft Barrier at 75%".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["score"], 42);
        assert_eq!(json["probabilities"][0]["asset"], "SPY");
    }
}
