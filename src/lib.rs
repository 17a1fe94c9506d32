pub mod asset_key;
pub mod time_series;
pub mod sqlite_provider;
pub mod yahoo_finance;
pub mod config;
pub mod note;
pub mod error;
pub mod analytics;
pub mod risk;

#[cfg(test)]
mod integration_tests;

pub use asset_key::{AssetKey, AssetKeyError, KNOWN_UNDERLYINGS};
pub use time_series::{
    DataProvider, DataProviderError, DateRange, InMemoryDataProvider, PriceHistorySource,
    TimeSeriesPoint,
};
pub use sqlite_provider::SqliteDataProvider;
pub use yahoo_finance::{DownloadError, DownloadResult, DownloaderConfig, YahooFinanceDownloader};
pub use config::{ConfigError, CreditScale, RiskModelConfig};
pub use note::{CallStructure, CreditRating, NoteTerms, NoteTermsError, ProtectionType};
pub use error::{RiskError, USER_FACING_FAILURE};
pub use analytics::{
    breach_probability, composite_score, correlation_penalty, estimate_volatility,
    pairwise_correlations, ScoreBreakdown, ScoringInputs,
};
pub use risk::{AssetRiskMetric, RiskAnalysisResult, RiskAnalyzer};
