use crate::asset_key::AssetKey;
use crate::sqlite_provider::SqliteDataProvider;
use crate::time_series::{DataProviderError, DateRange, PriceHistorySource, TimeSeriesPoint};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;
/// Upper bound on `DownloaderConfig::max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Configuration for Yahoo Finance downloader
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Maximum number of retry attempts after the first request (default: 3)
    pub max_retries: u32,
    /// Rate limit: requests per second (default: 1.0)
    pub requests_per_second: f64,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// API host (default: query1.finance.yahoo.com)
    pub base_url: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        DownloaderConfig {
            max_retries: 3,
            requests_per_second: 1.0,
            timeout_seconds: 30,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Yahoo Finance market data client.
///
/// Serves daily close history to the risk analyzer and can seed a local
/// SQLite price store. Retries and request pacing live here so the
/// analytics pipeline never has to care about them.
pub struct YahooFinanceDownloader {
    client: Client,
    config: DownloaderConfig,
    limiter: DefaultDirectRateLimiter,
}

impl fmt::Debug for YahooFinanceDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YahooFinanceDownloader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl YahooFinanceDownloader {
    /// Creates a new Yahoo Finance downloader with default configuration.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_config(DownloaderConfig::default())
    }

    /// Creates a new Yahoo Finance downloader with custom configuration.
    ///
    /// # Errors
    /// Returns `DownloadError::InvalidConfig` if the request rate is not a
    /// positive number or `max_retries` exceeds [`MAX_RETRIES`], or
    /// `ClientCreation` if the HTTP client cannot be built.
    pub fn with_config(config: DownloaderConfig) -> Result<Self, DownloadError> {
        if config.max_retries > MAX_RETRIES {
            return Err(DownloadError::InvalidConfig(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES, config.max_retries
            )));
        }
        if !config.requests_per_second.is_finite() || config.requests_per_second <= 0.0 {
            return Err(DownloadError::InvalidConfig(format!(
                "requests_per_second must be positive, got {}",
                config.requests_per_second
            )));
        }
        let period = 1.0 / config.requests_per_second;
        if !period.is_finite() {
            return Err(DownloadError::InvalidConfig(format!(
                "requests_per_second is too small: {}",
                config.requests_per_second
            )));
        }
        let quota = Quota::with_period(Duration::from_secs_f64(period))
            .ok_or_else(|| DownloadError::InvalidConfig("request period rounds to zero".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DownloadError::ClientCreation(e.to_string()))?;

        Ok(YahooFinanceDownloader {
            client,
            config,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Fetches raw CSV history for one symbol, without retries.
    ///
    /// # Errors
    /// Returns `DownloadError` if the request fails, the API answers with a
    /// non-success status, or the body cannot be read.
    pub async fn fetch_historical_data(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<String, DownloadError> {
        let start_timestamp = start_date.and_time(NaiveTime::MIN).and_utc().timestamp();
        let end_timestamp = end_date
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| DownloadError::InvalidDate(format!("Invalid end date {}", end_date)))?
            .and_utc()
            .timestamp();

        let url = format!(
            "{}/v7/finance/download/{}?period1={}&period2={}&interval=1d&events=history",
            self.config.base_url, symbol, start_timestamp, end_timestamp
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::ApiError {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| DownloadError::ParseError(e.to_string()))
    }

    /// Downloads and parses daily closes for one asset, retrying transient
    /// failures with exponential backoff.
    pub async fn download(
        &self,
        asset_key: &AssetKey,
        range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DownloadError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.until_ready().await;
            match self
                .fetch_historical_data(asset_key.as_str(), range.start, range.end)
                .await
            {
                Ok(body) => {
                    let points = parse_history_csv(&body)?;
                    debug!(asset = %asset_key, points = points.len(), "downloaded price history");
                    return Ok(points);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = retry_backoff(attempt);
                    warn!(asset = %asset_key, attempt, error = %err, "retrying price history download");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Downloads several assets into a SQLite price store.
    ///
    /// Failures are collected per asset rather than aborting the batch.
    pub async fn download_multiple_to_sqlite(
        &self,
        provider: &mut SqliteDataProvider,
        assets: &[(AssetKey, DateRange)],
    ) -> DownloadResult {
        let mut result = DownloadResult::default();
        for (asset_key, range) in assets {
            let outcome = match self.download(asset_key, range).await {
                Ok(points) => provider
                    .insert_time_series_batch(asset_key, &points)
                    .map_err(|e| DownloadError::Storage(e.to_string())),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(count) => {
                    result.successful.insert(asset_key.to_string(), count);
                }
                Err(err) => {
                    warn!(asset = %asset_key, error = %err, "download failed");
                    result.failed.insert(asset_key.to_string(), err.to_string());
                }
            }
        }
        result
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }
}

#[async_trait]
impl PriceHistorySource for YahooFinanceDownloader {
    async fn fetch_history(
        &self,
        asset: &AssetKey,
        range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError> {
        self.download(asset, range).await.map_err(DataProviderError::from)
    }
}

/// Delay before retry number `attempt` (1-based): doubles from 500ms, capped at 30s.
fn retry_backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    Duration::from_millis((INITIAL_BACKOFF_MS << shift).min(MAX_BACKOFF_MS))
}

/// Parses a Yahoo Finance history CSV into close-price points.
///
/// Rows whose close is `null` (holidays, halted sessions) are skipped.
pub fn parse_history_csv(body: &str) -> Result<Vec<TimeSeriesPoint>, DownloadError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| DownloadError::ParseError(e.to_string()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DownloadError::ParseError(format!("missing '{}' column", name)))
    };
    let date_idx = column("Date")?;
    let close_idx = column("Close")?;

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DownloadError::ParseError(e.to_string()))?;
        let (Some(date), Some(close)) = (record.get(date_idx), record.get(close_idx)) else {
            continue;
        };
        if close.trim().eq_ignore_ascii_case("null") {
            continue;
        }

        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|e| DownloadError::ParseError(format!("bad date '{}': {}", date, e)))?;
        let close_price: f64 = close
            .trim()
            .parse()
            .map_err(|e| DownloadError::ParseError(format!("bad close '{}': {}", close, e)))?;
        points.push(TimeSeriesPoint::new(
            date.and_time(NaiveTime::MIN).and_utc(),
            close_price,
        ));
    }

    Ok(points)
}

/// Outcome of a batch download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadResult {
    /// Ticker -> number of points stored
    pub successful: BTreeMap<String, usize>,
    /// Ticker -> error message
    pub failed: BTreeMap<String, String>,
}

/// Errors that can occur during Yahoo Finance data downloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("Client creation error: {0}")]
    ClientCreation(String),
    #[error("Invalid downloader configuration: {0}")]
    InvalidConfig(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: HTTP {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DownloadError {
    /// Network failures, throttling and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::NetworkError(_) => true,
            DownloadError::ApiError { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

impl From<DownloadError> for DataProviderError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::ApiError { status: 404, .. } => DataProviderError::AssetNotFound,
            other => DataProviderError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Date,Open,High,Low,Close,Adj Close,Volume
2024-01-02,472.16,473.67,470.49,472.65,466.66,123623700
2024-01-03,470.43,471.19,468.17,468.79,462.85,103585900
2024-01-04,468.30,470.96,467.05,467.28,461.36,84232200
";

    #[test]
    fn test_downloader_with_config() {
        let config = DownloaderConfig {
            max_retries: 5,
            requests_per_second: 2.0,
            timeout_seconds: 60,
            ..DownloaderConfig::default()
        };
        let downloader = YahooFinanceDownloader::with_config(config).unwrap();
        assert_eq!(downloader.config().max_retries, 5);
        assert_eq!(downloader.config().requests_per_second, 2.0);
        assert_eq!(downloader.config().timeout_seconds, 60);
    }

    #[test]
    fn test_downloader_rejects_excessive_retries() {
        let config = DownloaderConfig {
            max_retries: 100,
            ..DownloaderConfig::default()
        };
        assert!(matches!(
            YahooFinanceDownloader::with_config(config),
            Err(DownloadError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_retry_backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(1), Duration::from_millis(500));
        assert_eq!(retry_backoff(2), Duration::from_millis(1_000));
        assert_eq!(retry_backoff(4), Duration::from_millis(4_000));
        assert_eq!(retry_backoff(7), Duration::from_millis(30_000));
        assert_eq!(retry_backoff(64), Duration::from_millis(30_000));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_downloader_rejects_non_positive_rate() {
        let config = DownloaderConfig {
            requests_per_second: 0.0,
            ..DownloaderConfig::default()
        };
        assert!(matches!(
            YahooFinanceDownloader::with_config(config),
            Err(DownloadError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_history_csv() {
        let points = parse_history_csv(SAMPLE_CSV).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].close_price, 472.65);
        assert_eq!(
            points[2].timestamp.date_naive(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
        );
    }

    #[test]
    fn test_parse_history_csv_skips_null_rows() {
        let body = "Date,Close\n2024-01-02,100.0\n2024-01-03,null\n2024-01-04,101.5\n";
        let points = parse_history_csv(body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].close_price, 101.5);
    }

    #[test]
    fn test_parse_history_csv_missing_close_column() {
        let body = "Date,Open\n2024-01-02,100.0\n";
        assert!(matches!(parse_history_csv(body), Err(DownloadError::ParseError(_))));
    }

    #[test]
    fn test_parse_history_csv_bad_price() {
        let body = "Date,Close\n2024-01-02,abc\n";
        assert!(matches!(parse_history_csv(body), Err(DownloadError::ParseError(_))));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DownloadError::NetworkError("reset".into()).is_retryable());
        assert!(DownloadError::ApiError { status: 503, message: "Service Unavailable".into() }.is_retryable());
        assert!(DownloadError::ApiError { status: 429, message: "Too Many Requests".into() }.is_retryable());
        assert!(!DownloadError::ApiError { status: 404, message: "Not Found".into() }.is_retryable());
        assert!(!DownloadError::ParseError("x".into()).is_retryable());
    }

    #[test]
    fn test_not_found_maps_to_asset_not_found() {
        let err = DownloadError::ApiError { status: 404, message: "Not Found".into() };
        assert_eq!(DataProviderError::from(err), DataProviderError::AssetNotFound);

        let err = DownloadError::NetworkError("timeout".into());
        assert!(matches!(DataProviderError::from(err), DataProviderError::Other(_)));
    }

    #[test]
    fn test_download_error_display() {
        let error = DownloadError::NetworkError("Connection timeout".to_string());
        assert!(error.to_string().contains("Network error"));
        assert!(error.to_string().contains("Connection timeout"));
    }

    #[tokio::test]
    async fn test_unreachable_host_surfaces_network_error() {
        let config = DownloaderConfig {
            max_retries: 0,
            timeout_seconds: 2,
            base_url: "http://127.0.0.1:9".to_string(),
            ..DownloaderConfig::default()
        };
        let downloader = YahooFinanceDownloader::with_config(config).unwrap();
        let asset = AssetKey::new("SPY").unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );

        let err = downloader.download(&asset, &range).await.unwrap_err();
        assert!(matches!(err, DownloadError::NetworkError(_)));
    }

    #[tokio::test]
    #[ignore = "requires network access to Yahoo Finance"]
    async fn test_fetch_history_live() {
        let downloader = YahooFinanceDownloader::new().unwrap();
        let asset = AssetKey::new("SPY").unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let points = downloader.fetch_history(&asset, &range).await.unwrap();
        assert!(!points.is_empty());
    }
}
