use crate::asset_key::AssetKey;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single daily observation: timestamp and close price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Timestamp of the data point
    pub timestamp: DateTime<Utc>,
    /// Close price at this timestamp
    pub close_price: f64,
}

impl TimeSeriesPoint {
    /// Creates a new TimeSeriesPoint.
    pub fn new(timestamp: DateTime<Utc>, close_price: f64) -> Self {
        TimeSeriesPoint {
            timestamp,
            close_price,
        }
    }
}

/// Date range for querying price history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start date (inclusive)
    pub start: NaiveDate,
    /// End date (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new DateRange.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Creates the range covering `days` calendar days up to and including `end`.
    ///
    /// Returns `None` when the start would fall before the earliest
    /// representable date.
    pub fn trailing_days(end: NaiveDate, days: u32) -> Option<Self> {
        let start = end.checked_sub_signed(Duration::days(i64::from(days)))?;
        Some(DateRange { start, end })
    }

    /// Returns true if the range is well-formed (start <= end).
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Returns true if `date` falls within the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Synchronous data source abstraction.
///
/// Implementations can be:
/// - In-memory HashMap (for testing)
/// - SQLite database
/// - Any other local storage
pub trait DataProvider {
    /// Retrieves price history for a given asset key and date range.
    ///
    /// # Errors
    /// Returns an error if the asset key is not found, the date range is invalid,
    /// or if there's an issue accessing the data source.
    fn get_time_series(
        &self,
        asset_key: &AssetKey,
        date_range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError>;
}

/// Asynchronous market data collaborator used by the risk analyzer.
///
/// One request is issued per basket asset and the requests are awaited
/// concurrently, so implementations must be shareable across them.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    /// Fetches daily close prices for `asset` within `range`.
    async fn fetch_history(
        &self,
        asset: &AssetKey,
        range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError>;
}

#[async_trait]
impl<S: PriceHistorySource + ?Sized> PriceHistorySource for Box<S> {
    async fn fetch_history(
        &self,
        asset: &AssetKey,
        range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError> {
        (**self).fetch_history(asset, range).await
    }
}

/// Any synchronous provider behind a tokio mutex (e.g. a SQLite connection)
/// can serve as an async source.
#[async_trait]
impl<P: DataProvider + Send> PriceHistorySource for tokio::sync::Mutex<P> {
    async fn fetch_history(
        &self,
        asset: &AssetKey,
        range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError> {
        let provider = self.lock().await;
        provider.get_time_series(asset, range)
    }
}

/// Errors that can occur when querying a data provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataProviderError {
    /// Asset key not found in the data source
    #[error("Asset not found")]
    AssetNotFound,
    /// Invalid date range (e.g., start > end)
    #[error("Invalid date range")]
    InvalidDateRange,
    /// Generic error message
    #[error("{0}")]
    Other(String),
}

/// In-memory data provider implementation for testing.
///
/// Stores price history in a HashMap keyed by AssetKey.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataProvider {
    data: HashMap<AssetKey, Vec<TimeSeriesPoint>>,
}

impl InMemoryDataProvider {
    /// Creates a new empty in-memory data provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds price history for an asset, replacing anything stored before.
    pub fn add_data(&mut self, asset_key: AssetKey, points: Vec<TimeSeriesPoint>) {
        self.data.insert(asset_key, points);
    }
}

impl DataProvider for InMemoryDataProvider {
    fn get_time_series(
        &self,
        asset_key: &AssetKey,
        date_range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError> {
        if !date_range.is_valid() {
            return Err(DataProviderError::InvalidDateRange);
        }

        let all_points = self
            .data
            .get(asset_key)
            .ok_or(DataProviderError::AssetNotFound)?;

        Ok(all_points
            .iter()
            .filter(|point| date_range.contains(point.timestamp.date_naive()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PriceHistorySource for InMemoryDataProvider {
    async fn fetch_history(
        &self,
        asset: &AssetKey,
        range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError> {
        self.get_time_series(asset, range)
    }
}
