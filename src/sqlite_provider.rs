use crate::asset_key::AssetKey;
use crate::time_series::{DataProvider, DataProviderError, DateRange, TimeSeriesPoint};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;

/// SQLite-based price store.
///
/// Holds downloaded price history so analyses can run offline.
/// Automatically creates schema on first use.
#[derive(Debug)]
pub struct SqliteDataProvider {
    conn: Connection,
}

impl SqliteDataProvider {
    /// Opens (or creates) a file-based price store.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        let provider = SqliteDataProvider { conn };
        provider.ensure_schema()?;
        Ok(provider)
    }

    /// Creates a price store backed by an in-memory database.
    pub fn new_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let provider = SqliteDataProvider { conn };
        provider.ensure_schema()?;
        Ok(provider)
    }

    fn ensure_schema(&self) -> SqliteResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS assets (
                asset_key TEXT PRIMARY KEY,
                name TEXT
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS time_series_data (
                asset_key TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                close_price REAL NOT NULL,
                PRIMARY KEY (asset_key, timestamp)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_time_series_asset_key ON time_series_data(asset_key)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_time_series_timestamp ON time_series_data(timestamp)",
            [],
        )?;

        Ok(())
    }

    /// Registers an asset, updating its display name if it already exists.
    pub fn store_asset(&self, asset_key: &AssetKey, name: Option<&str>) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO assets (asset_key, name) VALUES (?1, ?2)
             ON CONFLICT(asset_key) DO UPDATE SET name = COALESCE(excluded.name, assets.name)",
            params![asset_key.as_str(), name],
        )?;
        Ok(())
    }

    /// Inserts price points in a single transaction, replacing points that
    /// share a timestamp. The asset is registered if it is not already known.
    ///
    /// Returns the number of points written.
    pub fn insert_time_series_batch(
        &mut self,
        asset_key: &AssetKey,
        points: &[TimeSeriesPoint],
    ) -> SqliteResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO assets (asset_key, name) VALUES (?1, NULL)",
            params![asset_key.as_str()],
        )?;

        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO time_series_data (asset_key, timestamp, close_price)
                 VALUES (?1, ?2, ?3)",
            )?;
            for point in points {
                written += stmt.execute(params![
                    asset_key.as_str(),
                    point.timestamp.to_rfc3339(),
                    point.close_price
                ])?;
            }
        }
        tx.commit()?;

        Ok(written)
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn asset_exists(&self, asset_key: &AssetKey) -> SqliteResult<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM assets WHERE asset_key = ?1 LIMIT 1")?;
        stmt.exists([asset_key.as_str()])
    }
}

fn sql_error(e: rusqlite::Error) -> DataProviderError {
    DataProviderError::Other(format!("SQL error: {}", e))
}

impl DataProvider for SqliteDataProvider {
    fn get_time_series(
        &self,
        asset_key: &AssetKey,
        date_range: &DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, DataProviderError> {
        if !date_range.is_valid() {
            return Err(DataProviderError::InvalidDateRange);
        }

        let start_date_str = date_range.start.format("%Y-%m-%d").to_string();
        let end_date_str = date_range.end.format("%Y-%m-%d").to_string();

        let mut stmt = self
            .conn
            .prepare(
                "SELECT timestamp, close_price FROM time_series_data
                 WHERE asset_key = ?1
                 AND date(timestamp) >= ?2
                 AND date(timestamp) <= ?3
                 ORDER BY timestamp",
            )
            .map_err(sql_error)?;

        let rows = stmt
            .query_map(
                [asset_key.as_str(), start_date_str.as_str(), end_date_str.as_str()],
                |row| {
                    let timestamp_str: String = row.get(0)?;
                    let close_price: f64 = row.get(1)?;
                    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|e| {
                            rusqlite::Error::InvalidColumnType(
                                0,
                                format!("Invalid timestamp: {}", e),
                                rusqlite::types::Type::Text,
                            )
                        })?
                        .with_timezone(&Utc);
                    Ok(TimeSeriesPoint::new(timestamp, close_price))
                },
            )
            .map_err(sql_error)?;

        let points = rows
            .collect::<SqliteResult<Vec<_>>>()
            .map_err(|e| DataProviderError::Other(format!("Row parsing error: {}", e)))?;

        // Distinguish "unknown asset" from "known asset, nothing in range"
        if points.is_empty() && !self.asset_exists(asset_key).map_err(sql_error)? {
            return Err(DataProviderError::AssetNotFound);
        }

        Ok(points)
    }
}

#[cfg(test)]
impl SqliteDataProvider {
    fn table_exists(&self, table_name: &str) -> SqliteResult<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        stmt.exists([table_name])
    }
}
