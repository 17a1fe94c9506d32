use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Asset key for uniquely identifying a basket underlying.
///
/// Keys are ticker symbols as understood by the market data source
/// (e.g., "SPY", "^GSPC", "BRK-B"). Tickers are upper-cased on creation so
/// that "spy" and "SPY" refer to the same asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetKey(String);

impl AssetKey {
    /// Creates a new asset key from a ticker symbol.
    ///
    /// # Errors
    /// Returns an error if the ticker is empty or contains characters that
    /// cannot appear in a ticker.
    pub fn new(ticker: impl Into<String>) -> Result<Self, AssetKeyError> {
        let ticker = ticker.into().trim().to_ascii_uppercase();
        Self::validate(&ticker)?;
        Ok(AssetKey(ticker))
    }

    fn validate(ticker: &str) -> Result<(), AssetKeyError> {
        if ticker.is_empty() {
            return Err(AssetKeyError::EmptyKey);
        }

        // Index (^GSPC) and futures (ES=F) symbols are allowed alongside plain tickers
        if !ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='))
        {
            return Err(AssetKeyError::InvalidCharacters(ticker.to_string()));
        }

        Ok(())
    }

    /// Returns the ticker symbol.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AssetKey {
    type Err = AssetKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetKey::new(s)
    }
}

impl TryFrom<String> for AssetKey {
    type Error = AssetKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AssetKey::new(value)
    }
}

impl From<AssetKey> for String {
    fn from(key: AssetKey) -> Self {
        key.0
    }
}

/// Errors that can occur when creating an asset key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetKeyError {
    #[error("Asset key cannot be empty")]
    EmptyKey,
    #[error("Asset key '{0}' contains invalid characters")]
    InvalidCharacters(String),
}

/// Reference universe of underlyings offered to users when building a basket.
///
/// Baskets are not restricted to this list; any ticker the market data
/// source knows can be analyzed.
pub const KNOWN_UNDERLYINGS: &[(&str, &str)] = &[
    ("SPY", "SPDR S&P 500 ETF"),
    ("QQQ", "Invesco QQQ (Nasdaq-100)"),
    ("IWM", "iShares Russell 2000 ETF"),
    ("DIA", "SPDR Dow Jones Industrial Average ETF"),
    ("GLD", "SPDR Gold Shares"),
    ("TLT", "iShares 20+ Year Treasury Bond ETF"),
    ("EFA", "iShares MSCI EAFE ETF"),
    ("FEZ", "SPDR EURO STOXX 50 ETF"),
    ("XLF", "Financial Select Sector SPDR"),
    ("XLE", "Energy Select Sector SPDR"),
];
