//! Error taxonomy for a risk analysis.

use crate::asset_key::AssetKey;
use crate::note::NoteTermsError;
use thiserror::Error;

/// Message shown to end users whenever an analysis fails, whatever the cause.
pub const USER_FACING_FAILURE: &str = "Unable to compute risk. Check inputs and try again.";

/// Any failure that abandons a risk analysis. No partial result is ever
/// produced alongside one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Price history for an asset could not be obtained or came back empty.
    #[error("Price history unavailable for {asset}: {reason}")]
    DataUnavailable { asset: AssetKey, reason: String },

    /// Fewer than two prices, so not a single return can be computed.
    #[error("Insufficient price history for {asset}: {points} point(s), at least 2 required")]
    InsufficientData { asset: AssetKey, points: usize },

    /// Zero/negative/non-finite prices or volatilities reaching the model.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Invalid note terms: {0}")]
    InvalidTerms(#[from] NoteTermsError),
}

impl RiskError {
    /// The single user-facing failure text. Details stay in logs.
    pub fn user_message(&self) -> &'static str {
        USER_FACING_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_shares_user_message() {
        let asset = AssetKey::new("SPY").unwrap();
        let errors = vec![
            RiskError::DataUnavailable { asset: asset.clone(), reason: "timeout".into() },
            RiskError::InsufficientData { asset, points: 1 },
            RiskError::DegenerateInput("zero spot".into()),
            RiskError::InvalidTerms(NoteTermsError::EmptyBasket),
        ];
        for err in errors {
            assert_eq!(err.user_message(), USER_FACING_FAILURE);
        }
    }

    #[test]
    fn test_display_names_the_asset() {
        let err = RiskError::InsufficientData {
            asset: AssetKey::new("QQQ").unwrap(),
            points: 1,
        };
        assert!(err.to_string().contains("QQQ"));
        assert!(err.to_string().contains("1 point"));
    }
}
