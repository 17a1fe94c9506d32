//! Note terms: the contractual inputs of a risk analysis.

use crate::asset_key::AssetKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Issuer credit rating.
///
/// Ratings outside the scored scale (anything below BB, typos, agency
/// specific notations) are kept verbatim in `Unrated` rather than rejected;
/// the credit scale assigns them its fallback score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CreditRating {
    Aaa,
    AaPlus,
    Aa,
    AaMinus,
    APlus,
    A,
    AMinus,
    BbbPlus,
    Bbb,
    BbbMinus,
    Bb,
    Unrated(String),
}

impl CreditRating {
    /// Every rating on the scored scale, best first.
    pub const SCALE: [CreditRating; 11] = [
        CreditRating::Aaa,
        CreditRating::AaPlus,
        CreditRating::Aa,
        CreditRating::AaMinus,
        CreditRating::APlus,
        CreditRating::A,
        CreditRating::AMinus,
        CreditRating::BbbPlus,
        CreditRating::Bbb,
        CreditRating::BbbMinus,
        CreditRating::Bb,
    ];

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "AAA" => CreditRating::Aaa,
            "AA+" => CreditRating::AaPlus,
            "AA" => CreditRating::Aa,
            "AA-" => CreditRating::AaMinus,
            "A+" => CreditRating::APlus,
            "A" => CreditRating::A,
            "A-" => CreditRating::AMinus,
            "BBB+" => CreditRating::BbbPlus,
            "BBB" => CreditRating::Bbb,
            "BBB-" => CreditRating::BbbMinus,
            "BB" => CreditRating::Bb,
            other => CreditRating::Unrated(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CreditRating::Aaa => "AAA",
            CreditRating::AaPlus => "AA+",
            CreditRating::Aa => "AA",
            CreditRating::AaMinus => "AA-",
            CreditRating::APlus => "A+",
            CreditRating::A => "A",
            CreditRating::AMinus => "A-",
            CreditRating::BbbPlus => "BBB+",
            CreditRating::Bbb => "BBB",
            CreditRating::BbbMinus => "BBB-",
            CreditRating::Bb => "BB",
            CreditRating::Unrated(raw) => raw,
        }
    }
}

impl fmt::Display for CreditRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditRating {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CreditRating::parse(s))
    }
}

impl From<String> for CreditRating {
    fn from(value: String) -> Self {
        CreditRating::parse(&value)
    }
}

impl From<CreditRating> for String {
    fn from(rating: CreditRating) -> Self {
        rating.as_str().to_string()
    }
}

/// Downside protection design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectionType {
    /// Knock-in barrier: full downside exposure once breached.
    #[serde(rename = "Soft Barrier", alias = "soft_barrier")]
    SoftBarrier,
    /// Buffer absorbing a first-loss tranche regardless of breach.
    #[serde(rename = "Hard Buffer", alias = "hard_buffer")]
    HardBuffer,
}

impl fmt::Display for ProtectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectionType::SoftBarrier => f.write_str("Soft Barrier"),
            ProtectionType::HardBuffer => f.write_str("Hard Buffer"),
        }
    }
}

/// Early-redemption feature of the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallStructure {
    #[serde(rename = "Autocallable", alias = "autocallable")]
    Autocallable { no_call_period_months: u32 },
    #[serde(rename = "Non-Callable", alias = "non_callable")]
    NonCallable,
}

impl CallStructure {
    /// Lock-in period, present only for autocallable notes.
    pub fn no_call_period_months(&self) -> Option<u32> {
        match self {
            CallStructure::Autocallable {
                no_call_period_months,
            } => Some(*no_call_period_months),
            CallStructure::NonCallable => None,
        }
    }
}

/// Terms of a structured note, supplied once per analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteTerms {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub credit_rating: CreditRating,
    pub maturity_months: u32,
    pub call_structure: CallStructure,
    pub protection_type: ProtectionType,
    /// Barrier or buffer level as a percentage of spot, e.g. 70.0
    pub protection_level: f64,
    /// Annual coupon in percent. Descriptive only; it does not enter the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<f64>,
    pub assets: Vec<AssetKey>,
}

impl NoteTerms {
    /// Checks the invariants every analysis relies on.
    pub fn validate(&self) -> Result<(), NoteTermsError> {
        if self.maturity_months == 0 {
            return Err(NoteTermsError::ZeroMaturity);
        }
        if !(self.protection_level > 0.0 && self.protection_level <= 100.0) {
            return Err(NoteTermsError::ProtectionLevelOutOfRange(self.protection_level));
        }
        if let Some(coupon) = self.coupon {
            if !coupon.is_finite() || coupon < 0.0 {
                return Err(NoteTermsError::InvalidCoupon(coupon));
            }
        }
        if self.assets.is_empty() {
            return Err(NoteTermsError::EmptyBasket);
        }

        let mut seen = HashSet::with_capacity(self.assets.len());
        for asset in &self.assets {
            if !seen.insert(asset) {
                return Err(NoteTermsError::DuplicateAsset(asset.clone()));
            }
        }

        Ok(())
    }

    pub fn years_to_maturity(&self) -> f64 {
        f64::from(self.maturity_months) / 12.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoteTermsError {
    #[error("maturity must be at least one month")]
    ZeroMaturity,
    #[error("protection level must be in (0, 100], got {0}")]
    ProtectionLevelOutOfRange(f64),
    #[error("coupon must be a non-negative percentage, got {0}")]
    InvalidCoupon(f64),
    #[error("basket must contain at least one asset")]
    EmptyBasket,
    #[error("asset {0} appears more than once in the basket")]
    DuplicateAsset(AssetKey),
}
