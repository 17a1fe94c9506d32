//! Analytics Functions
//!
//! Stateless building blocks of the risk pipeline. Data flows one way:
//! price series -> returns/volatility -> breach probabilities ->
//! (with correlations) -> composite score. None of these functions touch
//! I/O or shared state.

pub mod breach;
pub mod correlation;
pub mod returns;
pub mod scoring;

pub use breach::{breach_probability, normal_cdf};
pub use correlation::{align_trailing, correlation_penalty, pairwise_correlations, sample_correlation};
pub use returns::{estimate_volatility, log_returns, sample_std_dev, PriceSeries, VolatilityEstimate};
pub use scoring::{composite_score, ScoreBreakdown, ScoringInputs};
