//! Signal extractors.
//!
//! Each extractor is a pure function turning one kind of raw input into a
//! set of weighted [`RiskIndicator`](crate::types::RiskIndicator)s. None of
//! them fail: malformed or missing input degrades to an empty set, which the
//! classifier reads as "no risk detected".

pub mod assessment;
pub mod behavior;
pub mod keyword;

pub use assessment::{AssessmentPolicy, SubscaleRule, extract_assessment};
pub use behavior::{BehaviorHistory, BehaviorPolicy, extract_behavior};
pub use keyword::{KeywordPolicy, KeywordTier, KeywordTiers, extract_keywords, normalize_language};
