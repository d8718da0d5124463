//! Keyword extraction over free text.
//!
//! Text is matched against three ordered tiers (critical, high, medium) of
//! phrases for the caller's language, falling back to the default language
//! when no lexicon exists. Matching is case-insensitive substring
//! containment; every tier with at least one hit yields one indicator.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{IndicatorSource, RiskIndicator};

/// A keyword tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordTier {
    /// Explicit intent or plan.
    Critical,
    /// Self-harm or acute hopelessness.
    High,
    /// General distress.
    Medium,
}

impl KeywordTier {
    /// Tiers in matching order.
    pub const ORDERED: [Self; 3] = [Self::Critical, Self::High, Self::Medium];

    /// Returns the tier as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
        }
    }
}

impl fmt::Display for KeywordTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The phrase lists for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTiers {
    /// Critical-tier phrases.
    #[serde(default)]
    pub critical: Vec<String>,
    /// High-tier phrases.
    #[serde(default)]
    pub high: Vec<String>,
    /// Medium-tier phrases.
    #[serde(default)]
    pub medium: Vec<String>,
}

impl KeywordTiers {
    /// Builds tiers from static phrase lists.
    #[must_use]
    pub fn from_static(critical: &[&str], high: &[&str], medium: &[&str]) -> Self {
        let own = |list: &[&str]| -> Vec<String> {
            list.iter().map(|s| (*s).to_string()).collect()
        };
        Self {
            critical: own(critical),
            high: own(high),
            medium: own(medium),
        }
    }

    /// Returns the phrases of a tier.
    #[must_use]
    pub fn tier(&self, tier: KeywordTier) -> &[String] {
        match tier {
            KeywordTier::Critical => &self.critical,
            KeywordTier::High => &self.high,
            KeywordTier::Medium => &self.medium,
        }
    }
}

/// Policy for the keyword extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordPolicy {
    /// Language used when the caller's language has no lexicon.
    pub default_language: String,
    /// Weight of a critical-tier hit.
    pub critical_weight: u32,
    /// Weight of a high-tier hit.
    pub high_weight: u32,
    /// Weight of a medium-tier hit.
    pub medium_weight: u32,
    /// Lexicons keyed by primary language subtag.
    pub lexicons: BTreeMap<String, KeywordTiers>,
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            critical_weight: 10,
            high_weight: 7,
            medium_weight: 4,
            lexicons: builtin_lexicons(),
        }
    }
}

impl KeywordPolicy {
    /// Returns the weight for a tier.
    #[must_use]
    pub const fn weight(&self, tier: KeywordTier) -> u32 {
        match tier {
            KeywordTier::Critical => self.critical_weight,
            KeywordTier::High => self.high_weight,
            KeywordTier::Medium => self.medium_weight,
        }
    }

    /// Returns the lexicon for `language`, or the default language's.
    #[must_use]
    pub fn lexicon(&self, language: &str) -> Option<&KeywordTiers> {
        self.lexicons
            .get(&normalize_language(language))
            .or_else(|| self.lexicons.get(&normalize_language(&self.default_language)))
    }

    /// Adds or replaces the lexicon for a language.
    #[must_use]
    pub fn with_lexicon(mut self, language: &str, tiers: KeywordTiers) -> Self {
        self.lexicons.insert(normalize_language(language), tiers);
        self
    }
}

/// Reduces a language tag to its lowercase primary subtag (`pt-BR` → `pt`).
#[must_use]
pub fn normalize_language(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Scans `text` for risk phrases and returns one indicator per matching tier.
#[must_use]
pub fn extract_keywords(text: &str, language: &str, policy: &KeywordPolicy) -> Vec<RiskIndicator> {
    let Some(lexicon) = policy.lexicon(language) else {
        return Vec::new();
    };
    let haystack = text.to_lowercase();
    if haystack.trim().is_empty() {
        return Vec::new();
    }

    KeywordTier::ORDERED
        .iter()
        .filter_map(|&tier| {
            let hits: Vec<&str> = lexicon
                .tier(tier)
                .iter()
                .map(|phrase| phrase.trim())
                .filter(|phrase| !phrase.is_empty() && haystack.contains(&phrase.to_lowercase()))
                .collect();
            if hits.is_empty() {
                None
            } else {
                Some(RiskIndicator::new(
                    IndicatorSource::Keyword,
                    policy.weight(tier),
                    format!("{tier}_keywords: {}", hits.join(", ")),
                ))
            }
        })
        .collect()
}

fn builtin_lexicons() -> BTreeMap<String, KeywordTiers> {
    let mut lexicons = BTreeMap::new();
    lexicons.insert(
        "en".to_string(),
        KeywordTiers::from_static(
            &[
                "kill myself",
                "end my life",
                "suicide",
                "suicidal",
                "want to die",
                "better off dead",
                "take my own life",
                "no reason to live",
            ],
            &[
                "self harm",
                "self-harm",
                "hurt myself",
                "cut myself",
                "can't go on",
                "cannot go on",
                "no way out",
                "hopeless",
            ],
            &[
                "depressed",
                "worthless",
                "can't cope",
                "overwhelmed",
                "panic attack",
                "nobody cares",
                "so alone",
            ],
        ),
    );
    lexicons.insert(
        "es".to_string(),
        KeywordTiers::from_static(
            &[
                "suicidarme",
                "suicidio",
                "matarme",
                "quiero morir",
                "quitarme la vida",
                "no quiero vivir",
            ],
            &[
                "hacerme daño",
                "autolesión",
                "cortarme",
                "sin esperanza",
                "no puedo más",
                "no hay salida",
            ],
            &[
                "deprimido",
                "deprimida",
                "no valgo nada",
                "agobiado",
                "agobiada",
                "ataque de pánico",
                "muy solo",
                "muy sola",
            ],
        ),
    );
    lexicons
}
