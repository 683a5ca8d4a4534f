use serde::{Deserialize, Serialize};

use crate::registry::RegistryEntry;

/// Name reported when no registry entry clears the threshold.
pub const NO_MATCH_NAME: &str = "No match found";

/// Whole-word tokens dropped during normalization.
pub const CORPORATE_SUFFIXES: &[&str] = &["inc", "llc", "ltd", "corp", "co"];

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

/// Canonicalize a name for comparison.
///
/// Lower-cases, drops periods and commas, removes corporate suffix words
/// and collapses whitespace. The output never contains a suffix token or a
/// double space, so applying it twice is a no-op.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .collect();

    lowered
        .split_whitespace()
        .filter(|word| !CORPORATE_SUFFIXES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched_id: String,
    pub matched_name: String,
    pub confidence: f64,
}

impl MatchResult {
    #[must_use]
    pub fn no_match() -> Self {
        Self {
            matched_id: String::new(),
            matched_name: NO_MATCH_NAME.to_string(),
            confidence: 0.0,
        }
    }

    #[must_use]
    pub fn matched(entry: &RegistryEntry, confidence: f64) -> Self {
        Self {
            matched_id: entry.id.clone(),
            matched_name: entry.canonical_name.clone(),
            confidence,
        }
    }

    pub fn is_match(&self) -> bool {
        !self.matched_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Sørensen–Dice over character bigrams, whitespace ignored.
    #[default]
    Dice,
    NormalizedLevenshtein,
}

impl SimilarityMetric {
    /// Symmetric similarity in `[0, 1]` between two normalized names.
    #[must_use]
    pub fn score(self, a: &str, b: &str) -> f64 {
        match self {
            Self::Dice => strsim::sorensen_dice(a, b),
            Self::NormalizedLevenshtein => strsim::normalized_levenshtein(a, b),
        }
    }
}

/// Resolves an extracted insured name to the closest registry entry.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    metric: SimilarityMetric,
    threshold: f64,
}

impl MatchEngine {
    #[must_use]
    pub fn new(metric: SimilarityMetric, threshold: f64) -> Self {
        Self { metric, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    #[must_use]
    pub fn find_best_match(&self, extracted_name: &str, registry: &[RegistryEntry]) -> MatchResult {
        let normalized = normalize_name(extracted_name);

        if normalized.is_empty() || normalized == "unknown" {
            return MatchResult::no_match();
        }

        let mut best: Option<(&RegistryEntry, f64)> = None;

        for entry in registry {
            let score = self
                .metric
                .score(&normalized, &normalize_name(&entry.canonical_name));

            // Strictly greater: the earliest entry wins a tie.
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((entry, score)),
            }
        }

        match best {
            Some((entry, score)) if score >= self.threshold => {
                tracing::debug!(
                    extracted = extracted_name,
                    matched_id = %entry.id,
                    score,
                    "Registry match"
                );
                MatchResult::matched(entry, score)
            }
            Some((entry, score)) => {
                tracing::debug!(
                    extracted = extracted_name,
                    closest_id = %entry.id,
                    score,
                    threshold = self.threshold,
                    "Best registry candidate below threshold"
                );
                MatchResult::no_match()
            }
            None => MatchResult::no_match(),
        }
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(SimilarityMetric::Dice, DEFAULT_MATCH_THRESHOLD)
    }
}
