//! Pluggable event-name similarity.
//!
//! [`LexicalScorer`] is always available; [`SemanticScorer`] wraps an optional
//! external [`SemanticOracle`]; [`WeightedScorer`] blends any number of scorers.

use std::sync::Arc;

use crate::{
    NormalizedEvent,
    category::CategoryTable,
    text::{normalize_name, strip_phrase},
};

/// External similarity function, e.g. embedding based.
pub trait SemanticOracle: Send + Sync {
    /// Similarity of two texts in [0, 1], `None` when the oracle cannot judge.
    fn similarity(&self, a: &str, b: &str) -> Option<f64>;
}

pub trait SimilarityScorer: Send + Sync {
    /// Similarity of two events in [0, 1], `None` when this scorer has no opinion.
    fn score(&self, a: &NormalizedEvent, b: &NormalizedEvent) -> Option<f64>;
}

/// Jaro–Winkler over normalized names.
///
/// When the events share a known category (or only one side has one) its aliases are also
/// stripped and the remaining session keys compared, so "F1 Qualifying" and
/// "Formula 1 Qualifying" both reduce to "qualifying". Names whose numbers
/// differ ("Race 1" / "Race 2") never match.
pub struct LexicalScorer {
    table: Arc<CategoryTable>,
}

impl LexicalScorer {
    pub fn new(table: Arc<CategoryTable>) -> Self {
        Self { table }
    }

    /// Name similarity under an optional shared category code.
    pub fn name_similarity(&self, a: &str, b: &str, shared_category: Option<&str>) -> f64 {
        let a = normalize_name(a);
        let b = normalize_name(b);
        let mut best = guarded_jaro_winkler(&a, &b);

        if let Some(code) = shared_category {
            let phrases = self.table.alias_phrases(code);
            let key_a = session_key(&a, &phrases);
            let key_b = session_key(&b, &phrases);
            if !key_a.is_empty() && !key_b.is_empty() {
                best = best.max(guarded_jaro_winkler(&key_a, &key_b));
            }
        }
        best
    }
}

impl SimilarityScorer for LexicalScorer {
    fn score(&self, a: &NormalizedEvent, b: &NormalizedEvent) -> Option<f64> {
        // One side unknown still strips the other side's aliases
        let shared = match (a.category.is_unknown(), b.category.is_unknown()) {
            (false, true) => Some(a.category.code.as_str()),
            (true, false) => Some(b.category.code.as_str()),
            (false, false) if a.category.code == b.category.code => Some(a.category.code.as_str()),
            _ => None,
        };
        Some(self.name_similarity(a.name(), b.name(), shared))
    }
}

fn session_key(name: &str, phrases: &[&str]) -> String {
    phrases
        .iter()
        .fold(name.to_string(), |key, phrase| strip_phrase(&key, phrase))
}

fn numbers(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .collect()
}

fn guarded_jaro_winkler(a: &str, b: &str) -> f64 {
    if numbers(a) != numbers(b) {
        return 0.0;
    }
    strsim::jaro_winkler(a, b)
}

/// Scores event names with a [`SemanticOracle`].
pub struct SemanticScorer {
    oracle: Arc<dyn SemanticOracle>,
}

impl SemanticScorer {
    pub fn new(oracle: Arc<dyn SemanticOracle>) -> Self {
        Self { oracle }
    }
}

impl SimilarityScorer for SemanticScorer {
    fn score(&self, a: &NormalizedEvent, b: &NormalizedEvent) -> Option<f64> {
        self.oracle
            .similarity(a.name(), b.name())
            .map(|s| s.clamp(0.0, 1.0))
    }
}

/// Weighted mean of its components. Components without an opinion are left
/// out and the remaining weights renormalized.
#[derive(Default)]
pub struct WeightedScorer {
    components: Vec<(Box<dyn SimilarityScorer>, f64)>,
}

impl WeightedScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scorer: Box<dyn SimilarityScorer>, weight: f64) -> Self {
        if weight > 0.0 {
            self.components.push((scorer, weight));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl SimilarityScorer for WeightedScorer {
    fn score(&self, a: &NormalizedEvent, b: &NormalizedEvent) -> Option<f64> {
        let (sum, weights) = self
            .components
            .iter()
            .filter_map(|(scorer, weight)| scorer.score(a, b).map(|s| (s * weight, *weight)))
            .fold((0.0, 0.0), |(sum, total), (s, w)| (sum + s, total + w));
        (weights > 0.0).then(|| sum / weights)
    }
}
