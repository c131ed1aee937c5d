//! Category classification.
//!
//! Each text is tried against the canonical table (exact alias, then alias
//! phrase), the learned store, fuzzy alias matching and finally the semantic
//! oracle. The page section category is only consulted when the event itself
//! says nothing usable.

pub mod store;
pub mod table;

use std::{fs, sync::Arc};

use crate::{
    CategoryResolution, Error, Provenance,
    config::ClassificationConfig,
    similarity::SemanticOracle,
    text::normalize_name,
};

pub use store::{FileMappingStore, MappingStore, MemoryMappingStore};
pub use table::{CategoryDefinition, CategoryTable};

const PHRASE_CONFIDENCE: f64 = 0.9;
const LEARNED_CONFIDENCE: f64 = 0.95;
const CONTEXT_CONFIDENCE: f64 = 0.6;

pub struct CategoryClassifier {
    table: Arc<CategoryTable>,
    store: Box<dyn MappingStore>,
    oracle: Option<Arc<dyn SemanticOracle>>,
    config: ClassificationConfig,
    learned: usize,
}

impl CategoryClassifier {
    pub fn new(
        table: Arc<CategoryTable>,
        store: Box<dyn MappingStore>,
        config: ClassificationConfig,
    ) -> Self {
        Self {
            table,
            store,
            oracle: None,
            config,
            learned: 0,
        }
    }

    /// Built-in table merged with `categories_path`, learned mappings from `learned_store_path`.
    ///
    /// An unreadable category file is a configuration error. An unreadable
    /// learned store only costs the mappings: classification continues in memory.
    pub fn from_config(config: ClassificationConfig) -> crate::Result<Self> {
        let mut table = CategoryTable::default();
        if let Some(ref path) = config.categories_path {
            let json = fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Cannot read categories {}: {}", path.display(), e))
            })?;
            table.load_from_json(&json).map_err(|e| {
                Error::Config(format!("Invalid categories {}: {}", path.display(), e))
            })?;
        }

        let store: Box<dyn MappingStore> = match config.learned_store_path {
            Some(ref path) => match FileMappingStore::open(path) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    tracing::warn!(error = %e, "Learned mappings unavailable, using memory only");
                    Box::new(MemoryMappingStore::new())
                }
            },
            None => Box::new(MemoryMappingStore::new()),
        };

        Ok(Self::new(Arc::new(table), store, config))
    }

    /// Consulted only when `semantic_enabled` is set.
    pub fn with_oracle(mut self, oracle: Arc<dyn SemanticOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn table(&self) -> &Arc<CategoryTable> {
        &self.table
    }

    /// Mappings learned during this run.
    pub fn learned_count(&self) -> usize {
        self.learned
    }

    /// Classify an event name with its printed category, if any.
    pub fn classify(&mut self, name: &str, hint: Option<&str>) -> CategoryResolution {
        self.classify_in_context(name, hint, None)
    }

    /// Classify an event, falling back to the page section category.
    ///
    /// The printed hint is preferred on its own; hint and name are combined
    /// only when the hint alone does not clear the confidence threshold.
    pub fn classify_in_context(
        &mut self,
        name: &str,
        hint: Option<&str>,
        section: Option<&str>,
    ) -> CategoryResolution {
        let hint = hint.map(str::trim).filter(|h| !h.is_empty());
        let mut best: Option<CategoryResolution> = None;

        if let Some(hint) = hint {
            if let Some(found) = self.match_text(hint) {
                if found.confidence >= self.config.fuzzy_threshold {
                    return found;
                }
                best = Some(found);
            }
            if let Some(found) = self.match_text(&format!("{} {}", hint, name)) {
                if found.confidence >= self.config.fuzzy_threshold {
                    return found;
                }
                best = pick(best, found);
            }
        }

        if let Some(found) = self.match_text(name) {
            best = pick(best, found);
        }
        if let Some(best) = best {
            return best;
        }

        if let Some(section) = section.map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(found) = self.match_text(section) {
                return CategoryResolution {
                    confidence: CONTEXT_CONFIDENCE,
                    provenance: Provenance::ContextInferred,
                    ..found
                };
            }
        }

        CategoryResolution::unknown()
    }

    /// Persist learned mappings.
    pub fn flush(&mut self) -> crate::Result<()> {
        self.store.flush()
    }

    fn match_text(&mut self, text: &str) -> Option<CategoryResolution> {
        let key = normalize_name(text);
        if key.is_empty() {
            return None;
        }

        if let Some(category) = self.table.exact(&key) {
            return Some(resolution(category, 1.0, Provenance::RuleMatched));
        }
        if let Some(category) = self.table.containing(&key) {
            return Some(resolution(category, PHRASE_CONFIDENCE, Provenance::RuleMatched));
        }
        if let Some(category) = self.store.get(&key).and_then(|code| self.table.get(code)) {
            return Some(resolution(category, LEARNED_CONFIDENCE, Provenance::Learned));
        }

        let found = self
            .fuzzy(&key)
            .map(|(category, score)| resolution(category, score, Provenance::FuzzyMatched))
            .or_else(|| {
                self.semantic(text)
                    .map(|(category, score)| resolution(category, score, Provenance::Semantic))
            })?;

        if self.store.record(&key, &found.code) {
            self.learned += 1;
            tracing::debug!(name = %key, code = %found.code, provenance = found.provenance.as_str(), "Learned category mapping");
        }
        Some(found)
    }

    /// Best alias compared with every same-length word window of `key`.
    fn fuzzy(&self, key: &str) -> Option<(&CategoryDefinition, f64)> {
        let words: Vec<&str> = key.split(' ').collect();
        let mut best: Option<(&CategoryDefinition, f64)> = None;

        for (alias, category) in self.table.aliases() {
            if alias.len() < 4 {
                continue;
            }
            let width = alias.split(' ').count();
            if width > words.len() {
                continue;
            }
            let score = words
                .windows(width)
                .map(|w| w.join(" "))
                .filter(|w| digits(w) == digits(alias))
                .map(|w| strsim::jaro_winkler(&w, alias))
                .fold(0.0_f64, f64::max);
            if score >= self.config.fuzzy_threshold && best.is_none_or(|(_, s)| score > s) {
                best = Some((category, score));
            }
        }
        best
    }

    fn semantic(&self, text: &str) -> Option<(&CategoryDefinition, f64)> {
        if !self.config.semantic_enabled {
            return None;
        }
        let oracle = self.oracle.as_ref()?;
        let mut best: Option<(&CategoryDefinition, f64)> = None;

        for category in self.table.categories() {
            let score = std::iter::once(&category.label)
                .chain(category.aliases.iter())
                .filter_map(|name| oracle.similarity(text, name))
                .fold(0.0_f64, f64::max)
                .clamp(0.0, 1.0);
            if score >= self.config.semantic_threshold && best.is_none_or(|(_, s)| score > s) {
                best = Some((category, score));
            }
        }
        best
    }
}

fn resolution(category: &CategoryDefinition, confidence: f64, provenance: Provenance) -> CategoryResolution {
    CategoryResolution {
        code: category.code.clone(),
        label: category.label.clone(),
        confidence,
        provenance,
    }
}

fn pick(current: Option<CategoryResolution>, candidate: CategoryResolution) -> Option<CategoryResolution> {
    match current {
        Some(current) if current.confidence >= candidate.confidence => Some(current),
        _ => Some(candidate),
    }
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}
