use std::collections::HashSet;
use std::sync::Arc;

use aula_core::catalog::IntentCatalog;
use aula_core::domain::intent::{
    ClassificationResult, IntentDefinition, QuestionType, FALLBACK_CONFIDENCE, GENERAL_INTENT,
};
use tracing::debug;

use crate::extractor::EntityExtractor;
use crate::normalize::{contains_phrase, normalize_text, tokens};

/// Best scores below this fall back to the general intent.
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;
pub const KEYWORD_WEIGHT: f64 = 0.6;
pub const PATTERN_WEIGHT: f64 = 0.4;
/// Credit for a keyword that only matched through one of its synonyms.
pub const SYNONYM_HIT_WEIGHT: f64 = 0.8;

/// Search terms shorter than this are dropped.
const MIN_SEARCH_TERM_CHARS: usize = 3;

/// Scores how well a normalized message fits one intent, in `[0, 1]`.
pub trait ScoringStrategy: Send + Sync {
    fn score(&self, normalized_text: &str, intent: &IntentDefinition) -> f64;
}

/// Builds the scoring strategy for a catalog snapshot.
pub type ScorerFactory = Arc<dyn Fn(&IntentCatalog) -> Arc<dyn ScoringStrategy> + Send + Sync>;

pub fn default_scorer_factory() -> ScorerFactory {
    Arc::new(|catalog: &IntentCatalog| {
        Arc::new(KeywordPatternScorer::new(catalog)) as Arc<dyn ScoringStrategy>
    })
}

/// Weighted blend of keyword hits (with synonym credit) and the best edit-distance similarity
/// against the intent's example phrasings.
#[derive(Clone, Debug, Default)]
pub struct KeywordPatternScorer {
    synonym_groups: Vec<Vec<String>>,
}

impl KeywordPatternScorer {
    pub fn new(catalog: &IntentCatalog) -> Self {
        let synonym_groups = catalog
            .synonyms
            .iter()
            .map(|group| group.members().map(normalize_text).collect())
            .collect();
        Self { synonym_groups }
    }

    fn keyword_score(&self, text: &str, keywords: &[String]) -> f64 {
        if keywords.is_empty() {
            return 0.0;
        }

        let hits = keywords
            .iter()
            .map(|keyword| {
                let keyword = normalize_text(keyword);
                if keyword.is_empty() {
                    0.0
                } else if text.contains(keyword.as_str()) {
                    1.0
                } else if self.synonym_hit(text, &keyword) {
                    SYNONYM_HIT_WEIGHT
                } else {
                    0.0
                }
            })
            .sum::<f64>();

        (hits / keywords.len() as f64).min(1.0)
    }

    fn synonym_hit(&self, text: &str, keyword: &str) -> bool {
        self.synonym_groups
            .iter()
            .filter(|group| group.iter().any(|member| member == keyword))
            .flatten()
            .any(|member| !member.is_empty() && member != keyword && text.contains(member.as_str()))
    }
}

impl ScoringStrategy for KeywordPatternScorer {
    fn score(&self, normalized_text: &str, intent: &IntentDefinition) -> f64 {
        let keyword = self.keyword_score(normalized_text, &intent.keywords);
        let pattern = pattern_score(normalized_text, &intent.patterns);
        KEYWORD_WEIGHT * keyword + PATTERN_WEIGHT * pattern
    }
}

fn pattern_score(text: &str, patterns: &[String]) -> f64 {
    patterns
        .iter()
        .map(|pattern| normalize_text(&strip_placeholders(pattern)))
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| strsim::normalized_levenshtein(text, &pattern))
        .fold(0.0, f64::max)
}

/// Removes `{slot}` placeholders from an example phrasing.
fn strip_placeholders(pattern: &str) -> String {
    let mut stripped = String::with_capacity(pattern.len());
    let mut depth = 0usize;
    for character in pattern.chars() {
        match character {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            _ if depth == 0 => stripped.push(character),
            _ => {}
        }
    }
    stripped
}

/// Classifies messages against one catalog snapshot.
pub struct IntentClassifier {
    catalog: Arc<IntentCatalog>,
    scorer: Arc<dyn ScoringStrategy>,
    extractor: EntityExtractor,
    stopwords: HashSet<String>,
    query_words: HashSet<String>,
    vocabulary_words: HashSet<String>,
}

impl IntentClassifier {
    pub fn new(catalog: Arc<IntentCatalog>, scorer: Arc<dyn ScoringStrategy>) -> Self {
        let stopwords = normalized_words(catalog.stopwords.iter().map(String::as_str));
        let query_words = normalized_words(catalog.query_words.iter().map(String::as_str));
        let vocabulary_words = normalized_words(
            catalog
                .intents
                .iter()
                .flat_map(|intent| intent.keywords.iter().map(String::as_str))
                .chain(catalog.synonyms.iter().flat_map(|group| group.members()))
                .chain(
                    catalog
                        .vocabulary
                        .iter()
                        .flat_map(|(_, vocabulary)| vocabulary.terms.iter().map(String::as_str)),
                ),
        );

        Self {
            extractor: EntityExtractor::new(&catalog),
            catalog,
            scorer,
            stopwords,
            query_words,
            vocabulary_words,
        }
    }

    pub fn with_default_scorer(catalog: Arc<IntentCatalog>) -> Self {
        let scorer = Arc::new(KeywordPatternScorer::new(&catalog));
        Self::new(catalog, scorer)
    }

    pub fn catalog(&self) -> &Arc<IntentCatalog> {
        &self.catalog
    }

    /// Picks the highest scoring intent (first one wins ties) or the general intent when
    /// nothing clears [`CONFIDENCE_THRESHOLD`].
    pub fn classify(&self, text: &str) -> ClassificationResult {
        let normalized_text = normalize_text(text);

        let mut best: Option<(&str, f64)> = None;
        for intent in &self.catalog.intents {
            let score = self.scorer.score(&normalized_text, intent);
            let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((intent.name.as_str(), score));
            }
        }

        let (intent, confidence) = match best {
            Some((name, score)) if score >= CONFIDENCE_THRESHOLD => (name.to_string(), score),
            _ => (GENERAL_INTENT.to_string(), FALLBACK_CONFIDENCE),
        };

        debug!(
            event_name = "agent.classifier.scored",
            catalog_version = %self.catalog.version,
            intent = %intent,
            confidence,
            "message classified"
        );

        ClassificationResult {
            intent,
            confidence,
            entities: self.extractor.extract(text),
            search_terms: self.search_terms(&normalized_text),
            question_type: question_type(&normalized_text),
            normalized_text,
        }
    }

    /// Content words of the message: longer than two characters, not stopwords, not question
    /// words.
    pub fn search_terms(&self, normalized_text: &str) -> Vec<String> {
        tokens(normalized_text)
            .filter(|word| word.chars().count() >= MIN_SEARCH_TERM_CHARS)
            .filter(|word| !self.stopwords.contains(*word))
            .filter(|word| !self.query_words.contains(*word))
            .map(str::to_string)
            .collect()
    }

    /// Search terms left after removing catalog vocabulary: keywords, synonyms and entity
    /// terms. These are the words worth matching against names and identifiers.
    pub fn free_text_terms(&self, search_terms: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        search_terms
            .iter()
            .filter(|term| !self.vocabulary_words.contains(term.as_str()))
            .filter(|term| seen.insert(term.as_str()))
            .cloned()
            .collect()
    }
}

fn normalized_words<'a>(words: impl Iterator<Item = &'a str>) -> HashSet<String> {
    words
        .flat_map(|word| tokens(&normalize_text(word)).map(str::to_string).collect::<Vec<_>>())
        .collect()
}

const QUESTION_MARKERS: [(QuestionType, &[&str]); 6] = [
    (QuestionType::Count, &["cuantos", "cuantas", "cantidad", "numero", "total"]),
    (QuestionType::Identify, &["quien", "quienes", "cual", "cuales"]),
    (QuestionType::How, &["como", "de que manera"]),
    (QuestionType::Where, &["donde", "en que"]),
    (QuestionType::When, &["cuando", "que fecha"]),
    (QuestionType::Why, &["porque", "por que"]),
];

/// First question family whose marker appears as a whole phrase in the normalized text.
pub fn question_type(normalized_text: &str) -> QuestionType {
    QUESTION_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|marker| contains_phrase(normalized_text, marker)))
        .map(|(question_type, _)| *question_type)
        .unwrap_or(QuestionType::General)
}
