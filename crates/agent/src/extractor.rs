use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use aula_core::catalog::{IntentCatalog, MatchMode};
use aula_core::domain::entity::{Entities, EntityType};
use regex::Regex;

use crate::normalize::{normalize_text, phrase_position, tokens};

/// Shortest vocabulary token that may match on its own in `term_or_token` mode.
const MIN_TOKEN_CHARS: usize = 3;

#[derive(Clone, Debug)]
struct PreparedTerm {
    original: String,
    normalized: String,
    tokens: Vec<String>,
}

#[derive(Clone, Debug)]
struct PreparedVocabulary {
    entity_type: EntityType,
    match_mode: MatchMode,
    terms: Vec<PreparedTerm>,
}

/// Pulls typed entities out of raw message text using the catalog vocabularies.
#[derive(Clone, Debug)]
pub struct EntityExtractor {
    vocabularies: Vec<PreparedVocabulary>,
}

impl EntityExtractor {
    pub fn new(catalog: &IntentCatalog) -> Self {
        let stopwords = catalog
            .stopwords
            .iter()
            .map(|word| normalize_text(word))
            .collect::<HashSet<_>>();

        let vocabularies = catalog
            .vocabulary
            .iter()
            .map(|(entity_type, vocabulary)| {
                let terms = vocabulary
                    .terms
                    .iter()
                    .map(|term| prepare_term(term, &stopwords))
                    .filter(|term| !term.normalized.is_empty())
                    .collect();
                PreparedVocabulary {
                    entity_type,
                    match_mode: vocabulary.match_mode,
                    terms: keep_distinctive_tokens(terms),
                }
            })
            .collect();

        Self { vocabularies }
    }

    pub fn extract(&self, text: &str) -> Entities {
        let normalized = normalize_text(text);
        let mut entities = Entities::new();

        for vocabulary in &self.vocabularies {
            for term in vocabulary.matches(&normalized) {
                entities.push(vocabulary.entity_type, term.original.as_str());
            }
        }

        for number in numeric_runs(text) {
            entities.push(EntityType::NumericCount, number);
        }

        for noun in proper_nouns(text) {
            entities.push(EntityType::ProperNoun, noun);
        }

        entities
    }
}

impl PreparedVocabulary {
    /// Whole-term hits first, then token-only hits; each group in text order, ties in
    /// vocabulary order.
    fn matches(&self, normalized: &str) -> Vec<&PreparedTerm> {
        let mut full = Vec::new();
        let mut partial = Vec::new();

        for (index, term) in self.terms.iter().enumerate() {
            if let Some(position) = phrase_position(normalized, &term.normalized) {
                full.push((position, index, term));
                continue;
            }
            if self.match_mode == MatchMode::TermOrToken {
                let earliest = term
                    .tokens
                    .iter()
                    .filter_map(|token| phrase_position(normalized, token))
                    .min();
                if let Some(position) = earliest {
                    partial.push((position, index, term));
                }
            }
        }

        full.sort_by_key(|(position, index, _)| (*position, *index));
        partial.sort_by_key(|(position, index, _)| (*position, *index));
        full.into_iter().chain(partial).map(|(_, _, term)| term).collect()
    }
}

fn prepare_term(term: &str, stopwords: &HashSet<String>) -> PreparedTerm {
    let normalized = normalize_text(term);
    let tokens = tokens(&normalized)
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|token| !stopwords.contains(*token))
        .map(str::to_string)
        .collect();
    PreparedTerm { original: term.to_string(), normalized, tokens }
}

/// Drops tokens shared by more than one term; they cannot single out a term.
fn keep_distinctive_tokens(mut terms: Vec<PreparedTerm>) -> Vec<PreparedTerm> {
    let mut owners: HashMap<String, usize> = HashMap::new();
    for term in &terms {
        let unique = term.tokens.iter().collect::<HashSet<_>>();
        for token in unique {
            *owners.entry(token.clone()).or_default() += 1;
        }
    }
    for term in &mut terms {
        term.tokens.retain(|token| owners.get(token).copied().unwrap_or(0) <= 1);
    }
    terms
}

/// Maximal ASCII digit runs in raw text. Runs that overflow `i64` are skipped.
fn numeric_runs(text: &str) -> Vec<i64> {
    text.split(|character: char| !character.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .filter_map(|run| run.parse::<i64>().ok())
        .collect()
}

fn proper_noun_regex() -> Option<&'static Regex> {
    static PROPER_NOUN: OnceLock<Option<Regex>> = OnceLock::new();
    PROPER_NOUN.get_or_init(|| Regex::new(r"\b[A-ZÁÉÍÓÚÑ][a-záéíóúñ]+\b").ok()).as_ref()
}

/// Capitalized words of the raw text, in order, repeats kept.
fn proper_nouns(text: &str) -> Vec<String> {
    let Some(regex) = proper_noun_regex() else {
        return Vec::new();
    };
    regex.find_iter(text).map(|found| found.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use aula_core::catalog::IntentCatalog;
    use aula_core::domain::entity::{EntityType, EntityValue};

    use super::{numeric_runs, proper_nouns, EntityExtractor};

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(&IntentCatalog::builtin().expect("builtin catalog"))
    }

    fn texts(values: &[EntityValue]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn full_category_name_matches_regardless_of_accents_and_case() {
        let entities = extractor().extract("alumnos de INGENIERIA EN MECATRONICA por favor");

        assert_eq!(texts(entities.get(EntityType::Category)), vec!["Ingeniería en Mecatrónica"]);
    }

    #[test]
    fn full_category_match_is_listed_before_token_only_matches() {
        let entities = extractor().extract("estudiantes de ingeniería industrial y de software");

        assert_eq!(
            texts(entities.get(EntityType::Category)),
            vec!["Ingeniería Industrial", "Desarrollo de Software Multiplataforma"]
        );
    }

    #[test]
    fn shared_token_alone_does_not_pick_a_category() {
        let entities = extractor().extract("alumnos de ingeniería");

        assert!(entities.get(EntityType::Category).is_empty());
    }

    #[test]
    fn single_distinctive_token_matches_category() {
        let entities = extractor().extract("profesores de software");

        assert_eq!(
            texts(entities.get(EntityType::Category)),
            vec!["Desarrollo de Software Multiplataforma"]
        );
    }

    #[test]
    fn period_matches_whole_term_only() {
        let entities = extractor().extract("alumnos del cuatrimestre 10");

        assert_eq!(texts(entities.get(EntityType::Period)), vec!["cuatrimestre 10"]);
        assert_eq!(entities.get(EntityType::NumericCount), &[EntityValue::Integer(10)]);
    }

    #[test]
    fn risk_vocabularies_match_terms() {
        let entities = extractor().extract("riesgo académico de nivel crítico");

        assert_eq!(texts(entities.get(EntityType::RiskType)), vec!["academico"]);
        assert_eq!(texts(entities.get(EntityType::RiskLevel)), vec!["critico"]);
    }

    #[test]
    fn plain_question_yields_no_vocabulary_entities() {
        let entities = extractor().extract("¿cuántos estudiantes hay?");

        assert!(entities.get(EntityType::Category).is_empty());
        assert!(entities.get(EntityType::Period).is_empty());
        assert!(entities.get(EntityType::ProperNoun).is_empty());
    }

    #[test]
    fn numeric_runs_skip_overflowing_values() {
        assert_eq!(numeric_runs("grupo 3 de 25, id 99999999999999999999"), vec![3, 25]);
        assert!(numeric_runs("sin numeros").is_empty());
    }

    #[test]
    fn proper_nouns_keep_order_and_repeats() {
        assert_eq!(
            proper_nouns("Busca a Ana y a Ana López"),
            vec!["Busca", "Ana", "Ana", "López"]
        );
        assert!(proper_nouns("busca a ana").is_empty());
    }
}
