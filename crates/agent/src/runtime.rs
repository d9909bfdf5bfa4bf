use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use aula_core::catalog::{CatalogStore, IntentCatalog};
use aula_core::data_store::{DataStore, DataStoreError};
use aula_core::domain::conversation::{ConversationId, MemoryEntry};
use aula_core::domain::query::QueryOutcome;
use aula_core::domain::response::{AssistantResponse, ChatRequest};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{default_scorer_factory, IntentClassifier, ScorerFactory};
use crate::generator::QueryGenerator;
use crate::memory::ConversationMemory;
use crate::synthesizer::ResponseSynthesizer;
use crate::validator::{PreparedQuery, QueryValidator};

pub const CONTINUATION_MARKER: &str = "🔄 **Continuando con el análisis anterior...**\n\n";
pub const RISK_FOLLOW_UP: &str =
    "¿Te gustaría revisar si alguno de estos estudiantes está en riesgo?";

const STARTER_SUGGESTIONS: [&str; 4] = [
    "¿Cuántos estudiantes hay en total?",
    "Muéstrame las estadísticas generales",
    "¿Qué profesores están activos?",
    "¿Hay alumnos en riesgo académico?",
];

const DEFAULT_SUGGESTIONS: [&str; 3] = [
    "¿Qué más te gustaría saber?",
    "¿Necesitas otro tipo de análisis?",
    "¿Quieres información de alguna carrera específica?",
];

fn suggestions_after(intent: &str) -> &'static [&'static str] {
    match intent {
        "estadisticas_generales" => &[
            "¿Puedes mostrarme los estudiantes de Ingeniería en Sistemas Computacionales?",
            "¿Qué profesores tenemos activos?",
            "¿Hay alumnos en riesgo?",
        ],
        "consulta_alumnos" => &[
            "¿Algunos de estos estudiantes están en riesgo?",
            "¿Cuál es el promedio por carrera?",
            "¿Quiénes son sus profesores?",
        ],
        "alumnos_riesgo" => &[
            "¿Qué profesores pueden ayudar con tutoría?",
            "¿Cuáles son las carreras más afectadas?",
            "¿Cómo está el rendimiento general?",
        ],
        _ => &DEFAULT_SUGGESTIONS,
    }
}

/// Runs one message through the whole pipeline: classify, generate, validate, execute,
/// synthesize, remember.
///
/// The caller-facing operations never fail. Data store problems and rejected queries come
/// back as ordinary responses with `structuredContext.error` set where appropriate.
pub struct AssistantRuntime {
    catalog: Arc<CatalogStore>,
    data_store: Arc<dyn DataStore>,
    memory: Arc<ConversationMemory>,
    synthesizer: ResponseSynthesizer,
    generator: QueryGenerator,
    validator: QueryValidator,
    scorer_factory: ScorerFactory,
    classifier: Mutex<Option<Arc<IntentClassifier>>>,
}

impl AssistantRuntime {
    pub fn new(
        catalog: Arc<CatalogStore>,
        data_store: Arc<dyn DataStore>,
        synthesizer: ResponseSynthesizer,
    ) -> Self {
        Self {
            catalog,
            data_store,
            memory: Arc::new(ConversationMemory::new()),
            synthesizer,
            generator: QueryGenerator::new(),
            validator: QueryValidator::new(),
            scorer_factory: default_scorer_factory(),
            classifier: Mutex::new(None),
        }
    }

    pub fn with_memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_scorer(mut self, scorer_factory: ScorerFactory) -> Self {
        self.scorer_factory = scorer_factory;
        self.classifier = Mutex::new(None);
        self
    }

    pub fn with_generator(mut self, generator: QueryGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn catalog(&self) -> Arc<IntentCatalog> {
        self.catalog.current()
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub async fn handle(&self, request: &ChatRequest) -> AssistantResponse {
        self.process_message(request.conversation_id, &request.message).await
    }

    pub async fn process_message(
        &self,
        conversation_id: ConversationId,
        message: &str,
    ) -> AssistantResponse {
        let correlation_id = Uuid::new_v4().to_string();
        let classifier = self.classifier();
        let classification = classifier.classify(message);

        info!(
            event_name = "agent.pipeline.intent_classified",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            intent = %classification.intent,
            confidence = classification.confidence,
            question_type = classification.question_type.as_str(),
            "message classified"
        );

        let terms = classifier.free_text_terms(&classification.search_terms);
        let spec =
            self.generator.generate(&classification.intent, &classification.entities, &terms);
        let prepared = self.validator.prepare(spec);

        let mut response = match self.execute(prepared, &correlation_id).await {
            Ok(outcome) => {
                let mut response = self.synthesizer.synthesize(
                    &classification.intent,
                    &outcome,
                    &classification.entities,
                );
                let context = &mut response.structured_context;
                context.insert(
                    "confianza".to_string(),
                    json!((classification.confidence * 100.0).round() / 100.0),
                );
                context.insert(
                    "tipo_pregunta".to_string(),
                    json!(classification.question_type.as_str()),
                );
                response
            }
            Err(error) => {
                warn!(
                    event_name = "agent.pipeline.data_store_failed",
                    correlation_id = %correlation_id,
                    conversation_id = %conversation_id,
                    unavailable = error.is_unavailable(),
                    "data store failed while answering"
                );
                self.synthesizer.data_store_error(&error)
            }
        };
        response
            .structured_context
            .insert("version_catalogo".to_string(), json!(classifier.catalog().version));

        let entry = MemoryEntry::new(
            message,
            classification.intent.as_str(),
            classification.entities.clone(),
            &response.text,
        );
        let previous = self.memory.record(conversation_id, entry).await;

        if let Some(previous) = previous.filter(|_| !response.is_error()) {
            if previous.intent == classification.intent {
                response.text = format!("{CONTINUATION_MARKER}{}", response.text);
            }
            if previous.intent == "consulta_alumnos"
                && !response.text.to_lowercase().contains("riesgo")
            {
                response.recommendations.push(RISK_FOLLOW_UP.to_string());
            }
        }

        info!(
            event_name = "agent.pipeline.completed",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            intent = %classification.intent,
            error = response.is_error(),
            recommendations = response.recommendations.len(),
            "message answered"
        );
        response
    }

    /// Starter questions for an empty conversation, otherwise follow-ups for the last intent.
    pub async fn suggestions(&self, conversation_id: ConversationId) -> Vec<String> {
        let suggestions: &[&str] = match self.memory.last(conversation_id).await {
            None => &STARTER_SUGGESTIONS,
            Some(entry) => suggestions_after(&entry.intent),
        };
        suggestions.iter().map(|suggestion| suggestion.to_string()).collect()
    }

    pub async fn history(&self, conversation_id: ConversationId) -> Vec<MemoryEntry> {
        self.memory.history(conversation_id).await
    }

    pub async fn clear_conversation(&self, conversation_id: ConversationId) {
        self.memory.clear(conversation_id).await;
        info!(
            event_name = "agent.pipeline.conversation_cleared",
            conversation_id = %conversation_id,
            "conversation memory cleared"
        );
    }

    /// Classifier for the current catalog snapshot, rebuilt after a reload.
    fn classifier(&self) -> Arc<IntentClassifier> {
        let catalog = self.catalog.current();
        let mut cached = self.classifier.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(classifier) = cached.as_ref() {
            if Arc::ptr_eq(classifier.catalog(), &catalog) {
                return classifier.clone();
            }
        }

        let scorer = (self.scorer_factory)(&catalog);
        let classifier = Arc::new(IntentClassifier::new(catalog, scorer));
        *cached = Some(classifier.clone());
        classifier
    }

    /// A failing label resolves to no rows; the error surfaces only when every executed
    /// label failed.
    async fn execute(
        &self,
        prepared: PreparedQuery,
        correlation_id: &str,
    ) -> Result<QueryOutcome, DataStoreError> {
        match prepared {
            PreparedQuery::Single { statement: Ok(statement), description } => {
                let rows =
                    self.data_store.execute(statement.text(), statement.parameters()).await?;
                Ok(QueryOutcome::Single { rows, description })
            }
            PreparedQuery::Single { statement: Err(_), description } => {
                Ok(QueryOutcome::Rejected { description })
            }
            PreparedQuery::Multiple { statements } => {
                if statements.values().all(Result::is_err) {
                    let labels = statements.into_keys().collect::<Vec<_>>();
                    return Ok(QueryOutcome::Rejected { description: labels.join(", ") });
                }

                let mut results = BTreeMap::new();
                let mut executed = 0;
                let mut failures = Vec::new();

                for (label, statement) in statements {
                    let rows = match statement {
                        Ok(statement) => {
                            executed += 1;
                            match self
                                .data_store
                                .execute(statement.text(), statement.parameters())
                                .await
                            {
                                Ok(rows) => rows,
                                Err(error) => {
                                    warn!(
                                        event_name = "agent.pipeline.label_failed",
                                        correlation_id = %correlation_id,
                                        label = %label,
                                        unavailable = error.is_unavailable(),
                                        "labeled query failed, continuing without it"
                                    );
                                    failures.push(error);
                                    Vec::new()
                                }
                            }
                        }
                        Err(_) => Vec::new(),
                    };
                    results.insert(label, rows);
                }

                if executed > 0 && failures.len() == executed {
                    let unavailable = failures.iter().position(DataStoreError::is_unavailable);
                    if let Some(error) = failures.into_iter().nth(unavailable.unwrap_or(0)) {
                        return Err(error);
                    }
                }
                Ok(QueryOutcome::Multiple { results })
            }
        }
    }
}
