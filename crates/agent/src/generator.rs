use std::collections::BTreeMap;

use aula_core::domain::entity::{Entities, EntityValue};
use aula_core::domain::intent::GENERAL_INTENT;
use aula_core::domain::query::{QueryParam, QuerySpec, StatementSpec};
use thiserror::Error;
use tracing::warn;

use crate::schema::{
    QueryPlan, ValueBinding, FALLBACK_DESCRIPTION, FALLBACK_STATEMENT, OPEN_RISK_REPORTS,
    PERFORMANCE_BY_CAREER, STATISTICS, STUDENT_LISTING, STUDENT_SEARCH, TEACHER_LISTING,
    TEACHER_SEARCH, VALUE_SLOT,
};

/// Free-text terms beyond this many are ignored.
pub const DEFAULT_MAX_SEARCH_TERMS: usize = 4;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("no query plan for intent `{0}`")]
    UnknownIntent(String),
    #[error("entity value `{value}` cannot fill filter `{filter}`")]
    InvalidEntityValue { filter: &'static str, value: String },
    #[error("search needs at least one free-text term")]
    MissingSearchTerms,
    #[error("query plan references undeclared filter `{0}`")]
    UndeclaredFilter(&'static str),
}

/// Builds parameterized read-only statements from an intent and its entities.
#[derive(Clone, Debug)]
pub struct QueryGenerator {
    max_search_terms: usize,
}

impl Default for QueryGenerator {
    fn default() -> Self {
        Self { max_search_terms: DEFAULT_MAX_SEARCH_TERMS }
    }
}

impl QueryGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_search_terms(mut self, max_search_terms: usize) -> Self {
        self.max_search_terms = max_search_terms.max(1);
        self
    }

    /// Never fails: anything that cannot be generated becomes [`fallback_spec`].
    pub fn generate(
        &self,
        intent: &str,
        entities: &Entities,
        search_terms: &[String],
    ) -> QuerySpec {
        match self.try_generate(intent, entities, search_terms) {
            Ok(spec) => spec,
            Err(error) => {
                warn!(
                    event_name = "agent.generator.fallback",
                    intent = %intent,
                    error = %error,
                    "query generation fell back to the placeholder statement"
                );
                fallback_spec()
            }
        }
    }

    pub fn try_generate(
        &self,
        intent: &str,
        entities: &Entities,
        search_terms: &[String],
    ) -> Result<QuerySpec, GenerationError> {
        let terms = self.limit_terms(search_terms);

        match intent {
            "estadisticas_generales" => Ok(statistics_spec()),
            "consulta_alumnos" => self.single(&STUDENT_LISTING, entities, terms),
            "consulta_profesores" => self.single(&TEACHER_LISTING, entities, terms),
            "alumnos_riesgo" => self.single(&OPEN_RISK_REPORTS, entities, terms),
            "calificaciones_promedio" => self.single(&PERFORMANCE_BY_CAREER, entities, terms),
            "busqueda_especifica" => self.people_search(entities, terms),
            GENERAL_INTENT if terms.is_empty() => Ok(statistics_spec()),
            GENERAL_INTENT => self.people_search(entities, terms),
            other => Err(GenerationError::UnknownIntent(other.to_string())),
        }
    }

    fn limit_terms<'a>(&self, search_terms: &'a [String]) -> &'a [String] {
        &search_terms[..search_terms.len().min(self.max_search_terms)]
    }

    fn single(
        &self,
        plan: &QueryPlan,
        entities: &Entities,
        terms: &[String],
    ) -> Result<QuerySpec, GenerationError> {
        let statement = render_plan(plan, entities, terms)?;
        Ok(QuerySpec::single(statement, plan.description))
    }

    fn people_search(
        &self,
        entities: &Entities,
        terms: &[String],
    ) -> Result<QuerySpec, GenerationError> {
        if terms.is_empty() {
            return Err(GenerationError::MissingSearchTerms);
        }

        let mut statements = BTreeMap::new();
        statements.insert("alumnos".to_string(), render_plan(&STUDENT_SEARCH, entities, terms)?);
        statements
            .insert("profesores".to_string(), render_plan(&TEACHER_SEARCH, entities, terms)?);
        Ok(QuerySpec::Multiple { statements })
    }
}

pub fn statistics_spec() -> QuerySpec {
    let statements = STATISTICS
        .iter()
        .map(|(label, text)| (label.to_string(), StatementSpec::literal(*text)))
        .collect();
    QuerySpec::Multiple { statements }
}

pub fn fallback_spec() -> QuerySpec {
    QuerySpec::single(StatementSpec::literal(FALLBACK_STATEMENT), FALLBACK_DESCRIPTION)
}

/// Renders one plan. Entity values and search terms only ever appear as parameters.
pub fn render_plan(
    plan: &QueryPlan,
    entities: &Entities,
    terms: &[String],
) -> Result<StatementSpec, GenerationError> {
    let table = plan.table;
    let mut conditions = Vec::new();
    let mut parameters = Vec::new();

    for &name in plan.base_filters {
        let filter = table.filter(name).ok_or(GenerationError::UndeclaredFilter(name))?;
        conditions.push(filter.clause.to_string());
    }

    for &(entity_type, name) in plan.entity_filters {
        let Some(value) = entities.first(entity_type) else {
            continue;
        };
        let filter = table.filter(name).ok_or(GenerationError::UndeclaredFilter(name))?;
        let Some(binding) = filter.binding else {
            conditions.push(filter.clause.to_string());
            continue;
        };
        parameters.push(bind_value(filter.name, binding, value)?);
        conditions.push(filter.clause.replace(VALUE_SLOT, "?"));
    }

    let searchable =
        plan.searchable.iter().filter_map(|label| table.field(label)).collect::<Vec<_>>();
    if !searchable.is_empty() && !terms.is_empty() {
        let mut alternatives = Vec::new();
        for term in terms {
            for column in &searchable {
                alternatives.push(format!("{column} LIKE ? ESCAPE '\\'"));
                parameters.push(QueryParam::Text(format!("%{}%", escape_like(term))));
            }
        }
        conditions.push(format!("({})", alternatives.join(" OR ")));
    }

    let columns = table
        .fields
        .iter()
        .map(|(label, expression)| format!("{expression} AS {label}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut text = String::from("SELECT ");
    if plan.distinct {
        text.push_str("DISTINCT ");
    }
    text.push_str(&columns);
    text.push_str(" FROM ");
    text.push_str(table.from);
    for join in table.joins {
        text.push(' ');
        text.push_str(join);
    }
    if !conditions.is_empty() {
        text.push_str(" WHERE ");
        text.push_str(&conditions.join(" AND "));
    }
    if !plan.group_by.is_empty() {
        text.push_str(" GROUP BY ");
        text.push_str(&plan.group_by.join(", "));
    }
    if !plan.order_by.is_empty() {
        text.push_str(" ORDER BY ");
        text.push_str(plan.order_by);
    }
    if let Some(limit) = plan.limit {
        text.push_str(&format!(" LIMIT {limit}"));
    }

    Ok(StatementSpec { text, parameters })
}

fn bind_value(
    filter: &'static str,
    binding: ValueBinding,
    value: &EntityValue,
) -> Result<QueryParam, GenerationError> {
    match (binding, value) {
        (ValueBinding::Contains, value) => Ok(QueryParam::Text(format!("%{value}%"))),
        (ValueBinding::Exact, value) => Ok(QueryParam::Text(value.to_string())),
        (ValueBinding::Integer, EntityValue::Integer(number)) => Ok(QueryParam::Integer(*number)),
        (ValueBinding::Integer, EntityValue::Text(text)) => first_integer(text)
            .map(QueryParam::Integer)
            .ok_or_else(|| GenerationError::InvalidEntityValue { filter, value: text.clone() }),
    }
}

/// Makes `%`, `_` and the escape character literal inside a `LIKE` pattern.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for character in term.chars() {
        if matches!(character, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

fn first_integer(text: &str) -> Option<i64> {
    text.split(|character: char| !character.is_ascii_digit())
        .find(|run| !run.is_empty())
        .and_then(|run| run.parse().ok())
}

#[cfg(test)]
mod tests {
    use aula_core::domain::entity::{Entities, EntityType};
    use aula_core::domain::query::{QueryParam, QuerySpec};

    use super::{fallback_spec, GenerationError, QueryGenerator};
    use crate::schema::FALLBACK_STATEMENT;

    fn single(spec: &QuerySpec) -> (&str, &[QueryParam]) {
        match spec {
            QuerySpec::Single { text, parameters, .. } => (text.as_str(), parameters.as_slice()),
            QuerySpec::Multiple { .. } => panic!("expected a single statement"),
        }
    }

    #[test]
    fn student_listing_without_entities_has_no_parameters() {
        let spec = QueryGenerator::new().generate("consulta_alumnos", &Entities::new(), &[]);
        let (text, parameters) = single(&spec);

        assert!(text.starts_with("SELECT a.matricula AS matricula, u.nombre AS nombre"));
        assert!(text.contains("WHERE a.estado_alumno = 'activo' ORDER BY u.apellido, u.nombre"));
        assert!(text.ends_with("LIMIT 50"));
        assert!(parameters.is_empty());
    }

    #[test]
    fn category_and_period_are_bound_as_parameters() {
        let mut entities = Entities::new();
        entities.push(EntityType::Category, "Ingeniería en Mecatrónica");
        entities.push(EntityType::Period, "cuatrimestre 3");

        let spec = QueryGenerator::new().generate("consulta_alumnos", &entities, &[]);
        let (text, parameters) = single(&spec);

        assert!(text.contains("c.nombre LIKE ?"));
        assert!(text.contains("a.cuatrimestre_actual = ?"));
        assert!(!text.contains("Mecatr"));
        assert_eq!(
            parameters,
            &[
                QueryParam::Text("%Ingeniería en Mecatrónica%".to_string()),
                QueryParam::Integer(3)
            ]
        );
    }

    #[test]
    fn free_text_terms_become_like_parameters() {
        let terms = vec!["drop".to_string(), "table".to_string()];
        let spec = QueryGenerator::new().generate("consulta_alumnos", &Entities::new(), &terms);
        let (text, parameters) = single(&spec);

        assert!(text.contains(
            "(u.nombre LIKE ? ESCAPE '\\' OR u.apellido LIKE ? ESCAPE '\\' OR a.matricula LIKE ?"
        ));
        assert!(!text.to_ascii_uppercase().contains("DROP"));
        assert_eq!(parameters.len(), 6);
        assert_eq!(parameters[0], QueryParam::Text("%drop%".to_string()));
    }

    #[test]
    fn like_wildcards_in_search_terms_match_literally() {
        let terms = vec!["___".to_string(), "50%".to_string()];
        let spec = QueryGenerator::new().generate("consulta_profesores", &Entities::new(), &terms);
        let (_, parameters) = single(&spec);

        assert_eq!(parameters[0], QueryParam::Text("%\\_\\_\\_%".to_string()));
        assert!(parameters.contains(&QueryParam::Text("%50\\%%".to_string())));
    }

    #[test]
    fn search_terms_are_capped() {
        let terms = (0..10).map(|index| format!("termino{index}")).collect::<Vec<_>>();
        let generator = QueryGenerator::new().with_max_search_terms(2);
        let spec = generator.generate("consulta_profesores", &Entities::new(), &terms);

        assert_eq!(single(&spec).1.len(), 6);
    }

    #[test]
    fn risk_plan_orders_by_severity_and_filters_level() {
        let mut entities = Entities::new();
        entities.push(EntityType::RiskLevel, "alto");

        let spec = QueryGenerator::new().generate("alumnos_riesgo", &entities, &[]);
        let (text, parameters) = single(&spec);

        assert!(text.starts_with("SELECT DISTINCT "));
        assert!(text.contains("r.estado IN ('abierto', 'en_proceso') AND r.nivel_riesgo = ?"));
        assert!(text.contains("ORDER BY CASE r.nivel_riesgo WHEN 'critico' THEN 4"));
        assert_eq!(parameters, &[QueryParam::Text("alto".to_string())]);
    }

    #[test]
    fn performance_plan_groups_by_career_without_limit() {
        let spec = QueryGenerator::new().generate("calificaciones_promedio", &Entities::new(), &[]);
        let (text, _) = single(&spec);

        assert!(text.contains("GROUP BY c.id, c.nombre ORDER BY promedio_carrera DESC"));
        assert!(!text.contains("LIMIT"));
    }

    #[test]
    fn statistics_and_search_produce_labeled_statements() {
        let generator = QueryGenerator::new();
        let stats = generator.generate("estadisticas_generales", &Entities::new(), &[]);
        assert_eq!(
            stats.labels(),
            vec!["promedio_general", "total_alumnos", "total_carreras", "total_profesores"]
        );

        let terms = vec!["roberto".to_string()];
        let search = generator.generate("busqueda_especifica", &Entities::new(), &terms);
        assert_eq!(search.labels(), vec!["alumnos", "profesores"]);

        let general = generator.generate("general", &Entities::new(), &terms);
        assert_eq!(general, search);
        assert_eq!(generator.generate("general", &Entities::new(), &[]), stats);
    }

    #[test]
    fn unusable_requests_fall_back() {
        let generator = QueryGenerator::new();

        assert_eq!(
            generator.try_generate("inexistente", &Entities::new(), &[]),
            Err(GenerationError::UnknownIntent("inexistente".to_string()))
        );
        assert_eq!(
            generator.try_generate("busqueda_especifica", &Entities::new(), &[]),
            Err(GenerationError::MissingSearchTerms)
        );
        assert_eq!(generator.generate("inexistente", &Entities::new(), &[]), fallback_spec());

        let mut entities = Entities::new();
        entities.push(EntityType::Period, "sin numero");
        assert!(matches!(
            generator.try_generate("consulta_alumnos", &entities, &[]),
            Err(GenerationError::InvalidEntityValue { filter: "cuatrimestre", .. })
        ));

        let fallback = fallback_spec();
        let (text, parameters) = single(&fallback);
        assert_eq!(text, FALLBACK_STATEMENT);
        assert!(parameters.is_empty());
    }
}
