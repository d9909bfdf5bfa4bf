//! Turns query outcomes into conversational Spanish responses.
//!
//! Each intent has three interchangeable Tera templates; one is picked at random per response.
//! The random source is injected so tests and reproducible runs can pin it with a seed.

use std::sync::{Mutex, PoisonError};

use aula_core::data_store::DataStoreError;
use aula_core::domain::entity::{Entities, EntityType};
use aula_core::domain::query::{QueryOutcome, Row};
use aula_core::domain::response::AssistantResponse;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::warn;

use crate::schema::FALLBACK_DESCRIPTION;

pub const DEFAULT_MAX_DISPLAY_ROWS: usize = 10;
pub const VARIANTS_PER_INTENT: usize = 3;

pub const NO_RESULTS_TEXT: &str = "📭 No se encontraron resultados para esta consulta.";
const EMPTY_TABLE_TEXT: &str = "📭 No se encontraron resultados.";

/// Students-per-teacher ratio above which the load is reported as high.
pub const HIGH_LOAD_RATIO: f64 = 20.0;
/// Students-per-teacher ratio below which the load is reported as light.
pub const LOW_LOAD_RATIO: f64 = 10.0;
pub const EXCELLENT_AVERAGE: f64 = 8.5;
pub const GOOD_AVERAGE: f64 = 7.5;
pub const LOW_GRADE_THRESHOLD: f64 = 7.0;
pub const LARGE_GROUP_ROWS: usize = 30;
pub const MANY_RISK_REPORTS: usize = 10;
pub const MENTOR_EXPERIENCE_YEARS: f64 = 10.0;
const HEALTHY_ENROLLMENT: f64 = 200.0;
const LOW_ENROLLMENT: f64 = 100.0;

const TEMPLATES: [(&str, &str); 21] = [
    (
        "estadisticas_generales.1.tera",
        include_str!("../../../templates/responses/estadisticas_generales.1.tera"),
    ),
    (
        "estadisticas_generales.2.tera",
        include_str!("../../../templates/responses/estadisticas_generales.2.tera"),
    ),
    (
        "estadisticas_generales.3.tera",
        include_str!("../../../templates/responses/estadisticas_generales.3.tera"),
    ),
    (
        "consulta_alumnos.1.tera",
        include_str!("../../../templates/responses/consulta_alumnos.1.tera"),
    ),
    (
        "consulta_alumnos.2.tera",
        include_str!("../../../templates/responses/consulta_alumnos.2.tera"),
    ),
    (
        "consulta_alumnos.3.tera",
        include_str!("../../../templates/responses/consulta_alumnos.3.tera"),
    ),
    (
        "consulta_profesores.1.tera",
        include_str!("../../../templates/responses/consulta_profesores.1.tera"),
    ),
    (
        "consulta_profesores.2.tera",
        include_str!("../../../templates/responses/consulta_profesores.2.tera"),
    ),
    (
        "consulta_profesores.3.tera",
        include_str!("../../../templates/responses/consulta_profesores.3.tera"),
    ),
    ("alumnos_riesgo.1.tera", include_str!("../../../templates/responses/alumnos_riesgo.1.tera")),
    ("alumnos_riesgo.2.tera", include_str!("../../../templates/responses/alumnos_riesgo.2.tera")),
    ("alumnos_riesgo.3.tera", include_str!("../../../templates/responses/alumnos_riesgo.3.tera")),
    (
        "calificaciones_promedio.1.tera",
        include_str!("../../../templates/responses/calificaciones_promedio.1.tera"),
    ),
    (
        "calificaciones_promedio.2.tera",
        include_str!("../../../templates/responses/calificaciones_promedio.2.tera"),
    ),
    (
        "calificaciones_promedio.3.tera",
        include_str!("../../../templates/responses/calificaciones_promedio.3.tera"),
    ),
    (
        "busqueda_especifica.1.tera",
        include_str!("../../../templates/responses/busqueda_especifica.1.tera"),
    ),
    (
        "busqueda_especifica.2.tera",
        include_str!("../../../templates/responses/busqueda_especifica.2.tera"),
    ),
    (
        "busqueda_especifica.3.tera",
        include_str!("../../../templates/responses/busqueda_especifica.3.tera"),
    ),
    ("general.1.tera", include_str!("../../../templates/responses/general.1.tera")),
    ("general.2.tera", include_str!("../../../templates/responses/general.2.tera")),
    ("general.3.tera", include_str!("../../../templates/responses/general.3.tera")),
];

const APOLOGIES: [&str; 2] = [
    "❌ **Lo siento, hubo un problema procesando tu consulta.**\n\nPuedes intentar \
     preguntarme sobre:\n• Estadísticas generales\n• Información de estudiantes\n• Datos de \
     profesores\n• Alumnos en riesgo académico",
    "🔧 **No pude procesar esa consulta específica.**\n\nTe recomiendo preguntar:\n• ¿Cuántos \
     estudiantes hay?\n• ¿Qué profesores están activos?\n• ¿Hay alumnos en riesgo?\n• \
     Estadísticas por carrera",
];

const APOLOGY_RECOMMENDATIONS: [&str; 3] = [
    "Reformula tu pregunta de manera más específica",
    "Pregunta sobre temas académicos específicos",
    "Usa palabras clave como 'estudiantes', 'profesores', 'carreras'",
];

const UNAVAILABLE_TEXT: &str = "❌ **Lo siento, hubo un problema procesando tu consulta.**\n\n\
     Por favor intenta de nuevo o pregúntame sobre:\n• Estadísticas generales del sistema\n\
     • Información de estudiantes por carrera\n• Estado de profesores activos\n\
     • Alumnos en riesgo académico";

const QUERY_FAILED_TEXT: &str = "⚠️ **La base de datos no pudo completar la consulta.**\n\n\
     Intenta acotar la búsqueda (por ejemplo, indicando una carrera o un cuatrimestre) o \
     reformula la pregunta.";

const SYSTEM_ERROR_RECOMMENDATIONS: [&str; 3] = [
    "Reformular la pregunta de manera más específica",
    "Usar palabras clave como 'estudiantes', 'profesores', 'carreras'",
    "Preguntar sobre estadísticas o datos específicos",
];

const NO_RESULTS_RECOMMENDATIONS: [&str; 3] = [
    "Reformula tu pregunta con otros términos",
    "Verifica el nombre de la carrera o el cuatrimestre",
    "Pregunta por las estadísticas generales",
];

/// Columns shown in result listings, in this order, with their display labels.
const DISPLAY_COLUMNS: [(&str, &str); 7] = [
    ("nombre", "Nombre"),
    ("apellido", "Apellido"),
    ("carrera", "Carrera"),
    ("matricula", "Matricula"),
    ("numero_empleado", "Empleado"),
    ("tipo_riesgo", "Tipo"),
    ("nivel_riesgo", "Nivel"),
];

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("no response template registered as `{0}`")]
    MissingTemplate(String),
    #[error("could not build response context: {0}")]
    Context(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeachingLoad {
    Light,
    Balanced,
    High,
}

impl TeachingLoad {
    pub fn classify(students_per_teacher: f64) -> Self {
        if students_per_teacher > HIGH_LOAD_RATIO {
            Self::High
        } else if students_per_teacher < LOW_LOAD_RATIO {
            Self::Light
        } else {
            Self::Balanced
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "baja",
            Self::Balanced => "equilibrada",
            Self::High => "alta",
        }
    }
}

/// Aggregates read from the statistics statements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatsSnapshot {
    pub students: Option<f64>,
    pub teachers: Option<f64>,
    pub careers: Option<f64>,
    pub average: Option<f64>,
}

impl StatsSnapshot {
    pub fn from_outcome(outcome: &QueryOutcome) -> Self {
        let first = |label: &str, column: &str| {
            outcome.labeled(label).first().and_then(|row| number(row, column))
        };
        Self {
            students: first("total_alumnos", "total"),
            teachers: first("total_profesores", "total"),
            careers: first("total_carreras", "total"),
            average: first("promedio_general", "promedio"),
        }
    }

    pub fn is_statistics(outcome: &QueryOutcome) -> bool {
        matches!(
            outcome,
            QueryOutcome::Multiple { results } if results.contains_key("total_alumnos")
        )
    }

    pub fn students_per_teacher(&self) -> Option<f64> {
        match (self.students, self.teachers) {
            (Some(students), Some(teachers)) if students > 0.0 && teachers > 0.0 => {
                Some(students / teachers)
            }
            _ => None,
        }
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(students) = self.students {
            lines.push(format!("• **{} Estudiantes Activos** 👨‍🎓", display_count(students)));
        }
        if let Some(teachers) = self.teachers {
            lines.push(format!("• **{} Profesores Activos** 👨‍🏫", display_count(teachers)));
        }
        if let Some(careers) = self.careers {
            lines.push(format!("• **{} Carreras Disponibles** 📚", display_count(careers)));
        }
        if let Some(average) = self.average.filter(|average| *average > 0.0) {
            lines.push(format!("• **Promedio General: {average:.2}** 📊"));
        }
        lines
    }

    /// Narrative analysis and the recommendations it implies.
    fn analysis(&self) -> (String, Vec<String>) {
        let mut parts = Vec::new();
        let mut recommendations = Vec::new();

        if let Some(ratio) = self.students_per_teacher() {
            parts.push(match TeachingLoad::classify(ratio) {
                TeachingLoad::High => {
                    format!("⚠️ **Alta carga docente:** {ratio:.1} estudiantes por profesor.")
                }
                TeachingLoad::Light => {
                    format!(
                        "✅ **Buena ratio profesor-alumno:** {ratio:.1} estudiantes por profesor."
                    )
                }
                TeachingLoad::Balanced => {
                    format!("👍 **Ratio equilibrada:** {ratio:.1} estudiantes por profesor.")
                }
            });
        }

        if let Some(average) = self.average.filter(|average| *average > 0.0) {
            if average >= EXCELLENT_AVERAGE {
                parts.push("🌟 **Excelente rendimiento académico general.**".to_string());
            } else if average >= GOOD_AVERAGE {
                parts.push(
                    "👍 **Buen rendimiento académico con oportunidades de mejora.**".to_string(),
                );
                recommendations.push("Implementar programas de apoyo académico".to_string());
            } else {
                parts.push(
                    "📈 **Oportunidad de implementar programas de apoyo académico.**".to_string(),
                );
                recommendations.push("Revisar metodologías de enseñanza".to_string());
            }
        }

        match self.students {
            Some(students) if students > HEALTHY_ENROLLMENT => {
                parts.push(format!(
                    "✅ **Matrícula Saludable:** {} estudiantes activos indican una institución \
                     en crecimiento.",
                    display_count(students)
                ));
                recommendations.push("Mantener programas de retención estudiantil".to_string());
            }
            Some(students) if students < LOW_ENROLLMENT => {
                parts.push(format!(
                    "📈 **Oportunidad de Crecimiento:** Con {} estudiantes, hay potencial para \
                     aumentar matrícula.",
                    display_count(students)
                ));
                recommendations.push("Implementar estrategias de captación".to_string());
            }
            _ => {}
        }

        if parts.is_empty() {
            parts.push("📊 **Sistema funcionando normalmente.**".to_string());
        }
        (parts.join("\n\n"), recommendations)
    }

    fn to_json(&self) -> Value {
        json!({
            "alumnos": self.students,
            "profesores": self.teachers,
            "carreras": self.careers,
            "promedio": self.average,
        })
    }
}

/// Template family plus the values that fill it.
struct Draft {
    family: &'static str,
    slots: Vec<(&'static str, String)>,
    recommendations: Vec<String>,
    context: Map<String, Value>,
}

impl Draft {
    fn new(family: &'static str) -> Self {
        Self { family, slots: Vec::new(), recommendations: Vec::new(), context: Map::new() }
    }

    fn slot(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.slots.push((name, value.into()));
        self
    }

    fn recommend<I, S>(mut self, recommendations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommendations.extend(recommendations.into_iter().map(Into::into));
        self
    }

    fn context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

pub struct ResponseSynthesizer {
    tera: Tera,
    rng: Mutex<StdRng>,
    max_display_rows: usize,
}

impl ResponseSynthesizer {
    /// Template choice seeded from the OS.
    pub fn new() -> Result<Self, SynthesisError> {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Template choice reproducible from `seed`.
    pub fn seeded(seed: u64) -> Result<Self, SynthesisError> {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_seed(seed: Option<u64>) -> Result<Self, SynthesisError> {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::new(),
        }
    }

    pub fn with_rng(rng: StdRng) -> Result<Self, SynthesisError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES)?;
        Ok(Self { tera, rng: Mutex::new(rng), max_display_rows: DEFAULT_MAX_DISPLAY_ROWS })
    }

    pub fn with_max_display_rows(mut self, max_display_rows: usize) -> Self {
        self.max_display_rows = max_display_rows.max(1);
        self
    }

    /// Never fails; rendering problems degrade to [`ResponseSynthesizer::apology`].
    pub fn synthesize(
        &self,
        intent: &str,
        outcome: &QueryOutcome,
        entities: &Entities,
    ) -> AssistantResponse {
        match self.try_synthesize(intent, outcome, entities) {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "agent.synthesizer.failed",
                    intent = %intent,
                    error = %error,
                    "response synthesis failed, answering with an apology"
                );
                self.apology()
            }
        }
    }

    pub fn try_synthesize(
        &self,
        intent: &str,
        outcome: &QueryOutcome,
        entities: &Entities,
    ) -> Result<AssistantResponse, SynthesisError> {
        let mut context = Map::new();
        context.insert("tipo_consulta".to_string(), json!(intent));
        context.insert("entidades".to_string(), serde_json::to_value(entities)?);
        context.insert("total_datos".to_string(), json!(outcome.total_rows()));
        context.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));

        if outcome.is_empty() {
            context.insert("sin_resultados".to_string(), json!(true));
            context.insert(
                "rechazada".to_string(),
                json!(matches!(outcome, QueryOutcome::Rejected { .. })),
            );
            return Ok(AssistantResponse {
                text: NO_RESULTS_TEXT.to_string(),
                structured_context: context,
                recommendations: NO_RESULTS_RECOMMENDATIONS.iter().map(|r| r.to_string()).collect(),
            });
        }

        let draft = match (intent, outcome) {
            (_, QueryOutcome::Single { description, .. })
                if description == FALLBACK_DESCRIPTION =>
            {
                self.general_draft(outcome)
            }
            ("estadisticas_generales", QueryOutcome::Multiple { .. }) => {
                self.statistics_draft(outcome)
            }
            ("consulta_alumnos", QueryOutcome::Single { rows, .. }) => {
                self.students_draft(rows, entities)
            }
            ("consulta_profesores", QueryOutcome::Single { rows, .. }) => self.teachers_draft(rows),
            ("alumnos_riesgo", QueryOutcome::Single { rows, .. }) => self.risk_draft(rows),
            ("calificaciones_promedio", QueryOutcome::Single { rows, .. }) => {
                self.grades_draft(rows)
            }
            ("busqueda_especifica", QueryOutcome::Multiple { .. }) => {
                self.search_draft(outcome, entities)
            }
            _ => self.general_draft(outcome),
        };

        let text = self.render(&draft)?;
        context.extend(draft.context);
        Ok(AssistantResponse {
            text,
            structured_context: context,
            recommendations: draft.recommendations,
        })
    }

    /// Generic apology used when nothing better can be said.
    pub fn apology(&self) -> AssistantResponse {
        let text = APOLOGIES[self.pick(APOLOGIES.len())];
        let mut context = Map::new();
        context.insert("tipo_consulta".to_string(), json!("error"));
        context.insert("error".to_string(), json!(true));
        context.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        AssistantResponse {
            text: text.to_string(),
            structured_context: context,
            recommendations: APOLOGY_RECOMMENDATIONS.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Response for a data store failure. Unavailability gets the generic system message;
    /// a failed statement gets a more specific one.
    pub fn data_store_error(&self, error: &DataStoreError) -> AssistantResponse {
        let (text, kind) = match error {
            DataStoreError::Unavailable(_) => (UNAVAILABLE_TEXT, "error_sistema"),
            DataStoreError::QueryFailed(_) => (QUERY_FAILED_TEXT, "error_consulta"),
        };
        let mut context = Map::new();
        context.insert("tipo_consulta".to_string(), json!(kind));
        context.insert("error".to_string(), json!(true));
        context.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        AssistantResponse {
            text: text.to_string(),
            structured_context: context,
            recommendations: SYSTEM_ERROR_RECOMMENDATIONS.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Numbered listing of at most `max_display_rows` rows.
    pub fn format_rows(&self, rows: &[Row]) -> String {
        if rows.is_empty() {
            return EMPTY_TABLE_TEXT.to_string();
        }

        let mut lines = rows
            .iter()
            .take(self.max_display_rows)
            .enumerate()
            .map(|(index, row)| format!("**{}.** {}", index + 1, describe_row(row)))
            .collect::<Vec<_>>()
            .join("\n");

        if rows.len() > self.max_display_rows {
            lines.push_str(&format!(
                "\n\n*... y {} resultados más.*",
                rows.len() - self.max_display_rows
            ));
        }
        lines
    }

    fn render(&self, draft: &Draft) -> Result<String, SynthesisError> {
        let name = format!("{}.{}.tera", draft.family, self.pick(VARIANTS_PER_INTENT) + 1);
        if !self.tera.get_template_names().any(|registered| registered == name) {
            return Err(SynthesisError::MissingTemplate(name));
        }

        let mut context = Context::new();
        for (slot, value) in &draft.slots {
            context.insert(*slot, value);
        }
        Ok(self.tera.render(&name, &context)?.trim_end().to_string())
    }

    fn pick(&self, choices: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..choices.max(1))
    }

    fn statistics_draft(&self, outcome: &QueryOutcome) -> Draft {
        let stats = StatsSnapshot::from_outcome(outcome);
        let (analysis, recommendations) = stats.analysis();
        let mut draft = Draft::new("estadisticas_generales")
            .slot("stats", stats_text(&stats))
            .slot("analysis", analysis)
            .recommend(recommendations)
            .recommend(["Consultar estudiantes por carrera", "Revisar alumnos en riesgo académico"])
            .context("estadisticas", stats.to_json());
        if let Some(ratio) = stats.students_per_teacher() {
            draft = draft.context("carga_docente", json!(TeachingLoad::classify(ratio).as_str()));
        }
        draft
    }

    fn students_draft(&self, rows: &[Row], entities: &Entities) -> Draft {
        let mut summary = format!("📈 **Análisis:** {} estudiantes encontrados.", rows.len());
        if let Some(career) = entities.first(EntityType::Category) {
            summary.push_str(&format!(" Carrera: **{career}**."));
        }
        if let Some(average) = mean(rows.iter().filter_map(|row| number(row, "promedio_general"))) {
            summary.push_str(&format!(" Promedio del grupo: {average:.2}."));
        }

        let mut extra = Vec::new();
        if rows.len() > LARGE_GROUP_ROWS {
            extra.push(
                "Considerar dividir en grupos más pequeños para mejor seguimiento".to_string(),
            );
        }
        let low = rows
            .iter()
            .filter(|row| {
                number(row, "promedio_general").is_some_and(|grade| grade < LOW_GRADE_THRESHOLD)
            })
            .count();
        if low > 0 {
            extra.push(format!("Revisar {low} estudiantes con promedio menor a 7.0"));
        }

        Draft::new("consulta_alumnos")
            .slot("data", self.format_rows(rows))
            .slot("summary", summary)
            .recommend([
                "Filtrar por carrera específica para análisis detallado",
                "Revisar estudiantes con promedio menor a 7.0",
                "Identificar alumnos que necesitan tutoría",
            ])
            .recommend(extra)
            .context("total_resultados", json!(rows.len()))
            .context("promedios_bajos", json!(low))
    }

    fn teachers_draft(&self, rows: &[Row]) -> Draft {
        let summary = format!(
            "📋 **Datos Disponibles:** {} profesores con número de empleado, nombres, carrera \
             asignada, título académico, especialidad y años de experiencia.",
            rows.len()
        );
        let mentors = rows
            .iter()
            .filter(|row| {
                number(row, "experiencia").is_some_and(|years| years > MENTOR_EXPERIENCE_YEARS)
            })
            .count();

        let mut draft = Draft::new("consulta_profesores")
            .slot("data", self.format_rows(rows))
            .slot("summary", summary)
            .recommend([
                "Identificar profesores con mayor experiencia para mentoría",
                "Revisar distribución de docentes por carrera",
                "Analizar especialidades disponibles",
            ])
            .context("total_resultados", json!(rows.len()));
        if mentors > 0 {
            draft = draft.recommend([format!(
                "🌟 {mentors} profesores con más de 10 años de experiencia pueden ser mentores"
            )]);
        }
        draft
    }

    fn risk_draft(&self, rows: &[Row]) -> Draft {
        let critical = rows
            .iter()
            .filter(|row| matches!(text(row, "nivel_riesgo"), Some("alto" | "critico")))
            .count();

        let mut recommendations = vec![
            "🎯 Programar sesiones de tutoría inmediata".to_string(),
            "📞 Contactar a estudiantes y padres de familia".to_string(),
            "📋 Crear plan de seguimiento personalizado".to_string(),
            "🤝 Asignar mentor académico especializado".to_string(),
        ];
        if rows.len() > MANY_RISK_REPORTS {
            recommendations
                .push("Alta cantidad de reportes - implementar intervención masiva".to_string());
        }
        if critical > 0 {
            recommendations.push(format!("Atención URGENTE: {critical} casos críticos"));
        }

        let bullets = recommendations
            .iter()
            .map(|recommendation| format!("• {recommendation}"))
            .collect::<Vec<_>>()
            .join("\n");

        Draft::new("alumnos_riesgo")
            .slot("data", self.format_rows(rows))
            .slot("recommendations", bullets)
            .recommend(recommendations)
            .context("total_resultados", json!(rows.len()))
            .context("casos_criticos", json!(critical))
            .context("urgencia", json!(if critical > 0 { "alta" } else { "moderada" }))
    }

    fn grades_draft(&self, rows: &[Row]) -> Draft {
        let lines = rows
            .iter()
            .take(self.max_display_rows)
            .map(|row| {
                format!(
                    "• **{}:** promedio {} (mínimo {}, máximo {}, {} estudiantes)",
                    text(row, "carrera").unwrap_or("Sin carrera"),
                    display_field(row, "promedio_carrera"),
                    display_field(row, "promedio_minimo"),
                    display_field(row, "promedio_maximo"),
                    display_field(row, "total_alumnos"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let ranked = rows
            .iter()
            .filter_map(|row| Some((text(row, "carrera")?, number(row, "promedio_carrera")?)))
            .collect::<Vec<_>>();
        let best = ranked.iter().copied().max_by(|a, b| a.1.total_cmp(&b.1));
        let worst = ranked.iter().copied().min_by(|a, b| a.1.total_cmp(&b.1));
        let insights = match (best, worst) {
            (Some(best), Some(worst)) if ranked.len() > 1 => format!(
                "💡 **Insights:** Mejor promedio en **{}** ({:.2}); menor promedio en **{}** \
                 ({:.2}).",
                best.0, best.1, worst.0, worst.1
            ),
            (Some(best), _) => {
                format!("💡 **Insights:** **{}** tiene un promedio de {:.2}.", best.0, best.1)
            }
            _ => "💡 **Insights:** Los datos incluyen promedio por carrera, mínimos, máximos y \
                  número total de estudiantes evaluados."
                .to_string(),
        };

        Draft::new("calificaciones_promedio")
            .slot("data", format!("📊 **Análisis de Promedios por Carrera:**\n\n{lines}"))
            .slot("insights", insights)
            .recommend([
                "Identificar carreras con mejor rendimiento",
                "Implementar mejores prácticas en carreras con menor promedio",
                "Reconocer estudiantes destacados",
                "Crear programas de apoyo académico focalizados",
            ])
            .context("total_resultados", json!(rows.len()))
            .context("nivel_analisis", json!("carrera"))
    }

    fn search_draft(&self, outcome: &QueryOutcome, entities: &Entities) -> Draft {
        let names = entities
            .get(EntityType::ProperNoun)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        Draft::new("busqueda_especifica")
            .slot("data", self.sections(outcome))
            .slot(
                "context",
                "ℹ️ **Contexto:** La búsqueda incluye nombres, apellidos, matrículas y números \
                 de empleado.",
            )
            .recommend([
                "Refinar búsqueda con términos más específicos",
                "Buscar por matrícula para resultados exactos",
            ])
            .context("total_resultados", json!(outcome.total_rows()))
            .context("terminos_busqueda", json!(names))
    }

    fn general_draft(&self, outcome: &QueryOutcome) -> Draft {
        let mut draft = Draft::new("general")
            .slot(
                "additional_info",
                "💡 Para mejores resultados, puedes preguntar sobre estadísticas, estudiantes, \
                 profesores o situaciones de riesgo académico.",
            )
            .recommend([
                "Pregunta sobre estadísticas generales",
                "Consulta información de estudiantes por carrera",
                "Revisa el estado de profesores activos",
            ]);

        let data = if StatsSnapshot::is_statistics(outcome) {
            let stats = StatsSnapshot::from_outcome(outcome);
            let (analysis, recommendations) = stats.analysis();
            draft = draft.recommend(recommendations).context("estadisticas", stats.to_json());
            format!("{}\n\n{analysis}", stats_text(&stats))
        } else if outcome.rows().is_empty() {
            self.sections(outcome)
        } else {
            self.format_rows(outcome.rows())
        };

        draft.slot("data", data).context("total_resultados", json!(outcome.total_rows()))
    }

    /// Labeled result groups of a multi-statement outcome, skipping empty ones.
    fn sections(&self, outcome: &QueryOutcome) -> String {
        let QueryOutcome::Multiple { results } = outcome else {
            return self.format_rows(outcome.rows());
        };

        let sections = results
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(label, rows)| {
                format!(
                    "**{} ({}):**\n{}",
                    section_title(label),
                    rows.len(),
                    self.format_rows(rows)
                )
            })
            .collect::<Vec<_>>();

        if sections.is_empty() {
            EMPTY_TABLE_TEXT.to_string()
        } else {
            sections.join("\n\n")
        }
    }
}

fn section_title(label: &str) -> String {
    match label {
        "alumnos" => "Estudiantes".to_string(),
        "profesores" => "Profesores".to_string(),
        other => title_case(other),
    }
}

fn stats_text(stats: &StatsSnapshot) -> String {
    let lines = stats.lines();
    if lines.is_empty() {
        "• Sin datos disponibles".to_string()
    } else {
        lines.join("\n")
    }
}

/// Display columns in fixed order; every column when none of them is present.
fn describe_row(row: &Row) -> String {
    let known = DISPLAY_COLUMNS
        .iter()
        .filter_map(|(column, label)| {
            row.get(*column).map(|value| format!("{label}: {}", display_value(value)))
        })
        .collect::<Vec<_>>();

    if !known.is_empty() {
        return known.join(" | ");
    }

    row.iter()
        .map(|(column, value)| format!("{}: {}", title_case(column), display_value(value)))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn title_case(label: &str) -> String {
    label
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut characters = word.chars();
            match characters.next() {
                Some(first) => first.to_uppercase().chain(characters).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "N/D".to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => if *flag { "sí" } else { "no" }.to_string(),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => integer.to_string(),
            None => number.as_f64().map(|float| format!("{float:.2}")).unwrap_or_default(),
        },
        other => other.to_string(),
    }
}

fn display_field(row: &Row, column: &str) -> String {
    row.get(column).map(display_value).unwrap_or_else(|| "N/D".to_string())
}

fn display_count(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

fn number(row: &Row, column: &str) -> Option<f64> {
    match row.get(column)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aula_core::data_store::DataStoreError;
    use aula_core::domain::entity::{Entities, EntityType};
    use aula_core::domain::query::{QueryOutcome, Row};
    use serde_json::{json, Value};

    use super::{
        ResponseSynthesizer, StatsSnapshot, TeachingLoad, NO_RESULTS_TEXT, VARIANTS_PER_INTENT,
    };

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row fixture must be an object"),
        }
    }

    fn synthesizer() -> ResponseSynthesizer {
        ResponseSynthesizer::seeded(7).expect("templates parse")
    }

    fn students(count: usize, grade: f64) -> Vec<Row> {
        (0..count)
            .map(|index| {
                row(json!({
                    "matricula": format!("A{index:04}"),
                    "nombre": format!("Nombre{index}"),
                    "apellido": "Pérez",
                    "carrera": "Ingeniería Industrial",
                    "promedio_general": grade,
                }))
            })
            .collect()
    }

    fn statistics(students: i64, teachers: i64, careers: i64, average: f64) -> QueryOutcome {
        let mut results = BTreeMap::new();
        results.insert("total_alumnos".to_string(), vec![row(json!({ "total": students }))]);
        results.insert("total_profesores".to_string(), vec![row(json!({ "total": teachers }))]);
        results.insert("total_carreras".to_string(), vec![row(json!({ "total": careers }))]);
        results.insert("promedio_general".to_string(), vec![row(json!({ "promedio": average }))]);
        QueryOutcome::Multiple { results }
    }

    #[test]
    fn same_seed_picks_same_templates() {
        let outcome = QueryOutcome::Single { rows: students(2, 8.0), description: "x".into() };
        let first = synthesizer().synthesize("consulta_alumnos", &outcome, &Entities::new());
        let second = synthesizer().synthesize("consulta_alumnos", &outcome, &Entities::new());

        assert_eq!(first.text, second.text);
        assert_eq!(first.recommendations, second.recommendations);
    }

    #[test]
    fn every_intent_family_renders_all_variants() {
        let synthesizer = synthesizer();
        let outcome = QueryOutcome::Single { rows: students(1, 8.0), description: "x".into() };
        for _ in 0..(VARIANTS_PER_INTENT * 8) {
            let response =
                synthesizer.try_synthesize("consulta_alumnos", &outcome, &Entities::new());
            assert!(response.is_ok());
        }
    }

    #[test]
    fn student_listing_truncates_and_adds_data_driven_recommendations() {
        let outcome = QueryOutcome::Single { rows: students(35, 6.5), description: "x".into() };
        let mut entities = Entities::new();
        entities.push(EntityType::Category, "Ingeniería Industrial");

        let response = synthesizer().synthesize("consulta_alumnos", &outcome, &entities);

        assert!(response.text.contains("**1.** Nombre: Nombre0 | Apellido: Pérez"));
        assert!(response.text.contains("*... y 25 resultados más.*"));
        assert!(response.text.contains("Carrera: **Ingeniería Industrial**."));
        assert!(response
            .recommendations
            .contains(&"Considerar dividir en grupos más pequeños para mejor seguimiento".into()));
        assert!(response
            .recommendations
            .contains(&"Revisar 35 estudiantes con promedio menor a 7.0".into()));
        assert_eq!(response.structured_context["total_resultados"], 35);
        assert_eq!(response.structured_context["tipo_consulta"], "consulta_alumnos");
    }

    #[test]
    fn max_display_rows_is_configurable() {
        let synthesizer = synthesizer().with_max_display_rows(2);
        let listing = synthesizer.format_rows(&students(3, 9.0));

        assert_eq!(listing.lines().filter(|line| line.starts_with("**")).count(), 2);
        assert!(listing.ends_with("*... y 1 resultados más.*"));
    }

    #[test]
    fn statistics_report_counts_and_ratio_band() {
        let outcome = statistics(234, 10, 6, 8.3);
        let response =
            synthesizer().synthesize("estadisticas_generales", &outcome, &Entities::new());

        assert!(response.text.contains("• **234 Estudiantes Activos** 👨‍🎓"));
        assert!(response.text.contains("• **10 Profesores Activos** 👨‍🏫"));
        assert!(response.text.contains("• **6 Carreras Disponibles** 📚"));
        assert!(response.text.contains("• **Promedio General: 8.30** 📊"));
        assert!(response
            .text
            .contains("⚠️ **Alta carga docente:** 23.4 estudiantes por profesor."));
        assert!(response.text.contains("Buen rendimiento académico con oportunidades de mejora"));
        assert!(response
            .recommendations
            .contains(&"Mantener programas de retención estudiantil".to_string()));
        assert_eq!(response.structured_context["carga_docente"], "alta");
        assert_eq!(response.structured_context["estadisticas"]["alumnos"], 234.0);
    }

    #[test]
    fn teaching_load_bands() {
        assert_eq!(TeachingLoad::classify(25.0), TeachingLoad::High);
        assert_eq!(TeachingLoad::classify(20.0), TeachingLoad::Balanced);
        assert_eq!(TeachingLoad::classify(10.0), TeachingLoad::Balanced);
        assert_eq!(TeachingLoad::classify(9.9), TeachingLoad::Light);
        assert_eq!(StatsSnapshot::default().students_per_teacher(), None);
    }

    #[test]
    fn risk_response_flags_urgent_cases() {
        let rows = vec![
            row(json!({ "nombre": "Ana", "nivel_riesgo": "critico", "tipo_riesgo": "academico" })),
            row(json!({ "nombre": "Luis", "nivel_riesgo": "medio", "tipo_riesgo": "asistencia" })),
        ];
        let outcome = QueryOutcome::Single { rows, description: "x".into() };

        let response = synthesizer().synthesize("alumnos_riesgo", &outcome, &Entities::new());

        assert!(response.text.contains("• Atención URGENTE: 1 casos críticos"));
        assert!(response.text.contains("Nombre: Ana | Tipo: academico | Nivel: critico"));
        assert_eq!(response.structured_context["urgencia"], "alta");
    }

    #[test]
    fn grades_response_names_best_and_worst_career() {
        let rows = vec![
            row(json!({ "carrera": "Redes", "promedio_carrera": 8.9, "promedio_minimo": 8.1,
                        "promedio_maximo": 9.5, "total_alumnos": 4 })),
            row(json!({ "carrera": "Industrial", "promedio_carrera": 7.2, "promedio_minimo": 6.5,
                        "promedio_maximo": 8.8, "total_alumnos": 3 })),
        ];
        let outcome = QueryOutcome::Single { rows, description: "x".into() };

        let response =
            synthesizer().synthesize("calificaciones_promedio", &outcome, &Entities::new());

        assert!(response
            .text
            .contains("• **Redes:** promedio 8.90 (mínimo 8.10, máximo 9.50, 4 estudiantes)"));
        assert!(response.text.contains(
            "Mejor promedio en **Redes** (8.90); menor promedio en **Industrial** (7.20)."
        ));
    }

    #[test]
    fn search_response_lists_non_empty_sections() {
        let mut results = BTreeMap::new();
        results.insert("alumnos".to_string(), Vec::new());
        results.insert(
            "profesores".to_string(),
            vec![row(json!({
                "nombre": "Roberto",
                "apellido": "Sánchez",
                "numero_empleado": "P-1"
            }))],
        );
        let outcome = QueryOutcome::Multiple { results };

        let response = synthesizer().synthesize("busqueda_especifica", &outcome, &Entities::new());

        assert!(response.text.contains("**Profesores (1):**"));
        assert!(!response.text.contains("**Estudiantes"));
        assert!(response.text.contains("Empleado: P-1"));
    }

    #[test]
    fn empty_and_rejected_outcomes_report_no_results() {
        let synthesizer = synthesizer();
        let empty = QueryOutcome::Single { rows: Vec::new(), description: "x".into() };
        let rejected = QueryOutcome::Rejected { description: "x".into() };

        let first = synthesizer.synthesize("consulta_alumnos", &empty, &Entities::new());
        let second = synthesizer.synthesize("consulta_alumnos", &rejected, &Entities::new());

        assert_eq!(first.text, NO_RESULTS_TEXT);
        assert_eq!(second.text, NO_RESULTS_TEXT);
        assert_eq!(second.structured_context["rechazada"], true);
        assert!(!first.is_error());
    }

    #[test]
    fn rows_without_display_columns_show_every_column() {
        let outcome = QueryOutcome::Single {
            rows: vec![row(json!({ "mensaje": "No se pudo procesar la consulta" }))],
            description: "x".into(),
        };

        let response = synthesizer().synthesize("general", &outcome, &Entities::new());

        assert!(response.text.contains("**1.** Mensaje: No se pudo procesar la consulta"));
    }

    #[test]
    fn error_responses_are_flagged() {
        let synthesizer = synthesizer();
        let unavailable = synthesizer.data_store_error(&DataStoreError::Unavailable("down".into()));
        let failed = synthesizer.data_store_error(&DataStoreError::QueryFailed("bad".into()));
        let apology = synthesizer.apology();

        assert!(unavailable.is_error() && failed.is_error() && apology.is_error());
        assert!(unavailable.text.starts_with("❌ **Lo siento, hubo un problema"));
        assert_ne!(unavailable.text, failed.text);
        assert_eq!(unavailable.recommendations.len(), 3);
    }
}
