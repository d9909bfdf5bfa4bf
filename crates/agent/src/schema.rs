//! Declarative description of the academic tables and the query each intent runs.
//!
//! Filter clauses are fixed text; a `{value}` slot becomes a positional `?` parameter when the
//! statement is rendered, so user text never reaches the statement body.

use aula_core::domain::entity::EntityType;

/// Placeholder for the bound value inside a filter clause.
pub const VALUE_SLOT: &str = "{value}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueBinding {
    /// Bound as `%value%` for `LIKE`.
    Contains,
    /// Bound as the text value unchanged.
    Exact,
    /// Bound as the first integer found in the value.
    Integer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterTemplate {
    pub name: &'static str,
    pub clause: &'static str,
    pub binding: Option<ValueBinding>,
}

impl FilterTemplate {
    const fn fixed(name: &'static str, clause: &'static str) -> Self {
        Self { name, clause, binding: None }
    }

    const fn bound(name: &'static str, clause: &'static str, binding: ValueBinding) -> Self {
        Self { name, clause, binding: Some(binding) }
    }
}

/// One table (with its joins) and the labeled columns it exposes.
#[derive(Debug)]
pub struct TableDescriptor {
    pub from: &'static str,
    pub joins: &'static [&'static str],
    pub fields: &'static [(&'static str, &'static str)],
    pub filters: &'static [FilterTemplate],
}

impl TableDescriptor {
    pub fn field(&self, label: &str) -> Option<&'static str> {
        self.fields.iter().find(|(name, _)| *name == label).map(|(_, expression)| *expression)
    }

    pub fn filter(&self, name: &str) -> Option<&FilterTemplate> {
        self.filters.iter().find(|filter| filter.name == name)
    }
}

/// How one intent turns entities into a statement over a table.
#[derive(Debug)]
pub struct QueryPlan {
    pub table: &'static TableDescriptor,
    pub distinct: bool,
    pub base_filters: &'static [&'static str],
    /// Entity type to filter name; the first value of that type is bound.
    pub entity_filters: &'static [(EntityType, &'static str)],
    /// Field labels matched against free-text terms.
    pub searchable: &'static [&'static str],
    pub group_by: &'static [&'static str],
    pub order_by: &'static str,
    pub limit: Option<u32>,
    pub description: &'static str,
}

pub static STUDENTS: TableDescriptor = TableDescriptor {
    from: "alumnos a",
    joins: &["JOIN usuarios u ON a.usuario_id = u.id", "JOIN carreras c ON a.carrera_id = c.id"],
    fields: &[
        ("matricula", "a.matricula"),
        ("nombre", "u.nombre"),
        ("apellido", "u.apellido"),
        ("carrera", "c.nombre"),
        ("cuatrimestre", "a.cuatrimestre_actual"),
        ("promedio_general", "a.promedio_general"),
        ("estado", "a.estado_alumno"),
    ],
    filters: &[
        FilterTemplate::fixed("activos", "a.estado_alumno = 'activo'"),
        FilterTemplate::bound("carrera", "c.nombre LIKE {value}", ValueBinding::Contains),
        FilterTemplate::bound(
            "cuatrimestre",
            "a.cuatrimestre_actual = {value}",
            ValueBinding::Integer,
        ),
    ],
};

pub static TEACHERS: TableDescriptor = TableDescriptor {
    from: "profesores p",
    joins: &["JOIN usuarios u ON p.usuario_id = u.id", "JOIN carreras c ON p.carrera_id = c.id"],
    fields: &[
        ("numero_empleado", "p.numero_empleado"),
        ("nombre", "u.nombre"),
        ("apellido", "u.apellido"),
        ("carrera", "c.nombre"),
        ("titulo", "p.titulo_academico"),
        ("especialidad", "p.especialidad"),
        ("experiencia", "p.experiencia_anios"),
    ],
    filters: &[
        FilterTemplate::fixed("activos", "p.activo = 1"),
        FilterTemplate::bound("carrera", "c.nombre LIKE {value}", ValueBinding::Contains),
    ],
};

pub static RISK_REPORTS: TableDescriptor = TableDescriptor {
    from: "reportes_riesgo r",
    joins: &[
        "JOIN alumnos a ON r.alumno_id = a.id",
        "JOIN usuarios u ON a.usuario_id = u.id",
        "JOIN carreras c ON a.carrera_id = c.id",
    ],
    fields: &[
        ("matricula", "a.matricula"),
        ("nombre", "u.nombre"),
        ("apellido", "u.apellido"),
        ("carrera", "c.nombre"),
        ("tipo_riesgo", "r.tipo_riesgo"),
        ("nivel_riesgo", "r.nivel_riesgo"),
        ("descripcion", "r.descripcion"),
        ("fecha_reporte", "r.fecha_reporte"),
    ],
    filters: &[
        FilterTemplate::fixed("abiertos", "r.estado IN ('abierto', 'en_proceso')"),
        FilterTemplate::bound("tipo", "r.tipo_riesgo = {value}", ValueBinding::Exact),
        FilterTemplate::bound("nivel", "r.nivel_riesgo = {value}", ValueBinding::Exact),
        FilterTemplate::bound("carrera", "c.nombre LIKE {value}", ValueBinding::Contains),
    ],
};

pub static CAREER_PERFORMANCE: TableDescriptor = TableDescriptor {
    from: "carreras c",
    joins: &["JOIN alumnos a ON c.id = a.carrera_id"],
    fields: &[
        ("carrera", "c.nombre"),
        ("promedio_carrera", "ROUND(AVG(a.promedio_general), 2)"),
        ("total_alumnos", "COUNT(a.id)"),
        ("promedio_minimo", "ROUND(MIN(a.promedio_general), 2)"),
        ("promedio_maximo", "ROUND(MAX(a.promedio_general), 2)"),
    ],
    filters: &[
        FilterTemplate::fixed("activos", "a.estado_alumno = 'activo'"),
        FilterTemplate::fixed("con_promedio", "a.promedio_general > 0"),
        FilterTemplate::bound("carrera", "c.nombre LIKE {value}", ValueBinding::Contains),
    ],
};

pub static STUDENT_LISTING: QueryPlan = QueryPlan {
    table: &STUDENTS,
    distinct: false,
    base_filters: &["activos"],
    entity_filters: &[(EntityType::Category, "carrera"), (EntityType::Period, "cuatrimestre")],
    searchable: &["nombre", "apellido", "matricula"],
    group_by: &[],
    order_by: "u.apellido, u.nombre",
    limit: Some(50),
    description: "Estudiantes activos",
};

pub static TEACHER_LISTING: QueryPlan = QueryPlan {
    table: &TEACHERS,
    distinct: false,
    base_filters: &["activos"],
    entity_filters: &[(EntityType::Category, "carrera")],
    searchable: &["nombre", "apellido", "numero_empleado"],
    group_by: &[],
    order_by: "u.apellido, u.nombre",
    limit: Some(30),
    description: "Profesores activos",
};

pub static OPEN_RISK_REPORTS: QueryPlan = QueryPlan {
    table: &RISK_REPORTS,
    distinct: true,
    base_filters: &["abiertos"],
    entity_filters: &[
        (EntityType::RiskType, "tipo"),
        (EntityType::RiskLevel, "nivel"),
        (EntityType::Category, "carrera"),
    ],
    searchable: &[],
    group_by: &[],
    order_by: "CASE r.nivel_riesgo WHEN 'critico' THEN 4 WHEN 'alto' THEN 3 \
               WHEN 'medio' THEN 2 ELSE 1 END DESC, r.fecha_reporte DESC",
    limit: Some(40),
    description: "Alumnos en riesgo académico",
};

pub static PERFORMANCE_BY_CAREER: QueryPlan = QueryPlan {
    table: &CAREER_PERFORMANCE,
    distinct: false,
    base_filters: &["activos", "con_promedio"],
    entity_filters: &[(EntityType::Category, "carrera")],
    searchable: &[],
    group_by: &["c.id", "c.nombre"],
    order_by: "promedio_carrera DESC",
    limit: None,
    description: "Promedios por carrera",
};

pub static STUDENT_SEARCH: QueryPlan = QueryPlan {
    table: &STUDENTS,
    distinct: false,
    base_filters: &["activos"],
    entity_filters: &[(EntityType::Category, "carrera")],
    searchable: &["nombre", "apellido", "matricula"],
    group_by: &[],
    order_by: "u.apellido, u.nombre",
    limit: Some(20),
    description: "Búsqueda de estudiantes",
};

pub static TEACHER_SEARCH: QueryPlan = QueryPlan {
    table: &TEACHERS,
    distinct: false,
    base_filters: &["activos"],
    entity_filters: &[(EntityType::Category, "carrera")],
    searchable: &["nombre", "apellido", "numero_empleado"],
    group_by: &[],
    order_by: "u.apellido, u.nombre",
    limit: Some(20),
    description: "Búsqueda de profesores",
};

/// Labeled aggregate statements behind the statistics overview.
pub const STATISTICS: [(&str, &str); 4] = [
    ("total_alumnos", "SELECT COUNT(*) AS total FROM alumnos WHERE estado_alumno = 'activo'"),
    ("total_profesores", "SELECT COUNT(*) AS total FROM profesores WHERE activo = 1"),
    ("total_carreras", "SELECT COUNT(*) AS total FROM carreras WHERE activa = 1"),
    (
        "promedio_general",
        "SELECT ROUND(AVG(promedio_general), 2) AS promedio FROM alumnos \
         WHERE estado_alumno = 'activo' AND promedio_general > 0",
    ),
];

/// Harmless statement used when nothing sensible can be generated.
pub const FALLBACK_STATEMENT: &str = "SELECT 'No se pudo procesar la consulta' AS mensaje";
pub const FALLBACK_DESCRIPTION: &str = "Consulta no procesada";
