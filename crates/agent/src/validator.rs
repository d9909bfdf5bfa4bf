use std::collections::BTreeMap;

use aula_core::domain::query::{QueryParam, QuerySpec, StatementSpec};
use thiserror::Error;
use tracing::warn;

/// Uppercase fragments that reject a statement wherever they appear.
pub const DISALLOWED_KEYWORDS: [&str; 19] = [
    "DROP",
    "DELETE",
    "TRUNCATE",
    "ALTER",
    "CREATE",
    "GRANT",
    "REVOKE",
    "INSERT",
    "UPDATE",
    "EXEC",
    "EXECUTE",
    "CALL",
    "DECLARE",
    "UNION",
    "INTO OUTFILE",
    "LOAD_FILE",
    "DUMPFILE",
    "SLEEP",
    "BENCHMARK",
];

pub const MAX_STATEMENT_CHARS: usize = 2000;
pub const MAX_SELECT_COUNT: usize = 3;
/// Joins beyond this count get `DISTINCT` added.
pub const DISTINCT_JOIN_THRESHOLD: usize = 2;
pub const DEFAULT_ROW_CAP: u32 = 100;

const COMMENT_MARKERS: [&str; 3] = ["--", "/*", "*/"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("statement contains disallowed keyword `{0}`")]
    DisallowedKeyword(&'static str),
    #[error("statement does not start with SELECT")]
    NotSelect,
    #[error("statement contains a comment marker")]
    CommentMarker,
    #[error("statement contains a statement separator")]
    StatementChaining,
    #[error("statement has {0} SELECT occurrences")]
    TooManySelects(usize),
    #[error("statement is {0} characters long")]
    TooLong(usize),
    #[error("statement has {placeholders} placeholders but {parameters} parameters")]
    ParameterMismatch { placeholders: usize, parameters: usize },
}

impl ValidationError {
    pub fn rule(&self) -> &'static str {
        match self {
            Self::DisallowedKeyword(_) => "disallowed_keyword",
            Self::NotSelect => "not_select",
            Self::CommentMarker => "comment_marker",
            Self::StatementChaining => "statement_chaining",
            Self::TooManySelects(_) => "too_many_selects",
            Self::TooLong(_) => "too_long",
            Self::ParameterMismatch { .. } => "parameter_mismatch",
        }
    }
}

/// A statement that passed validation and was optimized exactly once. Only
/// [`QueryValidator`] constructs these, so holding one is proof of both steps.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedStatement {
    text: String,
    parameters: Vec<QueryParam>,
}

impl ValidatedStatement {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[QueryParam] {
        &self.parameters
    }
}

/// A query spec after the safety gate. Rejected statements keep their slot so the caller
/// can report them without executing anything.
#[derive(Clone, Debug, PartialEq)]
pub enum PreparedQuery {
    Single { statement: Result<ValidatedStatement, ValidationError>, description: String },
    Multiple { statements: BTreeMap<String, Result<ValidatedStatement, ValidationError>> },
}

/// Conservative gate in front of the data store. Rejects anything that is not a single
/// plain `SELECT` and bounds what it admits.
#[derive(Clone, Debug, Default)]
pub struct QueryValidator;

impl QueryValidator {
    pub fn new() -> Self {
        Self
    }

    /// True only when every statement in the spec passes [`QueryValidator::check`].
    pub fn validate(&self, spec: &QuerySpec) -> bool {
        match spec {
            QuerySpec::Single { text, parameters, .. } => {
                self.check_statement(text, parameters).is_ok()
            }
            QuerySpec::Multiple { statements } => statements.values().all(|statement| {
                self.check_statement(&statement.text, &statement.parameters).is_ok()
            }),
        }
    }

    pub fn check(&self, text: &str) -> Result<(), ValidationError> {
        let upper = text.to_uppercase();

        if let Some(keyword) =
            DISALLOWED_KEYWORDS.iter().copied().find(|keyword| upper.contains(keyword))
        {
            return Err(ValidationError::DisallowedKeyword(keyword));
        }
        if !text.trim_start().to_ascii_uppercase().starts_with("SELECT") {
            return Err(ValidationError::NotSelect);
        }
        if COMMENT_MARKERS.iter().any(|marker| text.contains(marker)) {
            return Err(ValidationError::CommentMarker);
        }
        if text.contains(';') {
            return Err(ValidationError::StatementChaining);
        }
        let selects = upper.matches("SELECT").count();
        if selects > MAX_SELECT_COUNT {
            return Err(ValidationError::TooManySelects(selects));
        }
        let length = text.chars().count();
        if length > MAX_STATEMENT_CHARS {
            return Err(ValidationError::TooLong(length));
        }
        Ok(())
    }

    fn check_statement(
        &self,
        text: &str,
        parameters: &[QueryParam],
    ) -> Result<(), ValidationError> {
        self.check(text)?;
        let placeholders = text.matches('?').count();
        if placeholders != parameters.len() {
            return Err(ValidationError::ParameterMismatch {
                placeholders,
                parameters: parameters.len(),
            });
        }
        Ok(())
    }

    /// Adds `DISTINCT` to join-heavy statements and caps rows when no limit is present.
    /// Applying it twice changes nothing.
    pub fn optimize(&self, text: &str) -> String {
        let mut optimized = text.to_string();
        let upper = optimized.to_ascii_uppercase();

        if upper.matches("JOIN").count() > DISTINCT_JOIN_THRESHOLD && !upper.contains("DISTINCT") {
            if let Some(position) = upper.find("SELECT") {
                optimized.insert_str(position + "SELECT".len(), " DISTINCT");
            }
        }

        if !optimized.to_ascii_uppercase().contains("LIMIT") {
            optimized.push_str(&format!(" LIMIT {DEFAULT_ROW_CAP}"));
        }

        optimized
    }

    /// Validates then optimizes every statement of the spec. Rejections are logged by rule
    /// only; statement text is never written to the log.
    pub fn prepare(&self, spec: QuerySpec) -> PreparedQuery {
        match spec {
            QuerySpec::Single { text, parameters, description } => PreparedQuery::Single {
                statement: self.admit("single", StatementSpec { text, parameters }),
                description,
            },
            QuerySpec::Multiple { statements } => PreparedQuery::Multiple {
                statements: statements
                    .into_iter()
                    .map(|(label, statement)| {
                        let admitted = self.admit(&label, statement);
                        (label, admitted)
                    })
                    .collect(),
            },
        }
    }

    fn admit(
        &self,
        label: &str,
        statement: StatementSpec,
    ) -> Result<ValidatedStatement, ValidationError> {
        let admitted = self.check_statement(&statement.text, &statement.parameters).and_then(
            |()| {
                let text = self.optimize(&statement.text);
                self.check_statement(&text, &statement.parameters)?;
                Ok(ValidatedStatement { text, parameters: statement.parameters })
            },
        );

        if let Err(error) = &admitted {
            warn!(
                event_name = "agent.validator.rejected",
                label = %label,
                rule = error.rule(),
                "statement rejected by the safety gate"
            );
        }

        admitted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aula_core::domain::query::{QueryParam, QuerySpec, StatementSpec};
    use proptest::prelude::*;

    use super::{
        PreparedQuery, QueryValidator, ValidationError, DISALLOWED_KEYWORDS, MAX_SELECT_COUNT,
        MAX_STATEMENT_CHARS,
    };

    fn single(text: &str) -> QuerySpec {
        QuerySpec::single(StatementSpec::literal(text), "prueba")
    }

    #[test]
    fn plain_select_is_accepted() {
        let validator = QueryValidator::new();
        assert!(validator.validate(&single("SELECT COUNT(*) AS total FROM alumnos")));
        assert!(validator.validate(&single("  select nombre from carreras")));
    }

    #[test]
    fn each_rule_rejects_with_its_own_reason() {
        let validator = QueryValidator::new();
        let cases = [
            (
                "SELECT * FROM alumnos; DROP TABLE alumnos",
                ValidationError::DisallowedKeyword("DROP"),
            ),
            ("SELECT 1 UNION SELECT 2", ValidationError::DisallowedKeyword("UNION")),
            ("PRAGMA table_info(alumnos)", ValidationError::NotSelect),
            ("SELECT 1 -- comentario", ValidationError::CommentMarker),
            ("SELECT /* x */ 1", ValidationError::CommentMarker),
            ("SELECT 1; SELECT 2", ValidationError::StatementChaining),
            (
                "SELECT (SELECT (SELECT (SELECT 1)))",
                ValidationError::TooManySelects(MAX_SELECT_COUNT + 1),
            ),
        ];

        for (text, expected) in cases {
            assert_eq!(validator.check(text), Err(expected), "statement: {text}");
            assert!(!validator.validate(&single(text)));
        }

        let long = format!("SELECT '{}'", "x".repeat(MAX_STATEMENT_CHARS));
        assert_eq!(
            validator.check(&long),
            Err(ValidationError::TooLong(MAX_STATEMENT_CHARS + 9))
        );
    }

    #[test]
    fn keywords_are_matched_as_substrings() {
        let validator = QueryValidator::new();
        assert_eq!(
            validator.check("SELECT updated FROM t"),
            Err(ValidationError::DisallowedKeyword("UPDATE"))
        );
    }

    #[test]
    fn placeholder_count_must_match_parameters() {
        let validator = QueryValidator::new();
        let spec = QuerySpec::single(
            StatementSpec { text: "SELECT * FROM t WHERE a = ?".to_string(), parameters: vec![] },
            "prueba",
        );
        assert!(!validator.validate(&spec));
    }

    #[test]
    fn multiple_spec_is_valid_only_if_every_statement_is() {
        let validator = QueryValidator::new();
        let mut statements = BTreeMap::new();
        statements.insert("ok".to_string(), StatementSpec::literal("SELECT 1"));
        let mut spec = QuerySpec::Multiple { statements: statements.clone() };
        assert!(validator.validate(&spec));

        statements.insert("mal".to_string(), StatementSpec::literal("DELETE FROM t"));
        spec = QuerySpec::Multiple { statements };
        assert!(!validator.validate(&spec));
    }

    #[test]
    fn optimize_caps_rows_and_dedupes_wide_joins() {
        let validator = QueryValidator::new();

        assert_eq!(validator.optimize("SELECT a FROM t"), "SELECT a FROM t LIMIT 100");
        assert_eq!(validator.optimize("SELECT a FROM t LIMIT 5"), "SELECT a FROM t LIMIT 5");

        let wide = "select a from t join u on 1 join v on 1 join w on 1";
        assert_eq!(
            validator.optimize(wide),
            "select DISTINCT a from t join u on 1 join v on 1 join w on 1 LIMIT 100"
        );

        let narrow = "SELECT a FROM t JOIN u ON 1 JOIN v ON 1";
        assert!(!validator.optimize(narrow).contains("DISTINCT"));
    }

    #[test]
    fn prepare_keeps_rejected_labels_and_optimizes_admitted_ones() {
        let validator = QueryValidator::new();
        let mut statements = BTreeMap::new();
        statements.insert("bueno".to_string(), StatementSpec::literal("SELECT 1 AS uno"));
        statements.insert("malo".to_string(), StatementSpec::literal("DROP TABLE alumnos"));

        let PreparedQuery::Multiple { statements } =
            validator.prepare(QuerySpec::Multiple { statements })
        else {
            panic!("expected multiple");
        };

        let good = statements["bueno"].as_ref().expect("admitted");
        assert_eq!(good.text(), "SELECT 1 AS uno LIMIT 100");
        assert_eq!(statements["malo"], Err(ValidationError::DisallowedKeyword("DROP")));
    }

    #[test]
    fn prepare_keeps_parameters_of_single_statement() {
        let validator = QueryValidator::new();
        let spec = QuerySpec::single(
            StatementSpec {
                text: "SELECT nombre FROM carreras WHERE nombre LIKE ?".to_string(),
                parameters: vec![QueryParam::Text("%Redes%".to_string())],
            },
            "carreras",
        );

        let PreparedQuery::Single { statement, description } = validator.prepare(spec) else {
            panic!("expected single");
        };
        let statement = statement.expect("admitted");
        assert_eq!(description, "carreras");
        assert_eq!(statement.parameters(), &[QueryParam::Text("%Redes%".to_string())]);
        assert!(statement.text().ends_with("LIMIT 100"));
    }

    proptest! {
        #[test]
        fn optimize_is_idempotent(text in ".{0,200}") {
            let validator = QueryValidator::new();
            let once = validator.optimize(&text);
            prop_assert_eq!(validator.optimize(&once), once);
        }

        #[test]
        fn optimize_is_idempotent_on_join_heavy_selects(
            joins in 0usize..6,
            distinct in any::<bool>(),
            limit in proptest::option::of(1u32..500),
        ) {
            let mut text = String::from("SELECT ");
            if distinct {
                text.push_str("DISTINCT ");
            }
            text.push_str("a.id FROM a");
            for index in 0..joins {
                text.push_str(&format!(" JOIN t{index} ON t{index}.id = a.id"));
            }
            if let Some(limit) = limit {
                text.push_str(&format!(" LIMIT {limit}"));
            }

            let validator = QueryValidator::new();
            let once = validator.optimize(&text);
            prop_assert_eq!(validator.optimize(&once), once.clone());
            prop_assert!(once.contains("LIMIT"));
            prop_assert_eq!(once.contains("DISTINCT"), distinct || joins > 2);
        }

        #[test]
        fn accepted_statements_satisfy_every_rule(
            text in "(SELECT|select|DROP|;|--| |a|\\?|UNION|\\(){0,40}"
        ) {
            let validator = QueryValidator::new();
            if validator.check(&text).is_ok() {
                let upper = text.to_uppercase();
                prop_assert!(text.trim_start().to_ascii_uppercase().starts_with("SELECT"));
                prop_assert!(DISALLOWED_KEYWORDS.iter().all(|keyword| !upper.contains(keyword)));
                prop_assert!(!text.contains("--"));
                prop_assert!(!text.contains(';'));
                prop_assert!(upper.matches("SELECT").count() <= MAX_SELECT_COUNT);
                prop_assert!(text.chars().count() <= MAX_STATEMENT_CHARS);
            }
        }
    }
}
