use std::env;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use aula_cli::commands::{ask, catalog, chat, config, migrate, seed};
use aula_core::config::{ConfigOverrides, LoadOptions};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_in_memory_database() {
    with_env(&[("AULA_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_for_invalid_override() {
    with_env(&[("AULA_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_loaded_tables() {
    with_env(&[("AULA_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("  - alumnos: 12 rows"), "{message}");
        assert!(message.contains("  - reportes_riesgo: 5 rows"), "{message}");
    });
}

#[test]
fn seed_is_idempotent_on_a_file_database() {
    let dir = TempDir::new().expect("tempdir");
    let options = file_database(dir.path());

    with_env(&[], || {
        let first = seed::run(&options);
        assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);

        let second = seed::run(&options);
        assert_eq!(second.exit_code, 0, "expected reseed success: {}", second.output);
        assert_eq!(first.output, second.output);
    });
}

#[test]
fn ask_answers_from_a_seeded_database() {
    let dir = TempDir::new().expect("tempdir");
    let options = file_database(dir.path());

    with_env(&[], || {
        assert_eq!(seed::run(&options).exit_code, 0);

        let result = ask::run(&options, 3, "¿Cuántos estudiantes hay?");
        assert_eq!(result.exit_code, 0, "expected ask success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["structuredContext"]["tipo_consulta"], "consulta_alumnos");
        assert_eq!(payload["data"]["structuredContext"]["total_resultados"], 11);
        assert!(payload["data"]["recommendations"].is_array());
    });
}

#[test]
fn ask_without_schema_degrades_to_error_response() {
    let dir = TempDir::new().expect("tempdir");
    let options = file_database(dir.path());

    with_env(&[], || {
        let result = ask::run(&options, 1, "¿Cuántos estudiantes hay?");
        assert_eq!(result.exit_code, 0, "the response itself carries the failure");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["structuredContext"]["error"], true);
        assert_eq!(payload["message"], "assistant answered with an error response");
    });
}

#[test]
fn ask_reports_missing_catalog_as_config_failure() {
    let dir = TempDir::new().expect("tempdir");
    let mut options = file_database(dir.path());
    options.overrides.catalog_path = Some(dir.path().join("missing-intents.toml"));

    with_env(&[], || {
        let result = ask::run(&options, 1, "hola");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_rejects_blank_message_before_touching_the_database() {
    with_env(&[], || {
        let result = ask::run(&LoadOptions::default(), 1, "   ");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_request");
    });
}

#[test]
fn catalog_reports_unparseable_catalog_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("intents.toml");
    fs::write(&path, "version = [unterminated").expect("write catalog");
    let mut options = LoadOptions::default();
    options.overrides.catalog_path = Some(path);

    with_env(&[], || {
        let result = catalog::run(&options);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "catalog");
        assert_eq!(payload["error_class"], "catalog");
    });
}

#[test]
fn catalog_lists_builtin_intents() {
    with_env(&[], || {
        let result = catalog::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected catalog success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "catalog");
        let intents = payload["data"]["intents"].as_array().expect("intents array");
        assert!(intents.iter().any(|intent| intent["name"] == "alumnos_riesgo"));
        assert!(payload["message"].as_str().unwrap_or("").contains("(builtin)"));
    });
}

#[test]
fn chat_session_answers_and_handles_commands() {
    let dir = TempDir::new().expect("tempdir");
    let options = file_database(dir.path());

    with_env(&[], || {
        assert_eq!(seed::run(&options).exit_code, 0);

        let input = Cursor::new(
            "/sugerencias\n¿Qué profesores están activos?\n\n/limpiar\n/salir\nnunca leído\n",
        );
        let mut output = Vec::new();
        let result = chat::run_session(&options, 5, input, &mut output);
        assert_eq!(result.exit_code, 0, "expected chat success: {}", result.output);
        assert!(result.output.is_empty());

        let transcript = String::from_utf8(output).expect("utf-8 transcript");
        assert!(transcript.starts_with("Conversación 5."));
        assert!(transcript.contains("Conversación reiniciada."));
        assert!(transcript.contains("  → "), "{transcript}");
        assert!(!transcript.contains("nunca leído"));
    });
}

#[test]
fn config_attributes_sources() {
    with_env(&[("AULA_ASSISTANT_MAX_DISPLAY_ROWS", "4")], || {
        let options = LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };

        let output = config::run(&options);
        assert!(output.contains("- database.url = sqlite::memory: (source: flag)"), "{output}");
        assert!(output.contains(
            "- assistant.max_display_rows = 4 (source: env (AULA_ASSISTANT_MAX_DISPLAY_ROWS))"
        ));
        assert!(output.contains("- database.timeout_secs = 30 (source: default)"));
    });
}

fn file_database(dir: &Path) -> LoadOptions {
    LoadOptions {
        overrides: ConfigOverrides {
            database_url: Some(format!("sqlite://{}", dir.join("aula.db").display())),
            response_seed: Some(7),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "AULA_DATABASE_URL",
        "AULA_DATABASE_MAX_CONNECTIONS",
        "AULA_DATABASE_TIMEOUT_SECS",
        "AULA_ASSISTANT_CATALOG_PATH",
        "AULA_ASSISTANT_RESPONSE_SEED",
        "AULA_ASSISTANT_MAX_DISPLAY_ROWS",
        "AULA_LOGGING_LEVEL",
        "AULA_LOGGING_FORMAT",
        "AULA_LOG_LEVEL",
        "AULA_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
