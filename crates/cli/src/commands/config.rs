use std::env;
use std::fs;
use std::path::Path;

use aula_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

/// A reported key and the inputs that can set it.
#[derive(Clone, Copy)]
struct Field<'a> {
    key_path: &'a str,
    env_keys: &'a [&'a str],
    overridden: bool,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let overrides = &options.overrides;

    let catalog_path = config
        .assistant
        .catalog_path
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<builtin>".to_string());
    let response_seed = config
        .assistant
        .response_seed
        .map(|seed| seed.to_string())
        .unwrap_or_else(|| "<entropy>".to_string());

    let entries = [
        (
            Field {
                key_path: "database.url",
                env_keys: &["AULA_DATABASE_URL"],
                overridden: overrides.database_url.is_some(),
            },
            redact_url(&config.database.url),
        ),
        (
            Field {
                key_path: "database.max_connections",
                env_keys: &["AULA_DATABASE_MAX_CONNECTIONS"],
                overridden: false,
            },
            config.database.max_connections.to_string(),
        ),
        (
            Field {
                key_path: "database.timeout_secs",
                env_keys: &["AULA_DATABASE_TIMEOUT_SECS"],
                overridden: false,
            },
            config.database.timeout_secs.to_string(),
        ),
        (
            Field {
                key_path: "assistant.catalog_path",
                env_keys: &["AULA_ASSISTANT_CATALOG_PATH"],
                overridden: overrides.catalog_path.is_some(),
            },
            catalog_path,
        ),
        (
            Field {
                key_path: "assistant.response_seed",
                env_keys: &["AULA_ASSISTANT_RESPONSE_SEED"],
                overridden: overrides.response_seed.is_some(),
            },
            response_seed,
        ),
        (
            Field {
                key_path: "assistant.max_display_rows",
                env_keys: &["AULA_ASSISTANT_MAX_DISPLAY_ROWS"],
                overridden: false,
            },
            config.assistant.max_display_rows.to_string(),
        ),
        (
            Field {
                key_path: "logging.level",
                env_keys: &["AULA_LOGGING_LEVEL", "AULA_LOG_LEVEL"],
                overridden: overrides.log_level.is_some(),
            },
            config.logging.level.clone(),
        ),
        (
            Field {
                key_path: "logging.format",
                env_keys: &["AULA_LOGGING_FORMAT", "AULA_LOG_FORMAT"],
                overridden: false,
            },
            format!("{:?}", config.logging.format),
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for (field, value) in entries {
        let source = field_source(field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key_path, &value, source));
    }

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: Field<'_>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if field.overridden {
        return "flag".to_string();
    }

    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Hides credentials embedded in a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((_, host)) => format!("{scheme}://***@{host}"),
        None => url.to_string(),
    }
}
