pub mod ask;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod migrate;
pub mod seed;

use std::sync::Arc;

use aula_agent::{AssistantRuntime, ResponseSynthesizer};
use aula_core::catalog::{CatalogStore, IntentCatalog};
use aula_core::config::{AppConfig, LoadOptions};
use aula_core::errors::{ApplicationError, InterfaceError};
use aula_db::{connect_with_config, DbPool, SqlDataStore};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

/// Error class, message and exit code of a failed step.
pub(crate) type StepFailure = (&'static str, String, u8);

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_step(command: &str, (error_class, message, exit_code): StepFailure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(
    command: &str,
    options: &LoadOptions,
) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) fn load_catalog(config: &AppConfig) -> Result<CatalogStore, ApplicationError> {
    let store = match &config.assistant.catalog_path {
        Some(path) => CatalogStore::from_path(path.clone())?,
        None => CatalogStore::new(IntentCatalog::builtin()?),
    };
    Ok(store)
}

/// Connects to the configured database and wires an [`AssistantRuntime`] over it.
pub(crate) async fn open_assistant(
    config: &AppConfig,
) -> Result<(AssistantRuntime, DbPool), ApplicationError> {
    let catalog = load_catalog(config)?;
    let synthesizer = ResponseSynthesizer::from_seed(config.assistant.response_seed)
        .map_err(|error| ApplicationError::Configuration(format!("response templates: {error}")))?
        .with_max_display_rows(config.assistant.max_display_rows);
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

    let runtime = AssistantRuntime::new(
        Arc::new(catalog),
        Arc::new(SqlDataStore::new(pool.clone())),
        synthesizer,
    );
    Ok((runtime, pool))
}

/// Error class and exit code for an application failure, with the user-facing message first.
pub(crate) fn application_failure(error: ApplicationError) -> StepFailure {
    let (error_class, exit_code) = match &error {
        ApplicationError::InvalidRequest(_) => ("invalid_request", 2),
        ApplicationError::Catalog(_) => ("catalog", 2),
        ApplicationError::Configuration(_) => ("config_validation", 2),
        ApplicationError::Persistence(_) => ("db_connectivity", 4),
    };
    let detail = error.to_string();
    let interface = InterfaceError::from(error);
    (error_class, format!("{} ({detail})", interface.user_message()), exit_code)
}
