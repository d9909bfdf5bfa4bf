use aula_core::config::LoadOptions;
use aula_core::domain::conversation::ConversationId;
use aula_core::domain::response::ChatRequest;
use aula_core::errors::ApplicationError;

use crate::commands::{
    application_failure, build_runtime, load_config, open_assistant, CommandResult,
};

pub fn run(options: &LoadOptions, conversation: i64, message: &str) -> CommandResult {
    if message.trim().is_empty() {
        let error = ApplicationError::InvalidRequest("message must not be empty".to_string());
        return CommandResult::from_step("ask", application_failure(error));
    }

    let config = match load_config("ask", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let request = ChatRequest {
        conversation_id: ConversationId(conversation),
        message: message.to_string(),
    };

    let result = runtime.block_on(async {
        let (assistant, pool) = open_assistant(&config).await?;
        let response = assistant.handle(&request).await;
        pool.close().await;
        Ok::<_, ApplicationError>(response)
    });

    let response = match result {
        Ok(response) => response,
        Err(error) => return CommandResult::from_step("ask", application_failure(error)),
    };
    let data = match serde_json::to_value(&response) {
        Ok(data) => data,
        Err(error) => return CommandResult::failure("ask", "serialization", error.to_string(), 3),
    };

    let message = if response.is_error() {
        "assistant answered with an error response"
    } else {
        "assistant answered"
    };
    CommandResult::success_with_data("ask", message, Some(data))
}
