use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use aula_agent::AssistantRuntime;
use aula_core::config::LoadOptions;
use aula_core::domain::conversation::ConversationId;
use aula_core::domain::response::AssistantResponse;
use tokio::runtime::Runtime;

use crate::commands::{
    application_failure, build_runtime, load_config, open_assistant, CommandResult,
};

const PROMPT: &str = "aula> ";
const EXIT_COMMANDS: [&str; 2] = ["/salir", "/exit"];
const CLEAR_COMMAND: &str = "/limpiar";
const SUGGESTIONS_COMMAND: &str = "/sugerencias";

pub fn run(options: &LoadOptions, conversation: i64) -> CommandResult {
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_session(options, conversation, stdin.lock(), stdout.lock())
}

/// Runs one conversation over `input` until EOF or an exit command.
pub fn run_session<R: BufRead, W: Write>(
    options: &LoadOptions,
    conversation: i64,
    input: R,
    mut output: W,
) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("chat") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let (assistant, pool) = match runtime.block_on(open_assistant(&config)) {
        Ok(opened) => opened,
        Err(error) => return CommandResult::from_step("chat", application_failure(error)),
    };

    let id = ConversationId(conversation);
    let outcome = converse(&runtime, &assistant, id, input, &mut output);
    runtime.block_on(pool.close());

    match outcome {
        Ok(()) => CommandResult { exit_code: 0, output: String::new() },
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), 3),
    }
}

fn converse<R: BufRead, W: Write>(
    runtime: &Runtime,
    assistant: &AssistantRuntime,
    id: ConversationId,
    input: R,
    output: &mut W,
) -> Result<()> {
    writeln!(output, "Conversación {id}. Escribe /sugerencias, /limpiar o /salir.")
        .context("write greeting")?;

    let mut lines = input.lines();
    loop {
        write!(output, "{PROMPT}").context("write prompt")?;
        output.flush().context("flush prompt")?;

        let Some(line) = lines.next() else {
            writeln!(output).context("write newline")?;
            break;
        };
        let line = line.context("read message")?;
        let message = line.trim();

        if message.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&message) {
            break;
        }
        if message == CLEAR_COMMAND {
            runtime.block_on(assistant.clear_conversation(id));
            writeln!(output, "Conversación reiniciada.").context("write reset notice")?;
            continue;
        }
        if message == SUGGESTIONS_COMMAND {
            for suggestion in runtime.block_on(assistant.suggestions(id)) {
                writeln!(output, "  • {suggestion}").context("write suggestion")?;
            }
            continue;
        }

        let response = runtime.block_on(assistant.process_message(id, message));
        render(output, &response).context("write response")?;
    }

    Ok(())
}

fn render<W: Write>(output: &mut W, response: &AssistantResponse) -> io::Result<()> {
    writeln!(output, "{}", response.text)?;
    if !response.recommendations.is_empty() {
        writeln!(output)?;
        for recommendation in &response.recommendations {
            writeln!(output, "  → {recommendation}")?;
        }
    }
    writeln!(output)
}
