pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use aula_core::config::{ConfigOverrides, LoadOptions};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "aula",
    about = "Aula academic assistant CLI",
    long_about = "Ask questions about students, teachers, careers and risk reports, and prepare \
                  the SQLite database the assistant reads from.",
    after_help = "Examples:\n  aula migrate && aula seed\n  aula ask \"¿Cuántos estudiantes hay?\"\n  aula chat --conversation 7"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Path to an aula.toml config file")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    pub database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    pub log_level: Option<String>,
    #[arg(long, global = true, help = "Override assistant.catalog_path")]
    pub catalog: Option<PathBuf>,
    #[arg(long, global = true, help = "Fix the response variant seed")]
    pub seed: Option<u64>,
}

impl GlobalArgs {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                catalog_path: self.catalog.clone(),
                response_seed: self.seed,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer one message and print the structured response")]
    Ask {
        #[arg(long, short, default_value_t = 1, help = "Conversation id")]
        conversation: i64,
        #[arg(required = true, num_args = 1.., help = "Message text")]
        message: Vec<String>,
    },
    #[command(about = "Interactive conversation over stdin")]
    Chat {
        #[arg(long, short, default_value_t = 1, help = "Conversation id")]
        conversation: i64,
    },
    #[command(about = "List the intents and version of the loaded catalog")]
    Catalog,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic academic demo dataset")]
    Seed,
}

impl Cli {
    pub fn load_options(&self) -> LoadOptions {
        self.global.load_options()
    }
}

pub fn run() -> ExitCode {
    execute(Cli::parse())
}

pub fn execute(cli: Cli) -> ExitCode {
    let options = cli.load_options();

    let result = match cli.command {
        Command::Ask { conversation, message } => {
            commands::ask::run(&options, conversation, &message.join(" "))
        }
        Command::Chat { conversation } => commands::chat::run(&options, conversation),
        Command::Catalog => commands::catalog::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
