use std::process::ExitCode;

use aula_cli::Cli;
use aula_core::config::AppConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use aula_core::config::LogFormat::*;

    // stdout carries command payloads
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // A broken config is reported by the command itself.
    if let Ok(config) = AppConfig::load(cli.load_options()) {
        init_logging(&config);
    }

    aula_cli::execute(cli)
}
