use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use logtree_cli::cli::{Cli, Commands};
use logtree_cli::commands;
use logtree_cli::error::CliError;
use logtree_cli::logging;
use logtree_cli::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    // `config validate`는 설정 로딩 실패를 직접 보고하므로 여기서는 에러를 미룹니다.
    let loaded = commands::load_config(cli.config.as_deref()).await;

    let mut general = loaded
        .as_ref()
        .map(|l| l.config.general.clone())
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    logging::init_tracing(&general).map_err(|e| CliError::Command(e.to_string()))?;
    logtree_core::metrics::describe_all();

    tracing::debug!(command = ?cli.command, "logtree starting");

    match cli.command {
        Commands::Classify(args) => commands::classify::execute(args, loaded?, &writer).await,
        Commands::Tree(args) => commands::tree::execute(args, loaded?, &writer).await,
        Commands::Patterns(args) => commands::patterns::execute(args, &writer).await,
        Commands::Config(args) => {
            commands::config::execute(args, cli.config.as_deref(), &writer).await
        }
    }
}
