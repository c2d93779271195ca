// Waypoint agent engine
// Main entry point for the waypoint binary

use clap::Parser;
use sdk::errors::EngineError;
use waypoint_engine::cli::{Cli, Command, ConfigAction};
use waypoint_engine::config::Config;
use waypoint_engine::handlers::{
    handle_config_show, handle_dispatch, handle_run, handle_tools, OutputFormat,
};
use waypoint_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let result = run(cli).await;

    if let Some(engine) = result.as_ref().err().and_then(|e| e.downcast_ref::<EngineError>()) {
        eprintln!("Hint: {}", engine.user_hint());
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {

    let config = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path),
        None => Config::load_or_create(),
    };

    // RUST_LOG > --log > config log_level
    match (&cli.log, &config) {
        (Some(level), _) => init_telemetry_with_level(level),
        (None, Ok(config)) => init_telemetry_with_level(&config.core.log_level),
        (None, Err(_)) => init_telemetry(),
    }
    let config = config?;

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("Waypoint v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run {
            goal,
            session,
            tools,
        } => {
            tracing::info!("Running goal: {}", goal);
            handle_run(goal, session, tools, &config, format).await
        }

        Command::Tools => handle_tools(&config, format).await,

        Command::Dispatch { tool, params } => {
            tracing::info!("Dispatching tool: {}", tool);
            handle_dispatch(tool, params, &config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
        },
    }
}
