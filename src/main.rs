//! `compose-exec` application entry point.
//!
//! Runs one service of a project document as a one-shot container, wiring
//! the container's streams to this process and exiting with its status. It
//! uses `eyre` for opaque error handling at the application boundary.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/compose-exec/config.toml` or path from
//!    `COMPOSE_EXEC_CONFIG_PATH`)
//! 3. Environment variables (`COMPOSE_EXEC_*`)
//! 4. Command-line arguments

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use compose_exec::api::{command_for, down};
use compose_exec::command::ShutdownTrigger;
use compose_exec::config::{AppConfig, Cli, Commands, DownArgs, RunArgs, load_config};
use compose_exec::engine::{EngineConnector, SocketResolver};
use compose_exec::error::{ComposeError, Result as ComposeResult};
use compose_exec::project::Project;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter directives.
const LOG_ENV_VAR: &str = "COMPOSE_EXEC_LOG";

/// Filter applied when [`LOG_ENV_VAR`] is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "compose_exec=info";

/// Time allowed for a pending stdin read to unwind at exit.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Exit code reported when a container status does not fit a process status.
const FALLBACK_EXIT_CODE: u8 = 1;

/// Application entry point.
///
/// A non-zero container exit becomes this process's exit code; every other
/// failure is reported through `eyre`.
fn main() -> EyreResult<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(run(&cli, &config));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(ComposeError::Exit(exit)) => {
            info!(code = exit.exit_code(), "service exited");
            Ok(ExitCode::from(
                u8::try_from(exit.exit_code()).unwrap_or(FALLBACK_EXIT_CODE),
            ))
        }
        Err(error) => Err(Report::from(error)),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report` and exit codes.
async fn run(cli: &Cli, config: &AppConfig) -> ComposeResult<()> {
    match &cli.command {
        Commands::Run(args) => run_service(config, args).await,
        Commands::Down(args) => down_project(config, args).await,
    }
}

/// Run a service with this process's standard streams.
async fn run_service(config: &AppConfig, args: &RunArgs) -> ComposeResult<()> {
    let cancel = CancellationToken::new();
    let mut command = command_for(config, &args.service, args.args.iter().cloned())?
        .with_cancellation(cancel.clone())
        .with_shutdown_trigger(ShutdownTrigger::os_signals())
        .with_env(args.env.iter().cloned())
        .with_stdin(tokio::io::stdin())
        .with_stdout(tokio::io::stdout())
        .with_stderr(tokio::io::stderr());
    if let Some(dir) = &args.workdir {
        command = command.with_working_dir(dir);
    }

    info!(service = %args.service, command = %command, "running service");
    if !args.wait_healthy {
        return command.run_async().await;
    }

    command.start_async().await?;
    if let Err(error) = command.wait_until_healthy_async().await {
        cancel.cancel();
        let teardown = command.wait_async().await;
        debug!(?teardown, "service torn down after failed health wait");
        return Err(error);
    }
    info!(service = %args.service, "service is healthy");
    command.wait_async().await
}

/// Tear down the named project, or the discovered one.
async fn down_project(config: &AppConfig, args: &DownArgs) -> ComposeResult<()> {
    let name = match &args.project {
        Some(project) => project.clone(),
        None => String::from(Project::discover(config.project_file.as_deref())?.name()),
    };
    let env = DefaultEnv::new();
    let resolver = SocketResolver::new(&env);
    let docker = EngineConnector::connect_with_fallback_and_verify_async(
        config.engine_socket.as_deref(),
        &resolver,
    )
    .await?;
    down(&docker, &name).await?;
    info!(project = %name, "project resources removed");
    Ok(())
}
