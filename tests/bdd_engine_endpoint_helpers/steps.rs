//! Given/when step definitions for engine endpoint scenarios.

use std::sync::Arc;

use compose_exec::config::AppConfig;
use compose_exec::engine::{EngineConnector, SocketResolver};
use compose_exec::error::{ComposeError, EngineError};
use compose_exec::project::{ProjectContext, Service, ServiceDescriptor};
use mockable::MockEnv;
use rstest_bdd_macros::{given, when};

use super::state::{ConnectFailure, EndpointState, StepResult};

fn runtime() -> StepResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to create tokio runtime: {error}"))
}

fn set_variable(endpoint_state: &EndpointState, name: &str, value: &str) {
    let mut env = endpoint_state.env.get().unwrap_or_default();
    env.insert(String::from(name), String::from(value));
    endpoint_state.env.set(env);
}

/// Environment double answering from the variables recorded so far.
fn mock_env(endpoint_state: &EndpointState) -> MockEnv {
    let env = endpoint_state.env.get().unwrap_or_default();
    let mut mock = MockEnv::new();
    mock.expect_string()
        .returning(move |name| env.get(name).cloned());
    mock
}

fn classify(error: ComposeError) -> ConnectFailure {
    match error {
        ComposeError::Engine(EngineError::SocketNotFound { path }) => {
            ConnectFailure::SocketNotFound(path.display().to_string())
        }
        ComposeError::Engine(EngineError::HealthCheckFailed { message }) => {
            ConnectFailure::HealthCheckFailed(message)
        }
        ComposeError::Engine(engine) => ConnectFailure::Engine(engine.to_string()),
        other => ConnectFailure::Other(other.to_string()),
    }
}

#[given("no engine socket is configured")]
fn no_engine_socket(endpoint_state: &EndpointState) {
    endpoint_state.configured.set(None);
}

#[given("the engine socket is configured as {socket}")]
fn engine_socket_configured(endpoint_state: &EndpointState, socket: String) {
    endpoint_state.configured.set(Some(socket));
}

#[given("the environment sets {name} to {value}")]
fn environment_sets(endpoint_state: &EndpointState, name: String, value: String) {
    set_variable(endpoint_state, &name, &value);
}

#[given("the environment leaves {name} empty")]
fn environment_leaves_empty(endpoint_state: &EndpointState, name: String) {
    set_variable(endpoint_state, &name, "");
}

#[when("the endpoint is resolved")]
fn endpoint_is_resolved(endpoint_state: &EndpointState) {
    let env = mock_env(endpoint_state);
    let resolver = SocketResolver::new(&env);
    let configured = endpoint_state.configured.get().flatten();
    endpoint_state
        .resolved
        .set(EngineConnector::resolve_socket(configured.as_deref(), &resolver));
}

#[when("the engine connection is verified")]
fn engine_connection_is_verified(endpoint_state: &EndpointState) -> StepResult<()> {
    let env = mock_env(endpoint_state);
    let resolver = SocketResolver::new(&env);
    let configured = endpoint_state.configured.get().flatten();
    let verified = runtime()?.block_on(EngineConnector::connect_with_fallback_and_verify_async(
        configured.as_deref(),
        &resolver,
    ));
    endpoint_state.failure.set(verified.err().map(classify));
    Ok(())
}

#[when("a command is started with that configuration")]
fn command_is_started(endpoint_state: &EndpointState) -> StepResult<()> {
    let config = AppConfig {
        engine_socket: endpoint_state.configured.get().flatten(),
        ..AppConfig::default()
    };
    let descriptor = ServiceDescriptor {
        image: Some(String::from("alpine:3.20")),
        ..ServiceDescriptor::default()
    };
    let service = Service::new("app", descriptor, Arc::new(ProjectContext::default()));
    let command = service
        .command(Vec::<String>::new())
        .with_config(&config);

    let started = runtime()?.block_on(command.start_async());
    endpoint_state.failure.set(started.err().map(classify));
    Ok(())
}
