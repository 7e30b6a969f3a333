//! Then-step assertions for engine endpoint scenarios.

use compose_exec::engine::SocketResolver;
use mockable::MockEnv;
use rstest_bdd_macros::then;

use super::state::{ConnectFailure, EndpointState, StepResult};

fn resolved(endpoint_state: &EndpointState) -> StepResult<String> {
    endpoint_state
        .resolved
        .get()
        .ok_or_else(|| String::from("endpoint should have been resolved"))
}

fn failure(endpoint_state: &EndpointState) -> StepResult<ConnectFailure> {
    endpoint_state
        .failure
        .get()
        .flatten()
        .ok_or_else(|| String::from("expected the connection to fail"))
}

#[then("the endpoint is {expected}")]
fn endpoint_is(endpoint_state: &EndpointState, expected: String) -> StepResult<()> {
    let endpoint = resolved(endpoint_state)?;
    if endpoint == expected {
        Ok(())
    } else {
        Err(format!("expected endpoint {expected}, got {endpoint}"))
    }
}

#[then("the endpoint is the platform default")]
fn endpoint_is_platform_default(endpoint_state: &EndpointState) -> StepResult<()> {
    let endpoint = resolved(endpoint_state)?;
    let default = SocketResolver::<MockEnv>::default_socket();
    if endpoint == default {
        Ok(())
    } else {
        Err(format!("expected platform default {default}, got {endpoint}"))
    }
}

#[then("verification reports a missing socket at {path}")]
fn reports_missing_socket(endpoint_state: &EndpointState, path: String) -> StepResult<()> {
    match failure(endpoint_state)? {
        ConnectFailure::SocketNotFound(reported) if reported == path => Ok(()),
        other => Err(format!("expected missing socket at {path}, got {other:?}")),
    }
}

#[then("verification fails the health check")]
fn fails_health_check(endpoint_state: &EndpointState) -> StepResult<()> {
    match failure(endpoint_state)? {
        ConnectFailure::HealthCheckFailed(_) => Ok(()),
        other => Err(format!("expected a health check failure, got {other:?}")),
    }
}

#[then("the start fails with an engine error")]
fn start_fails_with_engine_error(endpoint_state: &EndpointState) -> StepResult<()> {
    match failure(endpoint_state)? {
        ConnectFailure::Engine(_) | ConnectFailure::SocketNotFound(_) => Ok(()),
        other => Err(format!("expected an engine error, got {other:?}")),
    }
}
