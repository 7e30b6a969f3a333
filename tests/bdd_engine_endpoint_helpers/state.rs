//! Shared behavioural-test state for engine endpoint scenarios.

use std::collections::HashMap;

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Step result type for endpoint BDD tests.
pub type StepResult<T> = Result<T, String>;

/// Failure observed when connecting or starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The socket file does not exist.
    SocketNotFound(String),
    /// The engine did not answer the ping.
    HealthCheckFailed(String),
    /// Any other engine error, rendered.
    Engine(String),
    /// A failure outside the engine layer, rendered.
    Other(String),
}

/// Shared scenario state for engine endpoint behavioural tests.
#[derive(Default, ScenarioState)]
pub struct EndpointState {
    /// Variables visible to the resolver.
    pub(crate) env: Slot<HashMap<String, String>>,
    /// Socket named by configuration, when any.
    pub(crate) configured: Slot<Option<String>>,
    /// Endpoint chosen by the resolver.
    pub(crate) resolved: Slot<String>,
    /// Failure from verification or start; `None` when it succeeded.
    pub(crate) failure: Slot<Option<ConnectFailure>>,
}

/// Fixture providing fresh state for each endpoint scenario.
#[fixture]
pub fn endpoint_state() -> EndpointState {
    let state = EndpointState::default();
    state.env.set(HashMap::new());
    state.configured.set(None);
    state
}
