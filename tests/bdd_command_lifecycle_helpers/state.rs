//! Shared behavioural-test state for command lifecycle scenarios.

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Step result type for lifecycle BDD tests.
pub type StepResult<T> = Result<T, String>;

/// What the scripted container does once started.
#[derive(Debug, Clone, Default)]
pub struct ContainerScript {
    /// Bytes written to stdout.
    pub stdout: String,
    /// Bytes written to stderr.
    pub stderr: String,
    /// Exit status reported by the engine.
    pub exit_code: i64,
    /// Keep running until a stop request arrives.
    pub runs_until_stopped: bool,
}

/// High-level outcome observed after a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The operation succeeded.
    Success,
    /// The container exited non-zero.
    Exit {
        /// The exit status.
        code: i64,
        /// Captured stderr.
        stderr: String,
    },
    /// A precondition was violated; holds the error message.
    Usage(String),
    /// The caller cancelled.
    Cancelled,
    /// Any other failure.
    Other(String),
}

/// Shared scenario state for command lifecycle behavioural tests.
#[derive(Default, ScenarioState)]
pub struct LifecycleState {
    /// Image the service runs; `None` when unset.
    pub(crate) image: Slot<Option<String>>,
    /// Whether the service declares a build section.
    pub(crate) declares_build: Slot<bool>,
    /// Scripted container behaviour.
    pub(crate) script: Slot<ContainerScript>,
    /// Outcome of the operation under test.
    pub(crate) outcome: Slot<RunOutcome>,
    /// Output captured by the command.
    pub(crate) output: Slot<String>,
    /// Error from a second start, when one was attempted.
    pub(crate) second_start: Slot<RunOutcome>,
    /// Engine operations in the order they were invoked.
    pub(crate) engine_calls: Slot<Vec<String>>,
}

/// Fixture providing fresh state for each lifecycle scenario.
#[fixture]
pub fn lifecycle_state() -> LifecycleState {
    let state = LifecycleState::default();
    state.image.set(Some(String::from("alpine:3.20")));
    state.declares_build.set(false);
    state.script.set(ContainerScript::default());
    state.engine_calls.set(Vec::new());
    state
}
