//! Then-step assertions for command lifecycle scenarios.

use compose_exec::error::UsageError;
use rstest_bdd_macros::then;

use super::state::{LifecycleState, RunOutcome, StepResult};

fn outcome(lifecycle_state: &LifecycleState) -> StepResult<RunOutcome> {
    lifecycle_state
        .outcome
        .get()
        .ok_or_else(|| String::from("lifecycle outcome should be set"))
}

fn engine_calls(lifecycle_state: &LifecycleState) -> Vec<String> {
    lifecycle_state.engine_calls.get().unwrap_or_default()
}

fn expect_usage(lifecycle_state: &LifecycleState, expected: &UsageError) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        RunOutcome::Usage(message) if message == expected.to_string() => Ok(()),
        other => Err(format!("expected usage error '{expected}', got {other:?}")),
    }
}

#[then("the command succeeds")]
fn command_succeeds(lifecycle_state: &LifecycleState) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        RunOutcome::Success => Ok(()),
        other => Err(format!("expected success, got {other:?}")),
    }
}

#[then("the captured output is {text}")]
fn captured_output_is(lifecycle_state: &LifecycleState, text: String) -> StepResult<()> {
    let output = lifecycle_state.output.get().unwrap_or_default();
    if output == text {
        Ok(())
    } else {
        Err(format!("expected output {text:?}, got {output:?}"))
    }
}

#[then("the command fails with exit status {code}")]
fn command_fails_with_exit_status(lifecycle_state: &LifecycleState, code: i64) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        RunOutcome::Exit { code: actual, .. } if actual == code => Ok(()),
        other => Err(format!("expected exit status {code}, got {other:?}")),
    }
}

#[then("the exit error carries stderr {text}")]
fn exit_error_carries_stderr(lifecycle_state: &LifecycleState, text: String) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        RunOutcome::Exit { stderr, .. } if stderr == text => Ok(()),
        other => Err(format!("expected captured stderr {text:?}, got {other:?}")),
    }
}

#[then("the command is rejected because builds are unsupported")]
fn rejected_for_build(lifecycle_state: &LifecycleState) -> StepResult<()> {
    expect_usage(lifecycle_state, &UsageError::BuildUnsupported)
}

#[then("the command is rejected because no healthcheck is defined")]
fn rejected_for_missing_healthcheck(lifecycle_state: &LifecycleState) -> StepResult<()> {
    expect_usage(lifecycle_state, &UsageError::HealthcheckNotDefined)
}

#[then("the command reports cancellation")]
fn command_reports_cancellation(lifecycle_state: &LifecycleState) -> StepResult<()> {
    match outcome(lifecycle_state)? {
        RunOutcome::Cancelled => Ok(()),
        other => Err(format!("expected cancellation, got {other:?}")),
    }
}

#[then("the second start is rejected")]
fn second_start_is_rejected(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let expected = RunOutcome::Usage(UsageError::AlreadyStarted.to_string());
    match lifecycle_state.second_start.get() {
        Some(actual) if actual == expected => Ok(()),
        other => Err(format!("expected {expected:?}, got {other:?}")),
    }
}

#[then("no engine calls were made")]
fn no_engine_calls(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let calls = engine_calls(lifecycle_state);
    if calls.is_empty() {
        Ok(())
    } else {
        Err(format!("expected no engine calls, got {calls:?}"))
    }
}

#[then("the engine saw {sequence}")]
fn engine_saw(lifecycle_state: &LifecycleState, sequence: String) -> StepResult<()> {
    let calls = engine_calls(lifecycle_state);
    let expected: Vec<&str> = sequence.split(',').map(str::trim).collect();
    if calls == expected {
        Ok(())
    } else {
        Err(format!("expected engine calls {expected:?}, got {calls:?}"))
    }
}

#[then("the container is removed once")]
fn container_removed_once(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let removals = engine_calls(lifecycle_state)
        .iter()
        .filter(|call| *call == "remove")
        .count();
    if removals == 1 {
        Ok(())
    } else {
        Err(format!("expected one removal, got {removals}"))
    }
}

#[then("the container was stopped before it was removed")]
fn stopped_before_removed(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let calls = engine_calls(lifecycle_state);
    let stop = calls.iter().position(|call| call == "stop");
    let remove = calls.iter().position(|call| call == "remove");
    match (stop, remove) {
        (Some(stopped), Some(removed)) if stopped < removed => Ok(()),
        _ => Err(format!("expected stop before remove, got {calls:?}")),
    }
}
