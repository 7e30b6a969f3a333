//! Given/when step definitions for command lifecycle scenarios.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, NetworkCreateRequest, VolumeCreateOptions};
use bollard::query_parameters::CreateContainerOptions;
use bytes::Bytes;
use compose_exec::command::{Command, ShutdownTrigger};
use compose_exec::engine::{
    AttachedStreams, ContainerEngine, ContainerRef, ContainerStateSnapshot, EngineFuture,
    NetworkRef, WaitStatus,
};
use compose_exec::error::{ComposeError, Result as ComposeResult};
use compose_exec::project::{BuildSpec, ProjectContext, Service, ServiceDescriptor};
use futures_util::stream;
use mockall::mock;
use rstest_bdd_macros::{given, when};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::state::{ContainerScript, LifecycleState, RunOutcome, StepResult};

mock! {
    Engine {}

    impl ContainerEngine for Engine {
        fn inspect_image(&self, image: &str) -> EngineFuture<'_, ()>;
        fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;
        fn list_networks(
            &self,
            filters: HashMap<String, Vec<String>>,
        ) -> EngineFuture<'_, Vec<NetworkRef>>;
        fn create_network(&self, request: NetworkCreateRequest) -> EngineFuture<'_, ()>;
        fn remove_network(&self, network: &str) -> EngineFuture<'_, ()>;
        fn create_volume(&self, request: VolumeCreateOptions) -> EngineFuture<'_, ()>;
        fn create_container(
            &self,
            options: Option<CreateContainerOptions>,
            body: ContainerCreateBody,
        ) -> EngineFuture<'_, String>;
        fn attach_container(
            &self,
            container_id: &str,
            stdin: bool,
        ) -> EngineFuture<'_, AttachedStreams>;
        fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
        fn wait_container(&self, container_id: &str) -> EngineFuture<'_, WaitStatus>;
        fn inspect_container(
            &self,
            container_id: &str,
        ) -> EngineFuture<'_, ContainerStateSnapshot>;
        fn stop_container(&self, container_id: &str, grace_secs: i32) -> EngineFuture<'_, ()>;
        fn kill_container(&self, container_id: &str, signal: &str) -> EngineFuture<'_, ()>;
        fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
        fn list_containers(
            &self,
            filters: HashMap<String, Vec<String>>,
        ) -> EngineFuture<'_, Vec<ContainerRef>>;
    }
}

const CONTAINER_ID: &str = "bdd-container-id";

/// Engine operations recorded in invocation order.
type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, call: &str) {
    if let Ok(mut calls) = log.lock() {
        calls.push(String::from(call));
    }
}

fn ready<T: Send + 'static>(value: Result<T, BollardError>) -> EngineFuture<'static, T> {
    Box::pin(async move { value })
}

/// Build an engine double that plays `script` and records each call.
fn scripted_engine(script: &ContainerScript, log: &CallLog) -> MockEngine {
    let mut engine = MockEngine::new();
    let stopped = Arc::new(Notify::new());

    let inspect_log = Arc::clone(log);
    engine.expect_inspect_image().returning(move |_| {
        record(&inspect_log, "inspect_image");
        ready(Ok(()))
    });
    let create_log = Arc::clone(log);
    engine.expect_create_container().returning(move |_, _| {
        record(&create_log, "create");
        ready(Ok(String::from(CONTAINER_ID)))
    });
    let attach_log = Arc::clone(log);
    let frames = script_frames(script);
    engine.expect_attach_container().returning(move |_, _| {
        record(&attach_log, "attach");
        ready(Ok(AttachedStreams {
            output: Box::pin(stream::iter(frames.clone().into_iter().map(Ok::<LogOutput, BollardError>))),
            input: Box::pin(tokio::io::sink()),
        }))
    });
    let start_log = Arc::clone(log);
    engine.expect_start_container().returning(move |_| {
        record(&start_log, "start");
        ready(Ok(()))
    });
    let wait_log = Arc::clone(log);
    let exit_code = script.exit_code;
    let runs_until_stopped = script.runs_until_stopped;
    let stop_signal = Arc::clone(&stopped);
    engine.expect_wait_container().returning(move |_| {
        record(&wait_log, "wait");
        let signal = Arc::clone(&stop_signal);
        Box::pin(async move {
            if runs_until_stopped {
                signal.notified().await;
            }
            Ok(WaitStatus {
                status_code: exit_code,
                error: None,
            })
        })
    });
    let stop_log = Arc::clone(log);
    engine.expect_stop_container().returning(move |_, _| {
        record(&stop_log, "stop");
        stopped.notify_one();
        ready(Ok(()))
    });
    let kill_log = Arc::clone(log);
    engine.expect_kill_container().returning(move |_, _| {
        record(&kill_log, "kill");
        ready(Ok(()))
    });
    let inspect_state_log = Arc::clone(log);
    engine.expect_inspect_container().returning(move |_| {
        record(&inspect_state_log, "inspect_container");
        ready(Ok(ContainerStateSnapshot {
            status: Some(String::from("exited")),
            exit_code: Some(exit_code),
            ..ContainerStateSnapshot::default()
        }))
    });
    let remove_log = Arc::clone(log);
    engine.expect_remove_container().returning(move |_| {
        record(&remove_log, "remove");
        ready(Ok(()))
    });
    engine
}

fn script_frames(script: &ContainerScript) -> Vec<LogOutput> {
    let mut frames = Vec::new();
    if !script.stdout.is_empty() {
        frames.push(LogOutput::StdOut {
            message: Bytes::from(script.stdout.clone()),
        });
    }
    if !script.stderr.is_empty() {
        frames.push(LogOutput::StdErr {
            message: Bytes::from(script.stderr.clone()),
        });
    }
    frames
}

/// A command bound to a scripted engine, plus what the scenario observes.
struct Harness {
    command: Command,
    cancel: CancellationToken,
    log: CallLog,
    runtime: tokio::runtime::Runtime,
}

fn harness(lifecycle_state: &LifecycleState) -> StepResult<Harness> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|_| String::from("failed to create tokio runtime for scenario"))?;
    let log = CallLog::default();
    let script = lifecycle_state.script.get().unwrap_or_default();
    let engine = scripted_engine(&script, &log);

    let descriptor = ServiceDescriptor {
        image: lifecycle_state.image.get().flatten(),
        build: lifecycle_state
            .declares_build
            .get()
            .unwrap_or(false)
            .then(BuildSpec::default),
        ..ServiceDescriptor::default()
    };
    let service = Service::new("app", descriptor, Arc::new(ProjectContext::default()));
    let cancel = CancellationToken::new();
    let command = service
        .command(Vec::<String>::new())
        .with_client(Arc::new(engine))
        .with_cancellation(cancel.clone())
        .with_shutdown_trigger(ShutdownTrigger::never());

    Ok(Harness {
        command,
        cancel,
        log,
        runtime,
    })
}

fn classify(result: &ComposeResult<()>) -> RunOutcome {
    match result {
        Ok(()) => RunOutcome::Success,
        Err(ComposeError::Exit(exit)) => RunOutcome::Exit {
            code: exit.exit_code(),
            stderr: String::from_utf8_lossy(exit.stderr()).into_owned(),
        },
        Err(ComposeError::Usage(error)) => RunOutcome::Usage(error.to_string()),
        Err(ComposeError::Cancelled) => RunOutcome::Cancelled,
        Err(other) => RunOutcome::Other(other.to_string()),
    }
}

fn finish(lifecycle_state: &LifecycleState, log: &CallLog, result: &ComposeResult<()>) -> StepResult<()> {
    let calls = log
        .lock()
        .map_err(|_| String::from("engine call log mutex is poisoned"))?
        .clone();
    lifecycle_state.engine_calls.set(calls);
    lifecycle_state.outcome.set(classify(result));
    Ok(())
}

#[given("a service running image {image}")]
fn service_running_image(lifecycle_state: &LifecycleState, image: String) {
    lifecycle_state.image.set(Some(image));
}

#[given("a service that declares a build section")]
fn service_declares_build(lifecycle_state: &LifecycleState) {
    lifecycle_state.declares_build.set(true);
}

#[given("the container prints {text} and exits with status {code}")]
fn container_prints_and_exits(lifecycle_state: &LifecycleState, text: String, code: i64) {
    lifecycle_state.script.set(ContainerScript {
        stdout: text,
        exit_code: code,
        ..ContainerScript::default()
    });
}

#[given("the container writes {text} to stderr and exits with status {code}")]
fn container_writes_stderr_and_exits(lifecycle_state: &LifecycleState, text: String, code: i64) {
    lifecycle_state.script.set(ContainerScript {
        stderr: text,
        exit_code: code,
        ..ContainerScript::default()
    });
}

#[given("the container runs until it is stopped")]
fn container_runs_until_stopped(lifecycle_state: &LifecycleState) {
    lifecycle_state.script.set(ContainerScript {
        exit_code: 137,
        runs_until_stopped: true,
        ..ContainerScript::default()
    });
}

#[when("the command output is captured")]
fn command_output_is_captured(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let scenario = harness(lifecycle_state)?;
    let captured = scenario.runtime.block_on(scenario.command.output_async());
    lifecycle_state
        .output
        .set(String::from_utf8_lossy(&captured.bytes).into_owned());
    finish(lifecycle_state, &scenario.log, &captured.result)
}

#[when("the command is run")]
fn command_is_run(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let scenario = harness(lifecycle_state)?;
    let result = scenario.runtime.block_on(scenario.command.run_async());
    finish(lifecycle_state, &scenario.log, &result)
}

#[when("readiness is awaited")]
fn readiness_is_awaited(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let scenario = harness(lifecycle_state)?;
    let result = scenario
        .runtime
        .block_on(scenario.command.wait_until_healthy_async());
    finish(lifecycle_state, &scenario.log, &result)
}

#[when("the command is started and then cancelled")]
fn command_is_started_then_cancelled(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let scenario = harness(lifecycle_state)?;
    let result = scenario.runtime.block_on(async {
        scenario.command.start_async().await?;
        scenario.cancel.cancel();
        scenario.command.wait_async().await
    });
    finish(lifecycle_state, &scenario.log, &result)
}

#[when("the command is started twice and waited on")]
fn command_is_started_twice(lifecycle_state: &LifecycleState) -> StepResult<()> {
    let scenario = harness(lifecycle_state)?;
    let result = scenario.runtime.block_on(async {
        scenario.command.start_async().await?;
        let second = scenario.command.start_async().await;
        lifecycle_state.second_start.set(classify(&second));
        scenario.command.wait_async().await
    });
    finish(lifecycle_state, &scenario.log, &result)
}
