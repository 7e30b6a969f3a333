//! Start, Wait and health polling for [`Command`].

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bollard::errors::Error as BollardError;
use mockable::DefaultEnv;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::forward::{OutputCopier, OutputSinks, Sink, spawn_input, spawn_output};
use super::guard::ContainerGuard;
use super::health::poll_until_healthy;
use super::pipe::SharedBuffer;
use super::scope::DerivedScope;
use super::{Command, Phase, State};
use crate::engine::translate::{ContainerSpec, ensure_networks, ensure_volumes};
use crate::engine::{ContainerEngine, EngineConnector, SocketResolver, WaitStatus, is_not_found};
use crate::error::{ComposeError, EngineError, ExitError, Result, UsageError};

/// Identity of a started container, kept for health polling.
#[derive(Clone)]
pub(crate) struct ContainerHandle {
    id: String,
    client: Arc<dyn ContainerEngine>,
}

/// Everything Wait consumes, taken from the command in one step.
pub(crate) struct WaitParts {
    guard: ContainerGuard,
    scope: DerivedScope,
    exit: oneshot::Receiver<ExitOutcome>,
    output: OutputCopier,
    input: Option<JoinHandle<io::Result<()>>>,
    capture: Option<SharedBuffer>,
}

/// How long an abandoned output task gets to close its sinks.
const ABANDON_GRACE: Duration = Duration::from_secs(1);

type ExitOutcome = std::result::Result<WaitStatus, BollardError>;

/// Streams handed over at start; whatever is left on failure is closed with
/// the error.
struct PendingStreams {
    conflict: Option<UsageError>,
    stdin: Option<super::BoxedReader>,
    stdout: Option<Sink>,
    stderr: Option<Sink>,
    capture: Option<SharedBuffer>,
}

impl PendingStreams {
    async fn fail(self, error: &ComposeError) {
        let closing = closing_error(error);
        let observed = Err(&closing);
        if let Some(sink) = self.stdout {
            sink.close(observed).await;
        }
        if let Some(sink) = self.stderr {
            sink.close(observed).await;
        }
    }
}

async fn within<F: Future>(scope: &CancellationToken, work: F) -> Result<F::Output> {
    scope
        .run_until_cancelled(work)
        .await
        .ok_or(ComposeError::Cancelled)
}

impl Command {
    /// Create, attach and start the service container.
    ///
    /// Usage errors are reported before the engine is contacted. Setup
    /// engine calls run under a scope derived from the caller's token that
    /// also fires on the shutdown trigger. Once a container exists, any
    /// later failure removes it before returning.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::AlreadyStarted` on a second call, the matching
    /// `*AlreadySet` error when a stream setter collided with a taken pipe,
    /// usage errors for an invalid service, and engine errors from image, network,
    /// volume and container setup. Returns `ComposeError::Cancelled` when
    /// the scope fires during setup.
    pub async fn start_async(&self) -> Result<()> {
        let mut streams = self.begin_start()?;
        let launched = match streams.conflict.take() {
            Some(conflict) => Err(conflict.into()),
            None => self.launch(&mut streams).await,
        };
        match launched {
            Ok((handle, parts)) => {
                let mut state = self.lock();
                state.phase = Phase::Running;
                state.container = Some(handle);
                state.wait = Some(parts);
                Ok(())
            }
            Err(error) => {
                self.lock().phase = Phase::Terminal;
                streams.fail(&error).await;
                Err(error)
            }
        }
    }

    fn begin_start(&self) -> Result<PendingStreams> {
        let mut state = self.lock();
        if state.phase != Phase::Unstarted {
            return Err(UsageError::AlreadyStarted.into());
        }
        state.phase = Phase::Starting;
        let State {
            conflict,
            stdin,
            stdout,
            stderr,
            capture_stderr,
            ..
        } = &mut *state;
        Ok(PendingStreams {
            conflict: conflict.take(),
            stdin: stdin.take(),
            stdout: stdout.take(),
            stderr: stderr.take(),
            capture: capture_stderr.then(SharedBuffer::default),
        })
    }

    fn acquire_client(&self) -> Result<Arc<dyn ContainerEngine>> {
        if let Some(client) = &self.client {
            return Ok(Arc::clone(client));
        }
        let env = DefaultEnv::new();
        let resolver = SocketResolver::new(&env);
        let docker =
            EngineConnector::connect_with_fallback(self.engine_socket.as_deref(), &resolver)?;
        debug!("created engine client owned by this command");
        Ok(Arc::new(docker))
    }

    async fn launch(
        &self,
        streams: &mut PendingStreams,
    ) -> Result<(ContainerHandle, WaitParts)> {
        let mut invocation = self.invocation.clone();
        invocation.stdin = streams.stdin.is_some();
        let spec = ContainerSpec::build(&self.service, &invocation)?;

        let scope = DerivedScope::new(&self.cancel, &self.shutdown);
        let client = self.acquire_client()?;
        let token = scope.token();

        within(token, ensure_image(client.as_ref(), &spec.image)).await??;
        within(
            token,
            ensure_networks(client.as_ref(), self.service.context(), &spec.networks),
        )
        .await??;
        within(
            token,
            ensure_volumes(
                client.as_ref(),
                self.service.descriptor(),
                self.service.context(),
            ),
        )
        .await??;

        let options = spec.create_options();
        let ContainerSpec { name, body, .. } = spec;
        let id = within(token, client.create_container(Some(options), body))
            .await?
            .map_err(|error| EngineError::CreateFailed {
                message: error.to_string(),
            })?;
        info!(container_id = %id, container_name = %name, service = %self.service.name(), "container created");

        let guard = ContainerGuard::new(Arc::clone(&client), id.clone(), self.timeouts);
        let handle = ContainerHandle {
            id,
            client: Arc::clone(&client),
        };
        match attach_and_start(&guard, token, streams).await {
            Ok((output, input)) => {
                let exit = listen_for_exit(Arc::clone(&client), guard.id());
                let parts = WaitParts {
                    guard,
                    scope,
                    exit,
                    output,
                    input,
                    capture: streams.capture.take(),
                };
                Ok((handle, parts))
            }
            Err(error) => {
                guard.remove().await;
                Err(error)
            }
        }
    }

    /// Wait for the container to exit, drain its streams and remove it.
    ///
    /// Cancelling the caller's token, or the shutdown trigger firing, stops
    /// the container once (killing it if the stop fails) and keeps waiting
    /// for the real exit.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::NotStarted` before a successful start,
    /// `UsageError::InternalStateIncomplete` when Wait already ran or start
    /// failed, `EngineError::WaitFailed` when the engine reports a wait
    /// error, `ComposeError::Cancelled` when the caller cancelled, and
    /// [`ExitError`] for a non-zero exit status.
    pub async fn wait_async(&self) -> Result<()> {
        let parts = self.take_wait_parts()?;
        let outcome = self.finish(parts).await;
        let mut state = self.lock();
        state.phase = Phase::Terminal;
        state.container = None;
        drop(state);
        if self.client.is_none() {
            debug!("releasing engine client owned by this command");
        }
        outcome
    }

    fn take_wait_parts(&self) -> Result<WaitParts> {
        let mut state = self.lock();
        match state.phase {
            Phase::Unstarted | Phase::Starting => Err(UsageError::NotStarted.into()),
            Phase::Running | Phase::Stopping | Phase::Terminal => state
                .wait
                .take()
                .ok_or_else(|| UsageError::InternalStateIncomplete.into()),
        }
    }

    async fn finish(&self, parts: WaitParts) -> Result<()> {
        let WaitParts {
            guard,
            scope,
            exit,
            mut output,
            input,
            capture,
        } = parts;

        let status = match self.await_exit(&guard, scope.token(), exit).await {
            Ok(status) => status,
            Err(error) => {
                abort_input(input);
                output.abandon(closing_error(&error), ABANDON_GRACE).await;
                return Err(error);
            }
        };
        drop(scope);

        if let Some(mut copier) = input {
            if timeout(self.timeouts.stdin_drain, &mut copier).await.is_err() {
                debug!(container_id = %guard.id(), "stdin copier still running; closing container stdin");
                copier.abort();
            }
        }

        tokio::select! {
            biased;
            drained = output.drained() => {
                if let Some(error) = drained {
                    debug!(container_id = %guard.id(), %error, "output stream ended with an error");
                }
            }
            () = self.cancel.cancelled() => {
                output
                    .abandon(closing_error(&ComposeError::Cancelled), ABANDON_GRACE)
                    .await;
                guard.remove().await;
                return Err(ComposeError::Cancelled);
            }
        }

        let exit_state = if status.error.is_none() && status.status_code != 0 {
            guard.inspect().await
        } else {
            None
        };
        guard.remove().await;

        if self.cancel.is_cancelled() {
            return Err(ComposeError::Cancelled);
        }
        if let Some(message) = status.error {
            return Err(EngineError::WaitFailed {
                container_id: String::from(guard.id()),
                message,
            }
            .into());
        }
        if status.status_code != 0 {
            let stderr = capture.map(|buffer| buffer.contents()).unwrap_or_default();
            return Err(ExitError::new(status.status_code)
                .with_stderr(stderr)
                .with_container_state(exit_state)
                .into());
        }
        Ok(())
    }

    /// Wait for the engine to report an exit, stopping the container once if
    /// the scope fires first.
    ///
    /// A wait error removes the container before it is returned.
    async fn await_exit(
        &self,
        guard: &ContainerGuard,
        scope: &CancellationToken,
        mut exit: oneshot::Receiver<ExitOutcome>,
    ) -> Result<WaitStatus> {
        let mut stop_requested = false;
        let outcome = loop {
            tokio::select! {
                () = scope.cancelled(), if !stop_requested => {
                    stop_requested = true;
                    self.lock().phase = Phase::Stopping;
                    guard.stop_then_kill().await;
                }
                received = &mut exit => break received,
            }
        };
        let message = match outcome {
            Ok(Ok(status)) => return Ok(status),
            Ok(Err(error)) => error.to_string(),
            Err(_) => String::from("wait listener ended without a result"),
        };
        warn!(container_id = %guard.id(), error = %message, "wait failed; removing container");
        guard.remove().await;
        Err(EngineError::WaitFailed {
            container_id: String::from(guard.id()),
            message,
        }
        .into())
    }

    /// Block until the started container reports healthy.
    ///
    /// May run concurrently with [`Self::wait_async`].
    ///
    /// # Errors
    ///
    /// Returns `UsageError::HealthcheckNotDefined` without contacting the
    /// engine when the service declares no healthcheck, `UsageError::NotStarted`
    /// before start, engine errors when the container stops, turns unhealthy
    /// or exposes no health state, and `ComposeError::Cancelled` when the
    /// caller cancels.
    pub async fn wait_until_healthy_async(&self) -> Result<()> {
        if self.service.descriptor().healthcheck.is_none() {
            return Err(UsageError::HealthcheckNotDefined.into());
        }
        let handle = {
            let state = self.lock();
            match (state.phase, &state.container) {
                (Phase::Unstarted | Phase::Starting, _) => {
                    return Err(UsageError::NotStarted.into());
                }
                (_, Some(handle)) => handle.clone(),
                (_, None) => return Err(UsageError::InternalStateIncomplete.into()),
            }
        };
        poll_until_healthy(
            handle.client.as_ref(),
            &handle.id,
            self.timeouts.health_poll,
            &self.cancel,
        )
        .await
    }
}

async fn ensure_image(client: &dyn ContainerEngine, image: &str) -> Result<()> {
    let pull_failed = |error: BollardError| EngineError::ImagePullFailed {
        image: String::from(image),
        message: error.to_string(),
    };
    match client.inspect_image(image).await {
        Ok(()) => {
            debug!(image, "image present");
            Ok(())
        }
        Err(error) if is_not_found(&error) => {
            info!(image, "pulling image");
            client.pull_image(image).await.map_err(pull_failed)?;
            Ok(())
        }
        Err(error) => Err(pull_failed(error).into()),
    }
}

type Forwarders = (OutputCopier, Option<JoinHandle<io::Result<()>>>);

/// Attach before starting, and start only once the output reader is live.
async fn attach_and_start(
    guard: &ContainerGuard,
    scope: &CancellationToken,
    streams: &mut PendingStreams,
) -> Result<Forwarders> {
    let client = guard.client();
    let id = guard.id();
    let attached = within(scope, client.attach_container(id, streams.stdin.is_some()))
        .await?
        .map_err(|error| EngineError::AttachFailed {
            container_id: String::from(id),
            message: error.to_string(),
        })?;

    let task = spawn_output(
        attached.output,
        OutputSinks {
            stdout: streams.stdout.take().unwrap_or(Sink::Discard),
            stderr: streams.stderr.take().unwrap_or(Sink::Discard),
            capture: streams.capture.clone(),
        },
    );
    let input = streams
        .stdin
        .take()
        .map(|source| spawn_input(source, attached.input));
    if task.ready.await.is_err() {
        debug!(container_id = %id, "output task ended before reporting readiness");
    }

    let started = match within(scope, client.start_container(id)).await {
        Ok(result) => result.map_err(|error| {
            ComposeError::from(EngineError::StartFailed {
                container_id: String::from(id),
                message: error.to_string(),
            })
        }),
        Err(cancelled) => Err(cancelled),
    };
    if let Err(error) = started {
        abort_input(input);
        task.copier
            .abandon(closing_error(&error), ABANDON_GRACE)
            .await;
        return Err(error);
    }
    info!(container_id = %id, "container started");
    Ok((task.copier, input))
}

/// Error delivered to pipe readers when their stream is cut short.
fn closing_error(error: &ComposeError) -> io::Error {
    io::Error::other(error.to_string())
}

fn abort_input(input: Option<JoinHandle<io::Result<()>>>) {
    if let Some(task) = input {
        task.abort();
    }
}

/// Listen for the container exit outside any cancellation scope, so a
/// cancelled caller still observes the engine's real outcome.
fn listen_for_exit(
    client: Arc<dyn ContainerEngine>,
    container_id: &str,
) -> oneshot::Receiver<ExitOutcome> {
    let (exit_tx, exit) = oneshot::channel();
    let id = String::from(container_id);
    tokio::spawn(async move {
        let outcome = client.wait_container(&id).await;
        if exit_tx.send(outcome).is_err() {
            debug!(container_id = %id, "wait outcome had no listener");
        }
    });
    exit
}
