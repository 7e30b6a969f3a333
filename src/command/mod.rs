//! Subprocess-style execution of a service as a one-shot container.
//!
//! A [`Command`] is configured like a process command (arguments,
//! environment, working directory and standard streams), then started and
//! waited on. Each command creates exactly one container and removes it
//! exactly once, whichever way the run ends.
//!
//! The lifecycle moves through the phases `Unstarted`, `Starting`,
//! `Running` (including any stop request issued on cancellation), and
//! `Terminal`. All mutable state sits behind one mutex; Wait takes what it
//! needs under the lock and then works without holding it.
//!
//! ```no_run
//! use compose_exec::project::Project;
//!
//! # async fn demo() -> compose_exec::error::Result<()> {
//! let project = Project::discover(None)?;
//! let output = project
//!     .command("db", ["pg_isready"])?
//!     .output_async()
//!     .await
//!     .into_result()?;
//! println!("{}", String::from_utf8_lossy(&output));
//! # Ok(())
//! # }
//! ```

mod forward;
mod guard;
mod health;
mod lifecycle;
mod pipe;
mod scope;


use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub use forward::{BoxedReader, BoxedWriter};
pub use pipe::{PipeReader, PipeWriter};
pub use scope::{LifecycleTimeouts, ShutdownTrigger};

use self::forward::Sink;
use self::lifecycle::{ContainerHandle, WaitParts};
use self::pipe::SharedBuffer;
use crate::config::AppConfig;
use crate::engine::ContainerEngine;
use crate::engine::translate::{Invocation, merged_environment};
use crate::error::{ComposeError, Result, UsageError};
use crate::project::Service;

/// Lifecycle phase of a [`Command`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Phase {
    #[default]
    Unstarted,
    Starting,
    Running,
    /// A stop was issued; Wait is still collecting the exit.
    Stopping,
    Terminal,
}

#[derive(Default)]
struct State {
    phase: Phase,
    /// First wiring conflict, reported by start.
    conflict: Option<UsageError>,
    stdin: Option<BoxedReader>,
    stdin_piped: bool,
    stdout: Option<Sink>,
    stderr: Option<Sink>,
    capture_stderr: bool,
    container: Option<ContainerHandle>,
    wait: Option<WaitParts>,
}

impl State {
    fn record_conflict(&mut self, conflict: UsageError) {
        if self.conflict.is_none() {
            self.conflict = Some(conflict);
        }
    }
}

/// A service invocation with process-like semantics.
///
/// Built by [`Service::command`](crate::project::Service::command) or
/// [`Project::command`](crate::project::Project::command).
pub struct Command {
    service: Service,
    invocation: Invocation,
    client: Option<Arc<dyn ContainerEngine>>,
    engine_socket: Option<String>,
    cancel: CancellationToken,
    shutdown: ShutdownTrigger,
    timeouts: LifecycleTimeouts,
    state: Mutex<State>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("service", &self.service.name())
            .field("invocation", &self.invocation)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Bytes captured by [`Command::output_async`] or
/// [`Command::combined_output_async`], with the run outcome.
///
/// The bytes are kept even when the run fails, matching process-output
/// conventions.
#[derive(Debug)]
#[must_use]
pub struct CapturedOutput {
    /// Captured output.
    pub bytes: Vec<u8>,
    /// Outcome of the run.
    pub result: Result<()>,
}

impl CapturedOutput {
    /// Return the bytes on success, or the run error.
    ///
    /// # Errors
    ///
    /// Returns the error the run ended with.
    pub fn into_result(self) -> Result<Vec<u8>> {
        self.result.map(|()| self.bytes)
    }

    fn rejected(error: UsageError) -> Self {
        Self {
            bytes: Vec::new(),
            result: Err(error.into()),
        }
    }
}

impl Command {
    /// Create a command for `service` using the image or service command.
    #[must_use]
    pub fn new(service: Service) -> Self {
        Self {
            service,
            invocation: Invocation::default(),
            client: None,
            engine_socket: None,
            cancel: CancellationToken::new(),
            shutdown: ShutdownTrigger::default(),
            timeouts: LifecycleTimeouts::default(),
            state: Mutex::new(State::default()),
        }
    }

    /// Replace the command arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add environment entries (`KEY=value` or bare `KEY`) over the
    /// service environment.
    #[must_use]
    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.env.extend(env.into_iter().map(Into::into));
        self
    }

    /// Override the working directory inside the container.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.invocation.working_dir = Some(dir.into());
        self
    }

    /// Use a shared engine client. It is never closed by the command.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ContainerEngine>) -> Self {
        self.client = Some(client);
        self
    }

    /// Take the engine socket and lifecycle timeouts from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.engine_socket.clone_from(&config.engine_socket);
        self.timeouts = config.lifecycle.timeouts();
        self
    }

    /// Bind the command to a caller cancellation scope.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set the shutdown trigger; by default none fires.
    #[must_use]
    pub fn with_shutdown_trigger(mut self, trigger: ShutdownTrigger) -> Self {
        self.shutdown = trigger;
        self
    }

    /// Override the lifecycle timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: LifecycleTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Feed `reader` to the container's stdin.
    ///
    /// Once [`Self::stdin_pipe`] has been taken the reader is dropped and
    /// start fails with `UsageError::StdinAlreadySet`.
    #[must_use]
    pub fn with_stdin(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let state = self.state_mut();
        if state.stdin_piped {
            state.record_conflict(UsageError::StdinAlreadySet);
        } else {
            state.stdin = Some(Box::new(reader));
        }
        self
    }

    /// Copy the container's stdout into `writer`.
    ///
    /// Replaces an earlier writer. A stdout pipe is never replaced: start
    /// fails with `UsageError::StdoutAlreadySet` instead.
    #[must_use]
    pub fn with_stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let state = self.state_mut();
        if matches!(state.stdout, Some(Sink::Pipe(_))) {
            state.record_conflict(UsageError::StdoutAlreadySet);
        } else {
            state.stdout = Some(Sink::Writer(Box::new(writer)));
        }
        self
    }

    /// Copy the container's stderr into `writer`.
    ///
    /// Same rules as [`Self::with_stdout`].
    #[must_use]
    pub fn with_stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let state = self.state_mut();
        if matches!(state.stderr, Some(Sink::Pipe(_))) {
            state.record_conflict(UsageError::StderrAlreadySet);
        } else {
            state.stderr = Some(Sink::Writer(Box::new(writer)));
        }
        self
    }

    /// Return a reader connected to the container's stdout.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::PipeAfterStart` once the command has started and
    /// `UsageError::StdoutAlreadySet` when stdout is already wired.
    pub fn stdout_pipe(&mut self) -> Result<PipeReader> {
        let state = self.state_mut();
        ensure_unstarted(state, "stdout")?;
        if state.stdout.is_some() {
            return Err(UsageError::StdoutAlreadySet.into());
        }
        let (writer, reader) = pipe::pipe();
        state.stdout = Some(Sink::Pipe(writer));
        Ok(reader)
    }

    /// Return a reader connected to the container's stderr.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::PipeAfterStart` once the command has started and
    /// `UsageError::StderrAlreadySet` when stderr is already wired.
    pub fn stderr_pipe(&mut self) -> Result<PipeReader> {
        let state = self.state_mut();
        ensure_unstarted(state, "stderr")?;
        if state.stderr.is_some() {
            return Err(UsageError::StderrAlreadySet.into());
        }
        let (writer, reader) = pipe::pipe();
        state.stderr = Some(Sink::Pipe(writer));
        Ok(reader)
    }

    /// Return a writer connected to the container's stdin.
    ///
    /// Shutting the writer down or dropping it closes the container's stdin.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::PipeAfterStart` once the command has started and
    /// `UsageError::StdinAlreadySet` when stdin is already wired.
    pub fn stdin_pipe(&mut self) -> Result<PipeWriter> {
        let state = self.state_mut();
        ensure_unstarted(state, "stdin")?;
        if state.stdin.is_some() {
            return Err(UsageError::StdinAlreadySet.into());
        }
        let (writer, reader) = pipe::pipe();
        state.stdin = Some(Box::new(reader));
        state.stdin_piped = true;
        Ok(writer)
    }

    /// Return the service the command runs.
    #[must_use]
    pub const fn service(&self) -> &Service {
        &self.service
    }

    /// Return the command arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.invocation.args
    }

    /// Return the environment the container would run with: the service
    /// environment with this command's entries merged over it.
    #[must_use]
    pub fn environ(&self) -> Vec<String> {
        merged_environment(self.service.descriptor(), &self.invocation.env)
    }

    /// Start the command and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Self::start_async`] or
    /// [`Self::wait_async`].
    pub async fn run_async(&self) -> Result<()> {
        self.start_async().await?;
        self.wait_async().await
    }

    /// Run the command, returning its stdout.
    ///
    /// When no stderr sink is set, stderr is captured and attached to an
    /// [`ExitError`](crate::error::ExitError).
    pub async fn output_async(&self) -> CapturedOutput {
        let stdout = SharedBuffer::default();
        {
            let mut state = self.lock();
            if state.stdout.is_some() {
                return CapturedOutput::rejected(UsageError::StdoutAlreadySet);
            }
            state.stdout = Some(Sink::Writer(Box::new(stdout.clone())));
            state.capture_stderr = state.stderr.is_none();
        }

        let result = self.run_async().await;
        CapturedOutput {
            bytes: stdout.contents(),
            result,
        }
    }

    /// Run the command, returning stdout and stderr interleaved as received.
    pub async fn combined_output_async(&self) -> CapturedOutput {
        let combined = SharedBuffer::default();
        {
            let mut state = self.lock();
            if state.stdout.is_some() || state.stderr.is_some() {
                return CapturedOutput::rejected(if state.stdout.is_some() {
                    UsageError::StdoutAlreadySet
                } else {
                    UsageError::StderrAlreadySet
                });
            }
            state.stdout = Some(Sink::Writer(Box::new(combined.clone())));
            state.stderr = Some(Sink::Writer(Box::new(combined.clone())));
            state.capture_stderr = true;
        }

        let result = self.run_async().await;
        CapturedOutput {
            bytes: combined.contents(),
            result,
        }
    }

    /// Run the command on `runtime`, blocking the current thread.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::run_async`].
    pub fn run(&self, runtime: &tokio::runtime::Handle) -> Result<()> {
        runtime.block_on(self.run_async())
    }

    /// Capture stdout on `runtime`, blocking the current thread.
    pub fn output(&self, runtime: &tokio::runtime::Handle) -> CapturedOutput {
        runtime.block_on(self.output_async())
    }

    /// Capture combined output on `runtime`, blocking the current thread.
    pub fn combined_output(&self, runtime: &tokio::runtime::Handle) -> CapturedOutput {
        runtime.block_on(self.combined_output_async())
    }

    pub(crate) fn phase(&self) -> Phase {
        self.lock().phase
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut State {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_unstarted(state: &State, stream: &'static str) -> Result<()> {
    if state.phase == Phase::Unstarted {
        Ok(())
    } else {
        Err(ComposeError::from(UsageError::PipeAfterStart { stream }))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invocation.args.is_empty() {
            return f.write_str("<default>");
        }
        for (index, arg) in self.invocation.args.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            if needs_quoting(arg) {
                write!(f, "{arg:?}")?;
            } else {
                f.write_str(arg)?;
            }
        }
        Ok(())
    }
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\')
}
