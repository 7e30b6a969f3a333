//! Semantic error types for compose service execution.
//!
//! Errors the caller might branch on are modelled as `thiserror` enums:
//! usage errors are raised before any engine interaction, engine errors wrap
//! the transport failure, and a non-zero container exit is reported as a
//! distinct [`ExitError`] so callers can tell "my command failed" from "the
//! orchestration failed". Opaque `eyre::Report` values are reserved for the
//! binary boundary.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::engine::ContainerStateSnapshot;

/// Maximum number of stderr bytes rendered by [`ExitError`]'s `Display`.
const STDERR_SNIPPET_LEN: usize = 512;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration or project file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the file was expected.
        path: PathBuf,
    },

    /// The configuration or project file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during layer merging.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Precondition violations detected before the engine is contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// `start` was called on a command that has already been started.
    #[error("command already started")]
    AlreadyStarted,

    /// `wait` was called before `start`.
    #[error("command not started")]
    NotStarted,

    /// The command was started but its runtime state is missing or was
    /// already consumed by a previous `wait`.
    #[error("command internal state incomplete")]
    InternalStateIncomplete,

    /// The service asks for an image build, which is never performed.
    #[error("service.build is not supported (use a pre-built image)")]
    BuildUnsupported,

    /// The service has no image reference.
    #[error("service.image is required (build is out of scope)")]
    MissingImage,

    /// A volume declaration uses a type other than bind or volume.
    #[error("unsupported volume type {kind:?} (supported: bind, volume)")]
    UnsupportedVolumeType {
        /// The rejected volume type.
        kind: String,
    },

    /// A bind mount declaration has no source path.
    #[error("bind mount source is required (target {target})")]
    BindSourceRequired {
        /// The mount target inside the container.
        target: String,
    },

    /// A stdout sink or pipe was already configured.
    #[error("stdout already set")]
    StdoutAlreadySet,

    /// A stderr sink or pipe was already configured.
    #[error("stderr already set")]
    StderrAlreadySet,

    /// A stdin source or pipe was already configured.
    #[error("stdin already set")]
    StdinAlreadySet,

    /// A pipe accessor was called after the command started.
    #[error("{stream} pipe requested after start")]
    PipeAfterStart {
        /// The stream name (`stdin`, `stdout` or `stderr`).
        stream: &'static str,
    },

    /// Health polling was requested for a service without a health check.
    #[error("healthcheck is not defined for this service")]
    HealthcheckNotDefined,

    /// The requested service is not part of the project.
    #[error("service {name:?} not found")]
    ServiceNotFound {
        /// The requested service name.
        name: String,
    },

    /// `down` was called without a project name.
    #[error("project name is required")]
    EmptyProjectName,
}

/// Errors reported by, or while talking to, the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The engine did not answer a ping correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the failure.
        message: String,
    },

    /// The engine did not answer a ping in time.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// Inspecting or pulling the service image failed.
    #[error("failed to pull image '{image}': {message}")]
    ImagePullFailed {
        /// The image reference.
        image: String,
        /// A description of the failure.
        message: String,
    },

    /// Listing or creating a project network failed.
    #[error("failed to create network {name:?}: {message}")]
    NetworkCreateFailed {
        /// The qualified network name.
        name: String,
        /// A description of the failure.
        message: String,
    },

    /// Creating a named volume failed.
    #[error("failed to create volume {name:?}: {message}")]
    VolumeCreateFailed {
        /// The qualified volume name.
        name: String,
        /// A description of the failure.
        message: String,
    },

    /// A seccomp profile referenced by `security_opt` could not be read.
    #[error("failed to read seccomp profile '{path}': {message}")]
    SeccompProfile {
        /// The resolved profile path.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// Failed to create a container.
    #[error("failed to create container: {message}")]
    CreateFailed {
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to attach to a container's streams.
    #[error("failed to attach to container '{container_id}': {message}")]
    AttachFailed {
        /// The container ID.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// Failed to start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// The engine reported an error while waiting for the container.
    #[error("failed waiting for container '{container_id}': {message}")]
    WaitFailed {
        /// The container ID.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// Inspecting a container failed.
    #[error("failed to inspect container '{container_id}': {message}")]
    InspectFailed {
        /// The container ID.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// The container stopped while health polling was in progress.
    #[error("container stopped (status={status})")]
    ContainerStopped {
        /// The engine-reported container status.
        status: String,
    },

    /// The running container exposes no health state.
    #[error("container has no healthcheck")]
    NoHealthcheck,

    /// The container reported an unhealthy status.
    #[error("container became unhealthy")]
    Unhealthy,

    /// Removing a container failed.
    #[error("failed to remove container '{container_id}': {message}")]
    RemoveFailed {
        /// The container ID.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// One or more teardown steps of `down` failed.
    #[error("down errors: {}", errors.join("; "))]
    DownFailed {
        /// Each failed teardown step.
        errors: Vec<String>,
    },
}

/// A container exited with a non-zero status.
///
/// This mirrors a process exit status: [`ExitError::exit_code`] returns the
/// code, [`ExitError::stderr`] the bytes captured when output capture was
/// requested, and [`ExitError::container_state`] the best-effort inspected
/// state taken after the abnormal exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitError {
    code: i64,
    stderr: Vec<u8>,
    container_state: Option<ContainerStateSnapshot>,
}

impl ExitError {
    /// Create an exit error for the given status code.
    #[must_use]
    pub const fn new(code: i64) -> Self {
        Self {
            code,
            stderr: Vec::new(),
            container_state: None,
        }
    }

    /// Attach captured stderr bytes.
    #[must_use]
    pub fn with_stderr(mut self, stderr: Vec<u8>) -> Self {
        self.stderr = stderr;
        self
    }

    /// Attach the final inspected container state.
    #[must_use]
    pub fn with_container_state(mut self, state: Option<ContainerStateSnapshot>) -> Self {
        self.container_state = state;
        self
    }

    /// Return the container exit status.
    #[must_use]
    pub const fn exit_code(&self) -> i64 {
        self.code
    }

    /// Return captured stderr, empty when capture was not requested.
    #[must_use]
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Return the final container state, if inspection succeeded.
    #[must_use]
    pub const fn container_state(&self) -> Option<&ContainerStateSnapshot> {
        self.container_state.as_ref()
    }

    /// Return the container's main process ID, or zero when unknown.
    #[must_use]
    pub fn pid(&self) -> i64 {
        self.container_state
            .as_ref()
            .and_then(|state| state.pid)
            .unwrap_or(0)
    }

    /// Return whether the engine reported an out-of-memory kill.
    #[must_use]
    pub fn oom_killed(&self) -> bool {
        self.container_state
            .as_ref()
            .is_some_and(|state| state.oom_killed)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit status {}", self.code)?;
        if self.stderr.is_empty() {
            return Ok(());
        }

        let start = self.stderr.len().saturating_sub(STDERR_SNIPPET_LEN);
        let prefix = if start > 0 { "... " } else { "" };
        let snippet = self.stderr.get(start..).unwrap_or_default();
        write!(f, ": stderr={prefix}{:?}", String::from_utf8_lossy(snippet))
    }
}

impl std::error::Error for ExitError {}

/// Top-level error type for compose service execution.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A precondition was violated.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The container engine reported an error.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The container exited with a non-zero status.
    #[error(transparent)]
    Exit(Box<ExitError>),

    /// The caller's cancellation scope fired; the container has been
    /// stopped and removed on a best-effort basis.
    #[error("operation cancelled")]
    Cancelled,
}

impl ComposeError {
    /// Return the exit error when the container exited non-zero.
    #[must_use]
    pub fn as_exit(&self) -> Option<&ExitError> {
        match self {
            Self::Exit(exit) => Some(exit),
            _ => None,
        }
    }
}

impl From<ExitError> for ComposeError {
    fn from(error: ExitError) -> Self {
        Self::Exit(Box::new(error))
    }
}

/// A specialised `Result` type for compose service execution.
pub type Result<T> = std::result::Result<T, ComposeError>;
