//! Socket resolution and container engine connection.
//!
//! This module resolves the engine endpoint from configuration, fallback
//! environment variables, or the platform default, and connects through
//! Bollard.

mod error_classification;

use std::time::Duration;

use bollard::Docker;

pub(crate) use error_classification::{is_already_exists, is_not_found};

use crate::error::{ComposeError, EngineError};

/// Environment variable names checked in fallback order after configuration.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Connection timeout in seconds for engine API calls.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Timeout in seconds for the ping performed by health checks.
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Default socket path for Unix platforms.
#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Default socket path for Windows platforms.
#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Resolves engine endpoints from environment variables.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use compose_exec::engine::SocketResolver;
///
/// let env = DefaultEnv::new();
/// let resolver = SocketResolver::new(&env);
/// let socket = resolver.resolve_from_env();
/// ```
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Return the first non-empty value of `DOCKER_HOST`, `CONTAINER_HOST`
    /// or `PODMAN_HOST`.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Returns the platform default socket path.
    #[must_use]
    pub const fn default_socket() -> &'static str {
        DEFAULT_SOCKET
    }
}

/// Classifies socket endpoint types for connection handling.
enum SocketType {
    /// Unix socket or Windows named pipe with explicit scheme.
    Socket,
    /// HTTP, HTTPS, or TCP endpoint (TCP is rewritten to HTTP).
    Http,
    /// Bare path without scheme prefix.
    BarePath,
}

impl SocketType {
    fn classify(socket: &str) -> Self {
        if socket.starts_with("unix://") || socket.starts_with("npipe://") {
            Self::Socket
        } else if socket.starts_with("tcp://")
            || socket.starts_with("http://")
            || socket.starts_with("https://")
        {
            Self::Http
        } else {
            Self::BarePath
        }
    }
}

/// Connects to Docker or Podman engines.
pub struct EngineConnector;

impl EngineConnector {
    /// Connect to the engine at `socket`.
    ///
    /// Accepts `unix://`, `npipe://`, `tcp://` (treated as HTTP), `http://`
    /// and `https://` endpoints, and bare paths. Bare paths starting with
    /// `\\` or `//` are named pipes; all others are Unix sockets.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConnectionFailed` (or a more specific socket
    /// error) when the client cannot be built.
    pub fn connect(socket: &str) -> Result<Docker, ComposeError> {
        let connected = match SocketType::classify(socket) {
            SocketType::Socket => Docker::connect_with_socket(
                socket,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            SocketType::Http => {
                let http_socket = if socket.starts_with("tcp://") {
                    socket.replacen("tcp://", "http://", 1)
                } else {
                    socket.to_owned()
                };
                Docker::connect_with_http(
                    &http_socket,
                    CONNECTION_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
            }
            SocketType::BarePath => Docker::connect_with_socket(
                &Self::normalize_bare_path(socket),
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
        };

        connected.map_err(|error| {
            ComposeError::from(error_classification::classify_connection_error(
                &error, socket,
            ))
        })
    }

    fn normalize_bare_path(path: &str) -> String {
        if path.starts_with("\\\\") || path.starts_with("//") {
            format!("npipe://{path}")
        } else {
            format!("unix://{path}")
        }
    }

    /// Connect using the configured socket, the fallback environment
    /// variables, or the platform default, in that order.
    ///
    /// # Errors
    ///
    /// Returns the error from [`Self::connect`].
    pub fn connect_with_fallback<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, ComposeError> {
        let socket = Self::resolve_socket(config_socket, resolver);
        tracing::debug!(%socket, "connecting to container engine");
        Self::connect(&socket)
    }

    /// Resolve the endpoint without connecting.
    #[must_use]
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> String {
        config_socket
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| resolver.resolve_from_env())
            .unwrap_or_else(|| SocketResolver::<E>::default_socket().to_owned())
    }

    /// Verify the engine answers a ping within the health-check timeout.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::HealthCheckTimeout` when the ping times out and
    /// a classified connection error when it fails.
    pub async fn health_check_async(docker: &Docker, socket: &str) -> Result<(), ComposeError> {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);

        tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| EngineError::HealthCheckTimeout {
                seconds: HEALTH_CHECK_TIMEOUT_SECS,
            })?
            .map_err(|error| {
                let classified = error_classification::classify_connection_error(&error, socket);
                match classified {
                    EngineError::ConnectionFailed { message } => {
                        EngineError::HealthCheckFailed { message }
                    }
                    other => other,
                }
            })?;
        Ok(())
    }

    /// Connect with fallback resolution, then verify the engine responds.
    ///
    /// # Errors
    ///
    /// Returns connection or health-check errors.
    pub async fn connect_with_fallback_and_verify_async<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, ComposeError> {
        let socket = Self::resolve_socket(config_socket, resolver);
        let docker = Self::connect(&socket)?;
        Self::health_check_async(&docker, &socket).await?;
        Ok(docker)
    }
}
