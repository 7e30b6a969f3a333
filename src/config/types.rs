//! Configuration data types for compose-exec.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::command::LifecycleTimeouts;

/// Lifecycle timing configuration.
///
/// Cleanup calls (stop, kill, remove, final inspect) run on their own
/// bounded timeouts so a cancelled caller never blocks teardown.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds the engine waits after a stop request before killing.
    pub stop_grace_secs: u64,

    /// Seconds allowed for a kill request.
    pub kill_timeout_secs: u64,

    /// Seconds allowed for the final container removal.
    pub remove_timeout_secs: u64,

    /// Seconds allowed for the diagnostic inspect after an abnormal exit.
    pub inspect_timeout_secs: u64,

    /// Milliseconds to wait for the stdin copier after the container exits.
    pub stdin_drain_timeout_ms: u64,

    /// Milliseconds between health polls.
    pub health_poll_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: 2,
            kill_timeout_secs: 2,
            remove_timeout_secs: 5,
            inspect_timeout_secs: 2,
            stdin_drain_timeout_ms: 1000,
            health_poll_interval_ms: 500,
        }
    }
}

impl LifecycleConfig {
    /// Convert to the durations a command runs with.
    #[must_use]
    pub const fn timeouts(&self) -> LifecycleTimeouts {
        LifecycleTimeouts {
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            kill: Duration::from_secs(self.kill_timeout_secs),
            remove: Duration::from_secs(self.remove_timeout_secs),
            inspect: Duration::from_secs(self.inspect_timeout_secs),
            stdin_drain: Duration::from_millis(self.stdin_drain_timeout_ms),
            health_poll: Duration::from_millis(self.health_poll_interval_ms),
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `COMPOSE_EXEC_CONFIG_PATH` environment variable
/// 2. `.compose-exec.toml` in the current working directory
/// 3. `.compose-exec.toml` in the home directory
/// 4. `~/.config/compose-exec/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "COMPOSE_EXEC",
    post_merge_hook,
    discovery(
        app_name = "compose-exec",
        env_var = "COMPOSE_EXEC_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".compose-exec.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Path to the project document; discovered in the working directory
    /// when unset.
    #[ortho_config(skip_cli)]
    pub project_file: Option<Utf8PathBuf>,

    /// Lifecycle timing configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub lifecycle: LifecycleConfig,
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        if self
            .engine_socket
            .as_deref()
            .is_some_and(|socket| socket.trim().is_empty())
        {
            self.engine_socket = None;
        }
        if self
            .project_file
            .as_ref()
            .is_some_and(|path| path.as_str().trim().is_empty())
        {
            self.project_file = None;
        }
        Ok(())
    }
}
