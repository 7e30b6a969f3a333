//! Configuration system for compose-exec.
//!
//! Configuration values are merged from defaults, a TOML file, `COMPOSE_EXEC_*`
//! environment variables and CLI flags, in increasing order of precedence.
//! The file is expected at `~/.config/compose-exec/config.toml` by default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//! project_file = "/srv/shop/compose.toml"
//!
//! [lifecycle]
//! stop_grace_secs = 5
//! remove_timeout_secs = 10
//! health_poll_interval_ms = 250
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, DownArgs, RunArgs};
pub use loader::{env_var_names, load_config};
pub use types::{AppConfig, LifecycleConfig};
