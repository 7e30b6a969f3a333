//! Configuration loading with layered precedence.
//!
//! This module provides functions to load configuration with the precedence order
//! (lowest to highest): application defaults, configuration file, environment
//! variables, command-line arguments.
//!
//! Layers are composed by hand with `MergeComposer` rather than through the
//! derive's `load()`: the clap [`Cli`] owns subcommand dispatch, `--config`
//! must be honoured before discovery, and typed environment values must fail
//! loudly instead of being dropped.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.,
//! `COMPOSE_EXEC_LIFECYCLE_STOP_GRACE_SECS=soon`) return an error immediately
//! rather than silently falling back to defaults.
//!
//! String fields (e.g., `COMPOSE_EXEC_ENGINE_SOCKET`) are always accepted.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
}

/// One environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `COMPOSE_EXEC_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["lifecycle", "stop_grace_secs"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Environment variables and the JSON paths they populate.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    // Top-level fields
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_PROJECT_FILE",
        path: &["project_file"],
        var_type: EnvVarType::String,
    },
    // Lifecycle fields
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_LIFECYCLE_STOP_GRACE_SECS",
        path: &["lifecycle", "stop_grace_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_LIFECYCLE_KILL_TIMEOUT_SECS",
        path: &["lifecycle", "kill_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_LIFECYCLE_REMOVE_TIMEOUT_SECS",
        path: &["lifecycle", "remove_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_LIFECYCLE_INSPECT_TIMEOUT_SECS",
        path: &["lifecycle", "inspect_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_LIFECYCLE_STDIN_DRAIN_TIMEOUT_MS",
        path: &["lifecycle", "stdin_drain_timeout_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "COMPOSE_EXEC_LIFECYCLE_HEALTH_POLL_INTERVAL_MS",
        path: &["lifecycle", "health_poll_interval_ms"],
        var_type: EnvVarType::U64,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `COMPOSE_EXEC_*` variable the loader reads.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// Opens the parent directory with `cap_std::fs_utf8` and reads from there.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path.parent().unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (discovered via XDG paths or `COMPOSE_EXEC_CONFIG_PATH`)
/// 3. Environment variables prefixed with `COMPOSE_EXEC_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - Malformed configuration files
/// - Invalid typed environment variable values (e.g., a non-integer
///   `COMPOSE_EXEC_LIFECYCLE_KILL_TIMEOUT_SECS`)
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    // Use the CLI-provided path (if it exists), or discover via XDG paths.
    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().filter(|p| p.exists()).or_else(|| {
            let discovery = ConfigDiscovery::builder("compose-exec")
                .env_var("COMPOSE_EXEC_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".compose-exec.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    // Merge all layers into the final configuration.
    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;

    Ok(config)
}

/// Collect the variables listed in [`ENV_VAR_SPECS`] into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable has an
/// unparseable value.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::U64 => match raw_value.parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected unsigned integer, got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["lifecycle", "kill_timeout_secs"]`, this creates the
/// intermediate `lifecycle` object if needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    // Navigate to the parent object, creating intermediate objects as needed.
    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();

    if let Some(ref socket) = cli.engine_socket {
        overrides.insert(
            "engine_socket".to_owned(),
            serde_json::Value::String(socket.clone()),
        );
    }

    if let Some(ref project_file) = cli.project_file {
        overrides.insert(
            "project_file".to_owned(),
            serde_json::Value::String(project_file.to_string()),
        );
    }

    if overrides.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(overrides)
    }
}
