//! Project-level operations for library embedders and the CLI.
//!
//! [`command_for`] builds a [`Command`] from layered configuration and
//! [`down`] tears down everything a project left behind. Neither prints nor
//! exits the process.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::command::Command;
use crate::config::AppConfig;
use crate::engine::ContainerEngine;
use crate::engine::translate::LABEL_PROJECT;
use crate::engine::is_not_found;
use crate::error::{EngineError, Result, UsageError};
use crate::project::Project;

/// Discover the configured project and build a command for `service`.
///
/// The command carries the configured engine socket and lifecycle timeouts.
///
/// # Errors
///
/// Returns `ConfigError` variants when the project document cannot be found
/// or parsed, and `UsageError::ServiceNotFound` for an unknown service.
pub fn command_for<I, S>(config: &AppConfig, service: &str, args: I) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let project = Project::discover(config.project_file.as_deref())?;
    Ok(project.command(service, args)?.with_config(config))
}

/// Remove every container, then every network, labelled with `project_name`.
///
/// Containers are force-removed first so networks are no longer in use.
/// Not-found outcomes count as success, so repeated calls are harmless.
///
/// # Errors
///
/// Returns `UsageError::EmptyProjectName` for a blank name, and
/// `EngineError::DownFailed` listing every step that failed.
pub async fn down(client: &dyn ContainerEngine, project_name: &str) -> Result<()> {
    let name = project_name.trim();
    if name.is_empty() {
        return Err(UsageError::EmptyProjectName.into());
    }

    let containers = client
        .list_containers(project_filter(name))
        .await
        .map_err(|error| EngineError::DownFailed {
            errors: vec![format!("failed to list containers: {error}")],
        })?;

    let mut errors = Vec::new();
    for container in containers {
        match client.remove_container(&container.id).await {
            Ok(()) => info!(container_id = %container.id, "removed container"),
            Err(error) if is_not_found(&error) => {
                debug!(container_id = %container.id, "container already gone");
            }
            Err(error) => errors.push(format!("container {:?}: {error}", container.names)),
        }
    }

    match client.list_networks(project_filter(name)).await {
        Ok(networks) => {
            for network in networks {
                match client.remove_network(&network.id).await {
                    Ok(()) => info!(network = %network.name, "removed network"),
                    Err(error) if is_not_found(&error) => {
                        debug!(network = %network.name, "network already gone");
                    }
                    Err(error) => errors.push(format!("network {}: {error}", network.name)),
                }
            }
        }
        Err(error) => errors.push(format!("failed to list networks: {error}")),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::DownFailed { errors }.into())
    }
}

fn project_filter(project_name: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([(
        String::from("label"),
        vec![format!("{LABEL_PROJECT}={project_name}")],
    )])
}
