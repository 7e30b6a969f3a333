//! Network attachment resolution and idempotent network creation.

use std::collections::HashMap;

use bollard::models::{
    EndpointIpamConfig, EndpointSettings, NetworkCreateRequest, NetworkingConfig,
};
use tracing::{debug, info};

use super::{LABEL_NETWORK, LABEL_PROJECT};
use crate::engine::ContainerEngine;
use crate::engine::connection::is_already_exists;
use crate::error::{ComposeError, EngineError, Result};
use crate::project::{DEFAULT_NETWORK_KEY, NetworkAttachment, ProjectContext, ServiceDescriptor};

/// A network a service container is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkTarget {
    /// Project-local network key.
    pub key: String,
    /// Qualified engine-side network name.
    pub name: String,
    /// Per-service endpoint settings.
    pub attachment: NetworkAttachment,
}

/// Resolve the networks `descriptor` attaches to.
///
/// Returns nothing when the service pins a network mode or the project is
/// unnamed. A service without declared networks joins the project's
/// `default` network.
#[must_use]
pub fn network_targets(
    descriptor: &ServiceDescriptor,
    context: &ProjectContext,
) -> Vec<NetworkTarget> {
    let pinned = descriptor
        .network_mode
        .as_deref()
        .is_some_and(|mode| !mode.trim().is_empty());
    if pinned || context.name.trim().is_empty() {
        return Vec::new();
    }

    if descriptor.networks.is_empty() {
        return vec![NetworkTarget {
            key: String::from(DEFAULT_NETWORK_KEY),
            name: context.network_name(DEFAULT_NETWORK_KEY),
            attachment: NetworkAttachment::default(),
        }];
    }

    descriptor
        .networks
        .iter()
        .map(|(key, attachment)| NetworkTarget {
            key: key.clone(),
            name: context.network_name(key),
            attachment: attachment.clone(),
        })
        .collect()
}

/// Build endpoint settings for `targets`, aliasing the container as
/// `service_name` on every network.
#[must_use]
pub fn networking_config(
    service_name: &str,
    targets: &[NetworkTarget],
) -> Option<NetworkingConfig> {
    if targets.is_empty() {
        return None;
    }

    let endpoints = targets
        .iter()
        .map(|target| {
            (
                target.name.clone(),
                endpoint_settings(service_name, &target.attachment),
            )
        })
        .collect::<HashMap<_, _>>();

    Some(NetworkingConfig {
        endpoints_config: Some(endpoints),
    })
}

fn endpoint_settings(service_name: &str, attachment: &NetworkAttachment) -> EndpointSettings {
    let mut aliases = Vec::with_capacity(attachment.aliases.len() + 1);
    if !service_name.is_empty() {
        aliases.push(String::from(service_name));
    }
    for alias in &attachment.aliases {
        if !aliases.contains(alias) {
            aliases.push(alias.clone());
        }
    }

    let ipam_config = (attachment.ipv4_address.is_some() || attachment.ipv6_address.is_some())
        .then(|| EndpointIpamConfig {
            ipv4_address: attachment.ipv4_address.clone(),
            ipv6_address: attachment.ipv6_address.clone(),
            ..EndpointIpamConfig::default()
        });

    EndpointSettings {
        aliases: Some(aliases),
        driver_opts: (!attachment.driver_opts.is_empty()).then(|| {
            attachment
                .driver_opts
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }),
        ipam_config,
        ..EndpointSettings::default()
    }
}

/// Create every non-external network in `targets` that does not exist yet.
///
/// A concurrent creation reported as "already exists" counts as success.
/// External networks are never created; a missing one surfaces when the
/// container is created.
///
/// # Errors
///
/// Returns `EngineError::NetworkCreateFailed` when listing or creating a
/// network fails.
pub async fn ensure_networks(
    engine: &dyn ContainerEngine,
    context: &ProjectContext,
    targets: &[NetworkTarget],
) -> Result<()> {
    for target in targets {
        let decl = context.networks.get(&target.key);
        if decl.is_some_and(|d| d.external) {
            debug!(network = %target.name, "skipping external network");
            continue;
        }

        let filters = HashMap::from([(String::from("name"), vec![target.name.clone()])]);
        let existing = engine
            .list_networks(filters)
            .await
            .map_err(|error| network_failed(&target.name, &error))?;
        // The name filter matches substrings.
        if existing.iter().any(|network| network.name == target.name) {
            continue;
        }

        let mut labels = decl
            .map(|d| d.labels.clone().into_iter().collect::<HashMap<_, _>>())
            .unwrap_or_default();
        labels.insert(String::from(LABEL_PROJECT), context.name.clone());
        labels.insert(String::from(LABEL_NETWORK), target.key.clone());

        let request = NetworkCreateRequest {
            name: target.name.clone(),
            driver: decl.and_then(|d| d.driver.clone()),
            options: decl
                .filter(|d| !d.driver_opts.is_empty())
                .map(|d| d.driver_opts.clone().into_iter().collect()),
            labels: Some(labels),
            ..NetworkCreateRequest::default()
        };

        match engine.create_network(request).await {
            Ok(()) => info!(network = %target.name, "created network"),
            Err(error) if is_already_exists(&error) => {
                debug!(network = %target.name, "network created concurrently");
            }
            Err(error) => return Err(network_failed(&target.name, &error)),
        }
    }
    Ok(())
}

fn network_failed(name: &str, error: &bollard::errors::Error) -> ComposeError {
    EngineError::NetworkCreateFailed {
        name: String::from(name),
        message: error.to_string(),
    }
    .into()
}
