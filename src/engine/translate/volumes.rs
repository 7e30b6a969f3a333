//! Idempotent creation of the named volumes a service mounts.

use std::collections::HashMap;

use bollard::models::VolumeCreateOptions;
use tracing::{debug, info};

use super::mounts::named_volume_keys;
use super::{LABEL_PROJECT, LABEL_VOLUME};
use crate::engine::ContainerEngine;
use crate::engine::connection::is_already_exists;
use crate::error::{EngineError, Result};
use crate::project::{ProjectContext, ServiceDescriptor};

/// Create the named volumes `descriptor` mounts.
///
/// Each volume is created under its qualified name with the project and
/// volume-key labels plus the driver settings of its top-level declaration.
/// Volumes declared external are skipped. An "already exists" outcome is
/// success, so concurrent invocations never race each other into an error.
///
/// # Errors
///
/// Returns `EngineError::VolumeCreateFailed` for any other engine failure.
pub async fn ensure_volumes(
    engine: &dyn ContainerEngine,
    descriptor: &ServiceDescriptor,
    context: &ProjectContext,
) -> Result<()> {
    for key in named_volume_keys(descriptor) {
        let decl = context.volumes.get(key);
        if decl.is_some_and(|d| d.external) {
            debug!(volume = key, "skipping external volume");
            continue;
        }

        let name = context.volume_name(key);
        let mut labels = decl
            .map(|d| d.labels.clone().into_iter().collect::<HashMap<_, _>>())
            .unwrap_or_default();
        labels.insert(String::from(LABEL_PROJECT), context.name.clone());
        labels.insert(String::from(LABEL_VOLUME), String::from(key));

        let request = VolumeCreateOptions {
            name: Some(name.clone()),
            driver: decl.and_then(|d| d.driver.clone()),
            driver_opts: decl
                .filter(|d| !d.driver_opts.is_empty())
                .map(|d| d.driver_opts.clone().into_iter().collect()),
            labels: Some(labels),
            ..VolumeCreateOptions::default()
        };

        match engine.create_volume(request).await {
            Ok(()) => info!(volume = %name, "ensured volume"),
            Err(error) if is_already_exists(&error) => {
                debug!(volume = %name, "volume already exists");
            }
            Err(error) => {
                return Err(EngineError::VolumeCreateFailed {
                    name,
                    message: error.to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}
