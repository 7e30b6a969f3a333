//! Health polling for a running container.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::ContainerEngine;
use crate::error::{ComposeError, EngineError, Result};

const HEALTHY: &str = "healthy";
const UNHEALTHY: &str = "unhealthy";

/// Poll `container_id` every `interval` until it reports healthy.
///
/// Fails as soon as the container stops, exposes no health state, turns
/// unhealthy, or `cancel` fires.
pub(crate) async fn poll_until_healthy(
    client: &dyn ContainerEngine,
    container_id: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let state = cancel
            .run_until_cancelled(client.inspect_container(container_id))
            .await
            .ok_or(ComposeError::Cancelled)?
            .map_err(|error| EngineError::InspectFailed {
                container_id: String::from(container_id),
                message: error.to_string(),
            })?;

        if !state.running {
            return Err(EngineError::ContainerStopped {
                status: state.status.unwrap_or_default(),
            }
            .into());
        }
        match state.health.as_deref() {
            None => return Err(EngineError::NoHealthcheck.into()),
            Some(HEALTHY) => return Ok(()),
            Some(UNHEALTHY) => return Err(EngineError::Unhealthy.into()),
            Some(status) => debug!(container_id, status, "waiting for container health"),
        }

        cancel
            .run_until_cancelled(tokio::time::sleep(interval))
            .await
            .ok_or(ComposeError::Cancelled)?;
    }
}
