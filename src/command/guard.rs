//! Teardown of a created container.
//!
//! Every exit path funnels through [`ContainerGuard`]: it issues at most one
//! forced removal, and removes the container in the background if it is
//! dropped before that happened. Cleanup calls run outside any cancellation
//! scope and swallow their own failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::scope::LifecycleTimeouts;
use crate::engine::{ContainerEngine, ContainerStateSnapshot, is_not_found};
use crate::error::EngineError;

const KILL_SIGNAL: &str = "SIGKILL";

/// Owns the right to remove one container.
pub(crate) struct ContainerGuard {
    client: Arc<dyn ContainerEngine>,
    id: String,
    timeouts: LifecycleTimeouts,
    removed: AtomicBool,
}

impl std::fmt::Debug for ContainerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerGuard")
            .field("id", &self.id)
            .field("removed", &self.removed)
            .finish_non_exhaustive()
    }
}

impl ContainerGuard {
    pub(crate) fn new(
        client: Arc<dyn ContainerEngine>,
        id: String,
        timeouts: LifecycleTimeouts,
    ) -> Self {
        Self {
            client,
            id,
            timeouts,
            removed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) const fn client(&self) -> &Arc<dyn ContainerEngine> {
        &self.client
    }

    /// Ask the container to stop; kill it if the stop request fails.
    pub(crate) async fn stop_then_kill(&self) {
        info!(container_id = %self.id, "stopping container");
        let stop = self
            .client
            .stop_container(&self.id, self.timeouts.stop_grace_secs());
        let stop_error = match timeout(self.timeouts.stop_deadline(), stop).await {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error.to_string(),
            Err(_) => String::from("timed out"),
        };

        warn!(container_id = %self.id, error = %stop_error, "stop failed; killing container");
        match timeout(
            self.timeouts.kill,
            self.client.kill_container(&self.id, KILL_SIGNAL),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(container_id = %self.id, %error, "kill failed"),
            Err(_) => warn!(container_id = %self.id, "kill timed out"),
        }
    }

    /// Inspect the container for diagnostics, giving up quietly.
    pub(crate) async fn inspect(&self) -> Option<ContainerStateSnapshot> {
        match timeout(
            self.timeouts.inspect,
            self.client.inspect_container(&self.id),
        )
        .await
        {
            Ok(Ok(state)) => Some(state),
            Ok(Err(error)) => {
                debug!(container_id = %self.id, %error, "final inspect failed");
                None
            }
            Err(_) => {
                debug!(container_id = %self.id, "final inspect timed out");
                None
            }
        }
    }

    /// Force-remove the container. Only the first call reaches the engine.
    pub(crate) async fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        remove_with_timeout(self.client.as_ref(), &self.id, self.timeouts.remove).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(container_id = %self.id, "no runtime to remove abandoned container");
            return;
        };
        let client = Arc::clone(&self.client);
        let id = std::mem::take(&mut self.id);
        let limit = self.timeouts.remove;
        debug!(container_id = %id, "removing abandoned container in the background");
        drop(runtime.spawn(async move {
            remove_with_timeout(client.as_ref(), &id, limit).await;
        }));
    }
}

async fn remove_with_timeout(client: &dyn ContainerEngine, id: &str, limit: Duration) {
    match timeout(limit, client.remove_container(id)).await {
        Ok(Ok(())) => debug!(container_id = %id, "container removed"),
        Ok(Err(error)) if is_not_found(&error) => {
            debug!(container_id = %id, "container already removed");
        }
        Ok(Err(error)) => {
            let failure = EngineError::RemoveFailed {
                container_id: String::from(id),
                message: error.to_string(),
            };
            warn!(error = %failure, "container removal failed");
        }
        Err(_) => warn!(container_id = %id, "container removal timed out"),
    }
}
