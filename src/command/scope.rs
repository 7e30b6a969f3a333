//! Cancellation scopes and the lifecycle timeouts that bound cleanup.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LifecycleConfig;

/// Bounds applied to engine calls made on the cleanup path.
///
/// These calls run outside the caller's cancellation scope, so each carries
/// its own timeout instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimeouts {
    /// Grace period the engine gives the container before killing it.
    pub stop_grace: Duration,
    /// Timeout for the kill request sent when stopping fails.
    pub kill: Duration,
    /// Timeout for the forced removal.
    pub remove: Duration,
    /// Timeout for the diagnostic inspect after an abnormal exit.
    pub inspect: Duration,
    /// How long Wait lets the stdin copier finish after the container exits.
    pub stdin_drain: Duration,
    /// Interval between health polls.
    pub health_poll: Duration,
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        LifecycleConfig::default().timeouts()
    }
}

impl LifecycleTimeouts {
    /// Stop grace in whole seconds, as the engine expects it.
    pub(crate) fn stop_grace_secs(&self) -> i32 {
        i32::try_from(self.stop_grace.as_secs()).unwrap_or(i32::MAX)
    }

    /// Overall bound on a stop request: the grace period plus one second.
    pub(crate) const fn stop_deadline(&self) -> Duration {
        self.stop_grace.saturating_add(Duration::from_secs(1))
    }
}

type TriggerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// External shutdown source that cancels a running command.
///
/// The default never fires. Binaries that own the process opt into
/// [`Self::os_signals`]; embedders supply their own trigger, for example a
/// shared [`CancellationToken`].
#[derive(Clone)]
pub struct ShutdownTrigger {
    make: Arc<dyn Fn() -> TriggerFuture + Send + Sync>,
}

impl fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownTrigger").finish_non_exhaustive()
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::never()
    }
}

impl ShutdownTrigger {
    /// Fire on SIGINT, or SIGTERM on Unix.
    ///
    /// Tokio installs process-wide handlers the first time a command starts
    /// under this trigger, and they stay installed for the life of the
    /// process, replacing the default termination behaviour.
    #[must_use]
    pub fn os_signals() -> Self {
        Self::from_fn(os_shutdown_signal)
    }

    /// Never fire.
    #[must_use]
    pub fn never() -> Self {
        Self::from_fn(std::future::pending::<()>)
    }

    /// Fire when `token` is cancelled.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self::from_fn(move || {
            let shared = token.clone();
            async move { shared.cancelled().await }
        })
    }

    /// Fire when the future produced by `make` completes.
    ///
    /// `make` is called once per started command.
    pub fn from_fn<F, Fut>(make: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            make: Arc::new(move || Box::pin(make())),
        }
    }

    fn wait(&self) -> TriggerFuture {
        (self.make)()
    }
}

async fn os_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let terminate = async {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(error) => {
                    warn!(%error, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            () = interrupt() => {}
            () = terminate => {}
        }
    }

    #[cfg(not(unix))]
    interrupt().await;
}

async fn interrupt() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}

/// A child of the caller's scope that also reacts to a shutdown trigger.
///
/// Dropping it stops listening for the trigger.
#[derive(Debug)]
pub(crate) struct DerivedScope {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl DerivedScope {
    pub(crate) fn new(caller: &CancellationToken, trigger: &ShutdownTrigger) -> Self {
        let token = caller.child_token();
        let fired = trigger.wait();
        let watched = token.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                () = fired => {
                    debug!("shutdown trigger fired");
                    watched.cancel();
                }
                () = watched.cancelled() => {}
            }
        });
        Self { token, watcher }
    }

    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for DerivedScope {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[rstest]
    fn default_timeouts_follow_lifecycle_defaults() {
        let timeouts = LifecycleTimeouts::default();
        assert_eq!(timeouts.stop_grace_secs(), 2);
        assert_eq!(timeouts.stop_deadline(), Duration::from_secs(3));
    }

    #[rstest]
    fn oversized_grace_saturates() {
        let timeouts = LifecycleTimeouts {
            stop_grace: Duration::from_secs(u64::MAX),
            ..LifecycleTimeouts::default()
        };
        assert_eq!(timeouts.stop_grace_secs(), i32::MAX);
        assert_eq!(timeouts.stop_deadline(), Duration::MAX);
    }

    #[fixture]
    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().expect("runtime should build")
    }

    #[rstest]
    fn trigger_cancels_derived_scope_but_not_caller(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let caller = CancellationToken::new();
            let shutdown = CancellationToken::new();
            let scope =
                DerivedScope::new(&caller, &ShutdownTrigger::from_token(shutdown.clone()));

            shutdown.cancel();
            scope.token().cancelled().await;

            assert!(!caller.is_cancelled());
        });
    }

    #[rstest]
    fn default_trigger_never_fires(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let fired =
                tokio::time::timeout(Duration::from_millis(50), ShutdownTrigger::default().wait())
                    .await;

            assert!(fired.is_err(), "default trigger should stay pending");
        });
    }

    #[rstest]
    fn caller_cancellation_reaches_derived_scope(runtime: tokio::runtime::Runtime) {
        runtime.block_on(async {
            let caller = CancellationToken::new();
            let scope = DerivedScope::new(&caller, &ShutdownTrigger::never());

            caller.cancel();

            assert!(scope.token().is_cancelled());
        });
    }
}
