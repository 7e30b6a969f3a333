//! Container-engine operation contract.
//!
//! [`ContainerEngine`] is the narrow set of engine calls the command
//! lifecycle needs. Each call returns a boxed future so the trait stays
//! object-safe: commands hold an `Arc<dyn ContainerEngine>` that can be shared
//! across many invocations or owned by one. `bollard::Docker` implements it
//! directly; tests substitute `mockall` doubles.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::{Pin, pin};

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, NetworkCreateRequest, VolumeCreateOptions};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptions, CreateImageOptionsBuilder,
    InspectContainerOptions, KillContainerOptionsBuilder, ListContainersOptionsBuilder,
    ListNetworksOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder, WaitContainerOptionsBuilder,
};
use futures_util::{Stream, StreamExt, TryStreamExt};
use tokio::io::AsyncWrite;

/// Boxed future returned by every [`ContainerEngine`] operation.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BollardError>> + Send + 'a>>;

/// Demultiplexed output frames from an attached container.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<LogOutput, BollardError>> + Send>>;

/// Writable half of an attached container's stdin.
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Streams returned by [`ContainerEngine::attach_container`].
pub struct AttachedStreams {
    /// Output frames from the container.
    pub output: OutputStream,
    /// Container stdin.
    pub input: InputSink,
}

impl std::fmt::Debug for AttachedStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedStreams").finish_non_exhaustive()
    }
}

/// Outcome of waiting for a container to stop running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitStatus {
    /// Exit status of the container's main process.
    pub status_code: i64,
    /// Error the engine reported while waiting, if any.
    pub error: Option<String>,
}

/// Subset of inspected container state used for diagnostics and health
/// polling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStateSnapshot {
    /// Engine status, e.g. `running` or `exited`.
    pub status: Option<String>,
    /// Whether the container is running.
    pub running: bool,
    /// Whether the container was killed for running out of memory.
    pub oom_killed: bool,
    /// Main process ID.
    pub pid: Option<i64>,
    /// Exit code of the main process.
    pub exit_code: Option<i64>,
    /// Engine error message.
    pub error: Option<String>,
    /// Health status, e.g. `starting`, `healthy` or `unhealthy`.
    pub health: Option<String>,
}

/// A network returned by [`ContainerEngine::list_networks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkRef {
    /// Network ID.
    pub id: String,
    /// Network name.
    pub name: String,
}

/// A container returned by [`ContainerEngine::list_containers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRef {
    /// Container ID.
    pub id: String,
    /// Container names.
    pub names: Vec<String>,
}

/// Engine operations used to run a service container.
pub trait ContainerEngine: Send + Sync {
    /// Succeed when `image` exists locally.
    fn inspect_image(&self, image: &str) -> EngineFuture<'_, ()>;

    /// Pull `image`, draining and discarding progress.
    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;

    /// List networks matching `filters`.
    fn list_networks(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> EngineFuture<'_, Vec<NetworkRef>>;

    /// Create a network.
    fn create_network(&self, request: NetworkCreateRequest) -> EngineFuture<'_, ()>;

    /// Remove a network by ID or name.
    fn remove_network(&self, network: &str) -> EngineFuture<'_, ()>;

    /// Create a named volume.
    fn create_volume(&self, request: VolumeCreateOptions) -> EngineFuture<'_, ()>;

    /// Create a container and return its ID.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String>;

    /// Attach to the container's stdout and stderr, and stdin when
    /// `stdin` is set. Only output produced after attaching is streamed.
    fn attach_container(&self, container_id: &str, stdin: bool)
    -> EngineFuture<'_, AttachedStreams>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Wait until the container is no longer running.
    fn wait_container(&self, container_id: &str) -> EngineFuture<'_, WaitStatus>;

    /// Inspect container state.
    fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerStateSnapshot>;

    /// Stop a container, waiting up to `grace_secs` before the engine kills it.
    fn stop_container(&self, container_id: &str, grace_secs: i32) -> EngineFuture<'_, ()>;

    /// Send `signal` to the container's main process.
    fn kill_container(&self, container_id: &str, signal: &str) -> EngineFuture<'_, ()>;

    /// Force-remove a container, stopping it first if needed.
    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// List containers (running or not) matching `filters`.
    fn list_containers(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> EngineFuture<'_, Vec<ContainerRef>>;
}

/// Split `repo:tag` into repository and tag, defaulting the tag to `latest`.
///
/// A colon inside a registry host (`host:5000/img`) is not a tag separator,
/// and digests (`img@sha256:...`) are passed through with no tag.
pub(crate) fn split_image_reference(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, Some(tag)),
        _ => (image, Some("latest")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ContainerEngine for Docker {
    fn inspect_image(&self, reference: &str) -> EngineFuture<'_, ()> {
        let image = String::from(reference);
        Box::pin(async move {
            Self::inspect_image(self, &image).await?;
            Ok(())
        })
    }

    fn pull_image(&self, reference: &str) -> EngineFuture<'_, ()> {
        let image = String::from(reference);
        Box::pin(async move {
            let (repo, tag) = split_image_reference(&image);
            let mut builder = CreateImageOptionsBuilder::new().from_image(repo);
            if let Some(version) = tag {
                builder = builder.tag(version);
            }
            Self::create_image(self, Some(builder.build()), None, None)
                .try_collect::<Vec<_>>()
                .await?;
            Ok(())
        })
    }

    fn list_networks(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> EngineFuture<'_, Vec<NetworkRef>> {
        Box::pin(async move {
            let options = ListNetworksOptionsBuilder::new().filters(&filters).build();
            let networks = Self::list_networks(self, Some(options)).await?;
            Ok(networks
                .into_iter()
                .map(|network| NetworkRef {
                    id: network.id.unwrap_or_default(),
                    name: network.name.unwrap_or_default(),
                })
                .collect())
        })
    }

    fn create_network(&self, request: NetworkCreateRequest) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            Self::create_network(self, request).await?;
            Ok(())
        })
    }

    fn remove_network(&self, name: &str) -> EngineFuture<'_, ()> {
        let network = String::from(name);
        Box::pin(async move { Self::remove_network(self, &network).await })
    }

    fn create_volume(&self, request: VolumeCreateOptions) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            Self::create_volume(self, request).await?;
            Ok(())
        })
    }

    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String> {
        Box::pin(async move {
            let response = Self::create_container(self, options, body).await?;
            Ok(response.id)
        })
    }

    fn attach_container(
        &self,
        id: &str,
        stdin: bool,
    ) -> EngineFuture<'_, AttachedStreams> {
        let container_id = String::from(id);
        Box::pin(async move {
            let options = AttachContainerOptionsBuilder::new()
                .stream(true)
                .stdin(stdin)
                .stdout(true)
                .stderr(true)
                .logs(false)
                .build();
            let attached = Self::attach_container(self, &container_id, Some(options)).await?;
            Ok(AttachedStreams {
                output: attached.output,
                input: attached.input,
            })
        })
    }

    fn start_container(&self, id: &str) -> EngineFuture<'_, ()> {
        let container_id = String::from(id);
        Box::pin(async move {
            Self::start_container(self, &container_id, None::<StartContainerOptions>).await
        })
    }

    fn wait_container(&self, id: &str) -> EngineFuture<'_, WaitStatus> {
        let container_id = String::from(id);
        Box::pin(async move {
            let options = WaitContainerOptionsBuilder::new()
                .condition("not-running")
                .build();
            let mut responses = pin!(Self::wait_container(self, &container_id, Some(options)));
            match responses.next().await {
                Some(Ok(response)) => Ok(WaitStatus {
                    status_code: response.status_code,
                    error: response.error.and_then(|error| non_empty(error.message)),
                }),
                // Bollard reports a non-zero exit as an error; it is still an exit.
                Some(Err(BollardError::DockerContainerWaitError { error, code })) => {
                    Ok(WaitStatus {
                        status_code: code,
                        error: non_empty(Some(error)),
                    })
                }
                Some(Err(error)) => Err(error),
                None => Err(BollardError::IOError {
                    err: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "wait stream ended without a response",
                    ),
                }),
            }
        })
    }

    fn inspect_container(&self, id: &str) -> EngineFuture<'_, ContainerStateSnapshot> {
        let container_id = String::from(id);
        Box::pin(async move {
            let response =
                Self::inspect_container(self, &container_id, None::<InspectContainerOptions>)
                    .await?;
            let Some(state) = response.state else {
                return Ok(ContainerStateSnapshot::default());
            };
            Ok(ContainerStateSnapshot {
                status: non_empty(state.status.map(|status| status.to_string())),
                running: state.running.unwrap_or(false),
                oom_killed: state.oom_killed.unwrap_or(false),
                pid: state.pid,
                exit_code: state.exit_code,
                error: non_empty(state.error),
                health: non_empty(
                    state
                        .health
                        .and_then(|health| health.status)
                        .map(|status| status.to_string()),
                ),
            })
        })
    }

    fn stop_container(&self, id: &str, grace_secs: i32) -> EngineFuture<'_, ()> {
        let container_id = String::from(id);
        Box::pin(async move {
            let options = StopContainerOptionsBuilder::new().t(grace_secs).build();
            Self::stop_container(self, &container_id, Some(options)).await
        })
    }

    fn kill_container(&self, id: &str, signal_name: &str) -> EngineFuture<'_, ()> {
        let container_id = String::from(id);
        let signal = String::from(signal_name);
        Box::pin(async move {
            let options = KillContainerOptionsBuilder::new().signal(&signal).build();
            Self::kill_container(self, &container_id, Some(options)).await
        })
    }

    fn remove_container(&self, id: &str) -> EngineFuture<'_, ()> {
        let container_id = String::from(id);
        Box::pin(async move {
            let options = RemoveContainerOptionsBuilder::new().force(true).build();
            Self::remove_container(self, &container_id, Some(options)).await
        })
    }

    fn list_containers(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> EngineFuture<'_, Vec<ContainerRef>> {
        Box::pin(async move {
            let options = ListContainersOptionsBuilder::new()
                .all(true)
                .filters(&filters)
                .build();
            let containers = Self::list_containers(self, Some(options)).await?;
            Ok(containers
                .into_iter()
                .map(|summary| ContainerRef {
                    id: summary.id.unwrap_or_default(),
                    names: summary.names.unwrap_or_default(),
                })
                .collect())
        })
    }
}
