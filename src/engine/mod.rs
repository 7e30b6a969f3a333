//! Container engine connection, operation contract and payload translation.
//!
//! The engine endpoint is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `COMPOSE_EXEC_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)
//!
//! Commands talk to the engine only through [`ContainerEngine`], which
//! `bollard::Docker` implements.

mod client;
mod connection;
pub mod translate;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{
    AttachedStreams, ContainerEngine, ContainerRef, ContainerStateSnapshot, EngineFuture,
    InputSink, NetworkRef, OutputStream, WaitStatus,
};
pub use connection::{EngineConnector, SocketResolver};
pub(crate) use connection::{is_already_exists, is_not_found};
