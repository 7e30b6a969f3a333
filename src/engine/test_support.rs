//! `mockall` double of [`ContainerEngine`] shared by unit tests.

use std::collections::HashMap;

use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, NetworkCreateRequest, VolumeCreateOptions};
use bollard::query_parameters::CreateContainerOptions;
use mockall::mock;

use super::{
    AttachedStreams, ContainerEngine, ContainerRef, ContainerStateSnapshot, EngineFuture,
    NetworkRef, WaitStatus,
};

mock! {
    #[derive(Debug)]
    pub Engine {}

    impl ContainerEngine for Engine {
        fn inspect_image(&self, image: &str) -> EngineFuture<'_, ()>;
        fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;
        fn list_networks(
            &self,
            filters: HashMap<String, Vec<String>>,
        ) -> EngineFuture<'_, Vec<NetworkRef>>;
        fn create_network(&self, request: NetworkCreateRequest) -> EngineFuture<'_, ()>;
        fn remove_network(&self, network: &str) -> EngineFuture<'_, ()>;
        fn create_volume(&self, request: VolumeCreateOptions) -> EngineFuture<'_, ()>;
        fn create_container(
            &self,
            options: Option<CreateContainerOptions>,
            body: ContainerCreateBody,
        ) -> EngineFuture<'_, String>;
        fn attach_container(
            &self,
            container_id: &str,
            stdin: bool,
        ) -> EngineFuture<'_, AttachedStreams>;
        fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
        fn wait_container(&self, container_id: &str) -> EngineFuture<'_, WaitStatus>;
        fn inspect_container(
            &self,
            container_id: &str,
        ) -> EngineFuture<'_, ContainerStateSnapshot>;
        fn stop_container(&self, container_id: &str, grace_secs: i32) -> EngineFuture<'_, ()>;
        fn kill_container(&self, container_id: &str, signal: &str) -> EngineFuture<'_, ()>;
        fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
        fn list_containers(
            &self,
            filters: HashMap<String, Vec<String>>,
        ) -> EngineFuture<'_, Vec<ContainerRef>>;
    }
}

/// A boxed future resolving to `value`.
pub(crate) fn ready<T: Send + 'static>(value: Result<T, BollardError>) -> EngineFuture<'static, T> {
    Box::pin(async move { value })
}

/// An engine API error with the given status code.
pub(crate) fn server_error(status_code: u16, message: &str) -> BollardError {
    BollardError::DockerResponseServerError {
        status_code,
        message: String::from(message),
    }
}
