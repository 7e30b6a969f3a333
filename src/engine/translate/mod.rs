//! Translation of service descriptors into engine payloads.
//!
//! [`ContainerSpec::build`] is the container configuration builder: it
//! validates the descriptor and assembles the full create request from the
//! service and the per-invocation overrides. The submodules translate
//! mounts, networks and volumes, and hold the idempotent ensure-exists
//! operations run before the container is created.

mod host;
mod mounts;
mod networks;
mod volumes;

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, HealthConfig, HostConfig, PortBinding};
use bollard::query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder};

pub use host::{apply_resources, apply_security, resolve_security_opt};
pub use mounts::service_mounts;
pub use networks::{NetworkTarget, ensure_networks, network_targets, networking_config};
pub use volumes::ensure_volumes;

use crate::error::{Result, UsageError};
use crate::project::{
    HealthcheckSpec, PortMapping, Service, ServiceDescriptor, container_name, merge_env,
};

/// Label carrying the project name on containers, networks and volumes.
pub const LABEL_PROJECT: &str = "com.docker.compose.project";

/// Label carrying the service name on containers.
pub const LABEL_SERVICE: &str = "com.docker.compose.service";

/// Label carrying the project-local key on networks.
pub const LABEL_NETWORK: &str = "com.docker.compose.network";

/// Label carrying the project-local key on volumes.
pub const LABEL_VOLUME: &str = "com.docker.compose.volume";

const DEFAULT_PROTOCOL: &str = "tcp";
const HEALTHCHECK_DISABLED: &str = "NONE";
const NANOS_PER_MILLI: u64 = 1_000_000;

/// Per-invocation overrides layered over a service descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Command arguments; empty means the service or image default.
    pub args: Vec<String>,
    /// Environment overrides in `KEY=value` or `KEY` form.
    pub env: Vec<String>,
    /// Working directory override.
    pub working_dir: Option<String>,
    /// Whether the container's stdin is attached.
    pub stdin: bool,
}

/// A fully resolved container create request.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Generated unique container name.
    pub name: String,
    /// Validated image reference.
    pub image: String,
    /// Create payload including host and networking configuration.
    pub body: ContainerCreateBody,
    /// Networks the container joins, to be ensured before creation.
    pub networks: Vec<NetworkTarget>,
}

impl ContainerSpec {
    /// Resolve the create request for `service` under `invocation`.
    ///
    /// No engine call is made; the only I/O is reading seccomp profile
    /// files referenced by `security_opt`.
    ///
    /// # Errors
    ///
    /// Returns usage errors for a build section, a missing image or an
    /// invalid volume declaration, and `EngineError::SeccompProfile` when a
    /// profile cannot be read.
    pub fn build(service: &Service, invocation: &Invocation) -> Result<Self> {
        let descriptor = service.descriptor();
        let context = service.context();
        let image = String::from(validate_service(descriptor)?);

        let mut host = HostConfig {
            init: Some(descriptor.init.unwrap_or(true)),
            ..HostConfig::default()
        };
        let mounts = service_mounts(descriptor, context)?;
        if !mounts.is_empty() {
            host.mounts = Some(mounts);
        }
        let (exposed_ports, port_bindings) = port_config(&descriptor.ports);
        host.port_bindings = port_bindings;
        apply_security(&mut host, descriptor, context)?;
        apply_resources(&mut host, descriptor);
        host.network_mode = descriptor
            .network_mode
            .as_deref()
            .map(str::trim)
            .filter(|mode| !mode.is_empty())
            .map(String::from);

        let networks = network_targets(descriptor, context);
        let working_dir = invocation
            .working_dir
            .as_deref()
            .or(descriptor.working_dir.as_deref())
            .filter(|dir| !dir.is_empty())
            .map(String::from);
        let cmd = if invocation.args.is_empty() {
            (!descriptor.command.is_empty()).then(|| descriptor.command.clone())
        } else {
            Some(invocation.args.clone())
        };
        let env = merged_environment(descriptor, &invocation.env);

        let body = ContainerCreateBody {
            image: Some(image.clone()),
            cmd,
            entrypoint: (!descriptor.entrypoint.is_empty())
                .then(|| descriptor.entrypoint.clone()),
            env: (!env.is_empty()).then_some(env),
            labels: Some(container_labels(service)),
            working_dir,
            user: descriptor
                .user
                .as_deref()
                .map(str::trim)
                .filter(|user| !user.is_empty())
                .map(String::from),
            exposed_ports,
            healthcheck: descriptor.healthcheck.as_ref().map(health_config),
            tty: Some(false),
            attach_stdin: Some(invocation.stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(invocation.stdin),
            stdin_once: Some(invocation.stdin),
            host_config: Some(host),
            networking_config: networking_config(service.name(), &networks),
            ..ContainerCreateBody::default()
        };

        Ok(Self {
            name: container_name(service.name()),
            image,
            body,
            networks,
        })
    }

    /// Options naming the container on creation.
    #[must_use]
    pub fn create_options(&self) -> CreateContainerOptions {
        CreateContainerOptionsBuilder::new().name(&self.name).build()
    }
}

/// Reject descriptors that cannot be run and return the image reference.
///
/// # Errors
///
/// Returns `UsageError::BuildUnsupported` when a build section is present
/// and `UsageError::MissingImage` when no image is set.
pub fn validate_service(descriptor: &ServiceDescriptor) -> Result<&str> {
    if descriptor.build.is_some() {
        return Err(UsageError::BuildUnsupported.into());
    }
    descriptor
        .image_ref()
        .ok_or_else(|| UsageError::MissingImage.into())
}

/// Service environment with `overrides` merged over it.
#[must_use]
pub fn merged_environment(descriptor: &ServiceDescriptor, overrides: &[String]) -> Vec<String> {
    merge_env(&descriptor.environment.to_list(), overrides)
}

fn container_labels(service: &Service) -> HashMap<String, String> {
    let mut labels: HashMap<String, String> = service
        .descriptor()
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let project = service.context().name.trim();
    if !project.is_empty() {
        labels.insert(String::from(LABEL_PROJECT), String::from(project));
    }
    let name = service.name().trim();
    if !name.is_empty() {
        labels.insert(String::from(LABEL_SERVICE), String::from(name));
    }
    labels
}

type ExposedPorts = HashMap<String, HashMap<(), ()>>;
type PortBindings = HashMap<String, Option<Vec<PortBinding>>>;

/// Every declared port is exposed; only ports with a published host port
/// are bound.
fn port_config(ports: &[PortMapping]) -> (Option<ExposedPorts>, Option<PortBindings>) {
    if ports.is_empty() {
        return (None, None);
    }

    let mut exposed = ExposedPorts::new();
    let mut bindings = PortBindings::new();
    for port in ports {
        let protocol = port
            .protocol
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROTOCOL);
        let key = format!("{}/{protocol}", port.target);
        exposed.insert(key.clone(), HashMap::new());

        let Some(published) = port.published.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        bindings
            .entry(key)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: Some(String::from(published)),
            });
    }

    (Some(exposed), (!bindings.is_empty()).then_some(bindings))
}

/// Translate a health check, expressing durations in nanoseconds.
fn health_config(spec: &HealthcheckSpec) -> HealthConfig {
    if spec.disable {
        return HealthConfig {
            test: Some(vec![String::from(HEALTHCHECK_DISABLED)]),
            ..HealthConfig::default()
        };
    }

    HealthConfig {
        test: (!spec.test.is_empty()).then(|| spec.test.clone()),
        interval: spec.interval_ms.map(millis_to_nanos),
        timeout: spec.timeout_ms.map(millis_to_nanos),
        start_period: spec.start_period_ms.map(millis_to_nanos),
        start_interval: spec.start_interval_ms.map(millis_to_nanos),
        retries: spec
            .retries
            .map(|retries| i64::try_from(retries).unwrap_or(i64::MAX)),
        ..HealthConfig::default()
    }
}

fn millis_to_nanos(millis: u64) -> i64 {
    i64::try_from(millis.saturating_mul(NANOS_PER_MILLI)).unwrap_or(i64::MAX)
}
