//! Normalized project and service data model.
//!
//! These types describe an already-resolved project document: interpolation
//! has happened upstream, and relative paths stay relative to the project
//! working directory. Only the subset of fields honoured by the container
//! configuration builder is modelled.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::Deserialize;

use super::env::Environment;

/// Resolved definition of one service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceDescriptor {
    /// Image reference used to create the container.
    pub image: Option<String>,

    /// Build section. Its presence is rejected at start time.
    pub build: Option<BuildSpec>,

    /// Default command, used when no per-invocation arguments are given.
    pub command: Vec<String>,

    /// Entrypoint override.
    pub entrypoint: Vec<String>,

    /// Service environment; key-only entries are kept distinct from empty
    /// values.
    pub environment: Environment,

    /// Published and exposed ports.
    pub ports: Vec<PortMapping>,

    /// Bind and named-volume mounts.
    pub volumes: Vec<VolumeMount>,

    /// Network attachments keyed by project-local network key.
    pub networks: BTreeMap<String, NetworkAttachment>,

    /// Explicit network mode; disables network attachment handling.
    pub network_mode: Option<String>,

    /// Container health check.
    pub healthcheck: Option<HealthcheckSpec>,

    /// Resource limits.
    pub resources: ResourceLimits,

    /// Run the container in privileged mode.
    pub privileged: bool,

    /// Capabilities to add.
    pub cap_add: Vec<String>,

    /// Capabilities to drop.
    pub cap_drop: Vec<String>,

    /// Security options, including `seccomp` profile references.
    pub security_opt: Vec<String>,

    /// Extra `/etc/hosts` entries, host name to one or more addresses.
    pub extra_hosts: BTreeMap<String, Vec<String>>,

    /// Host device mappings.
    pub devices: Vec<DeviceSpec>,

    /// Working directory inside the container.
    pub working_dir: Option<String>,

    /// User the container process runs as.
    pub user: Option<String>,

    /// Run an init process as PID 1. Defaults to enabled.
    pub init: Option<bool>,

    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// Return the trimmed image reference, if any.
    #[must_use]
    pub fn image_ref(&self) -> Option<&str> {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
    }
}

/// Build section of a service. Only recorded so it can be rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildSpec {
    /// Build context directory.
    pub context: Option<String>,
    /// Dockerfile path.
    pub dockerfile: Option<String>,
}

/// A port declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortMapping {
    /// Container port.
    pub target: u16,
    /// Host port or range; the port is only exposed when unset.
    pub published: Option<String>,
    /// Protocol, `tcp` when unset.
    pub protocol: Option<String>,
    /// Host address to bind.
    pub host_ip: Option<String>,
}

/// A volume declaration on a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VolumeMount {
    /// Mount type: empty or `bind` for bind mounts, `volume` for named
    /// volumes.
    #[serde(rename = "type")]
    pub kind: String,
    /// Host path for bind mounts or volume key for named volumes.
    pub source: Option<String>,
    /// Path inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
}

/// Per-network settings of a service attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkAttachment {
    /// Additional DNS aliases; the service name is always added.
    pub aliases: Vec<String>,
    /// Endpoint driver options.
    pub driver_opts: BTreeMap<String, String>,
    /// Static IPv4 address.
    pub ipv4_address: Option<String>,
    /// Static IPv6 address.
    pub ipv6_address: Option<String>,
}

/// Health check definition. Durations are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthcheckSpec {
    /// Test command, e.g. `["CMD", "pg_isready"]`.
    pub test: Vec<String>,
    /// Time between checks.
    pub interval_ms: Option<u64>,
    /// Time a single check may take.
    pub timeout_ms: Option<u64>,
    /// Grace period before failures count.
    pub start_period_ms: Option<u64>,
    /// Time between checks during the start period.
    pub start_interval_ms: Option<u64>,
    /// Consecutive failures before the container is unhealthy.
    pub retries: Option<u64>,
    /// Disable any image-defined health check.
    pub disable: bool,
}

/// Resource limits. Zero or unset values are not applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Memory limit in bytes.
    pub memory: Option<i64>,
    /// Memory soft limit in bytes.
    pub memory_reservation: Option<i64>,
    /// Memory plus swap limit in bytes.
    pub memory_swap: Option<i64>,
    /// Number of CPUs.
    pub cpus: Option<f64>,
    /// Relative CPU weight.
    pub cpu_shares: Option<i64>,
    /// CPU CFS quota in microseconds.
    pub cpu_quota: Option<i64>,
    /// CPU CFS period in microseconds.
    pub cpu_period: Option<i64>,
    /// CPUs the container may use, e.g. `0-3`.
    pub cpuset: Option<String>,
    /// Size of `/dev/shm` in bytes.
    pub shm_size: Option<i64>,
}

/// A host device made available to the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceSpec {
    /// Device path on the host.
    pub source: String,
    /// Device path in the container; the host path when unset.
    pub target: Option<String>,
    /// Cgroup permissions; `rwm` when unset.
    pub permissions: Option<String>,
}

/// Top-level volume or network declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourceDecl {
    /// Explicit engine-side name, used verbatim unless `external` is set.
    pub name: Option<String>,
    /// The resource must already exist and is never created.
    pub external: bool,
    /// Driver name.
    pub driver: Option<String>,
    /// Driver options.
    pub driver_opts: BTreeMap<String, String>,
    /// Labels applied on creation.
    pub labels: BTreeMap<String, String>,
}

/// Project namespace and declared top-level resources.
///
/// Used for name resolution only; commands never mutate it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectContext {
    /// Project name.
    pub name: String,
    /// Absolute project working directory.
    pub working_dir: Utf8PathBuf,
    /// Declared volumes keyed by project-local key.
    pub volumes: BTreeMap<String, ResourceDecl>,
    /// Declared networks keyed by project-local key.
    pub networks: BTreeMap<String, ResourceDecl>,
}

/// On-disk shape of a normalized project document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProjectDocument {
    pub(crate) name: Option<String>,
    pub(crate) working_dir: Option<Utf8PathBuf>,
    pub(crate) services: BTreeMap<String, ServiceDescriptor>,
    pub(crate) volumes: BTreeMap<String, ResourceDecl>,
    pub(crate) networks: BTreeMap<String, ResourceDecl>,
}
