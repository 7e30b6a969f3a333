//! Host-level security and resource translation.

use bollard::models::{DeviceMapping, HostConfig};
use camino::Utf8Path;

use crate::error::{EngineError, Result};
use crate::project::{
    DeviceSpec, ProjectContext, ServiceDescriptor, read_to_string, resolve_against,
};

const DEFAULT_DEVICE_PERMISSIONS: &str = "rwm";
const SECCOMP_PREFIXES: &[&str] = &["seccomp:", "seccomp="];
const NANO_CPUS_PER_CPU: f64 = 1_000_000_000.0;

/// Apply privilege, capability and security-option settings to `host`.
///
/// # Errors
///
/// Returns `EngineError::SeccompProfile` when a seccomp profile file cannot
/// be read.
pub fn apply_security(
    host: &mut HostConfig,
    descriptor: &ServiceDescriptor,
    context: &ProjectContext,
) -> Result<()> {
    host.privileged = Some(descriptor.privileged);
    if !descriptor.cap_add.is_empty() {
        host.cap_add = Some(descriptor.cap_add.clone());
    }
    if !descriptor.cap_drop.is_empty() {
        host.cap_drop = Some(descriptor.cap_drop.clone());
    }
    if !descriptor.security_opt.is_empty() {
        let resolved = descriptor
            .security_opt
            .iter()
            .map(|opt| resolve_security_opt(opt, &context.working_dir))
            .collect::<Result<Vec<_>>>()?;
        host.security_opt = Some(resolved);
    }
    Ok(())
}

/// Rewrite a `seccomp` security option so the engine receives the profile
/// itself rather than a client-side path.
///
/// `unconfined` and inline JSON profiles pass through as `seccomp=<value>`.
/// Any other value is read as a file, relative to `base_dir` when not
/// absolute. Other options are returned unchanged.
///
/// # Errors
///
/// Returns `EngineError::SeccompProfile` when the profile file cannot be
/// read.
pub fn resolve_security_opt(opt: &str, base_dir: &Utf8Path) -> Result<String> {
    let trimmed = opt.trim();
    let Some(value) = SECCOMP_PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .map(str::trim)
    else {
        return Ok(String::from(opt));
    };

    if value.is_empty() {
        return Ok(String::from(trimmed));
    }
    if value.eq_ignore_ascii_case("unconfined") || value.starts_with('{') {
        return Ok(format!("seccomp={value}"));
    }

    let path = resolve_against(base_dir, value);
    let profile = read_to_string(&path).map_err(|error| EngineError::SeccompProfile {
        path: path.clone().into_std_path_buf(),
        message: error.to_string(),
    })?;
    Ok(format!("seccomp={profile}"))
}

/// Apply memory, CPU, shared-memory, host-entry and device settings.
///
/// Limits that are unset or not positive are left to the engine default.
pub fn apply_resources(host: &mut HostConfig, descriptor: &ServiceDescriptor) {
    let limits = &descriptor.resources;
    host.memory = positive(limits.memory);
    host.memory_reservation = positive(limits.memory_reservation);
    host.memory_swap = positive(limits.memory_swap);
    host.nano_cpus = limits.cpus.filter(|cpus| *cpus > 0.0).map(nano_cpus);
    host.cpu_shares = positive(limits.cpu_shares);
    host.cpu_quota = positive(limits.cpu_quota);
    host.cpu_period = positive(limits.cpu_period);
    host.cpuset_cpus = limits
        .cpuset
        .as_deref()
        .map(str::trim)
        .filter(|set| !set.is_empty())
        .map(String::from);
    host.shm_size = positive(limits.shm_size);

    if !descriptor.extra_hosts.is_empty() {
        host.extra_hosts = Some(
            descriptor
                .extra_hosts
                .iter()
                .flat_map(|(name, addresses)| {
                    addresses.iter().map(move |address| format!("{name}:{address}"))
                })
                .collect(),
        );
    }
    if !descriptor.devices.is_empty() {
        host.devices = Some(descriptor.devices.iter().map(device_mapping).collect());
    }
}

const fn positive(value: Option<i64>) -> Option<i64> {
    match value {
        Some(v) if v > 0 => Some(v),
        _ => None,
    }
}

#[expect(
    clippy::float_arithmetic,
    clippy::cast_possible_truncation,
    reason = "the engine takes CPU limits as integral nano CPUs"
)]
fn nano_cpus(cpus: f64) -> i64 {
    (cpus * NANO_CPUS_PER_CPU).round() as i64
}

fn device_mapping(device: &DeviceSpec) -> DeviceMapping {
    let in_container = device
        .target
        .as_deref()
        .filter(|target| !target.is_empty())
        .unwrap_or(&device.source);
    let permissions = device
        .permissions
        .as_deref()
        .filter(|permissions| !permissions.is_empty())
        .unwrap_or(DEFAULT_DEVICE_PERMISSIONS);

    DeviceMapping {
        path_on_host: Some(device.source.clone()),
        path_in_container: Some(String::from(in_container)),
        cgroup_permissions: Some(String::from(permissions)),
    }
}
