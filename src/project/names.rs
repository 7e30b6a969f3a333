//! Qualified names for project resources and generated container names.

use super::types::ProjectContext;

/// Prefix of every generated container name.
const CONTAINER_NAME_PREFIX: &str = "compose-exec";

/// Number of random bytes in a container name suffix.
const CONTAINER_SUFFIX_BYTES: usize = 6;

/// Network key used when a service declares no networks.
pub const DEFAULT_NETWORK_KEY: &str = "default";

/// Resolve the engine-side name of a project volume or network.
///
/// An external resource keeps its raw key, whatever name it declares. An
/// explicit name is otherwise used verbatim. Everything else is namespaced
/// as `<project>_<key>`, or left as the key when the project has no name.
#[must_use]
pub fn resolve_resource_name(
    project: &str,
    key: &str,
    explicit_name: Option<&str>,
    external: bool,
) -> String {
    let local = key.trim();
    if external {
        return String::from(local);
    }
    if let Some(name) = explicit_name.map(str::trim).filter(|name| !name.is_empty()) {
        return String::from(name);
    }
    let prefix = project.trim();
    if prefix.is_empty() {
        return String::from(local);
    }
    format!("{prefix}_{local}")
}

impl ProjectContext {
    /// Qualified name of a volume key, honouring its declaration.
    #[must_use]
    pub fn volume_name(&self, key: &str) -> String {
        let decl = self.volumes.get(key);
        resolve_resource_name(
            &self.name,
            key,
            decl.and_then(|d| d.name.as_deref()),
            decl.is_some_and(|d| d.external),
        )
    }

    /// Qualified name of a network key, honouring its declaration.
    #[must_use]
    pub fn network_name(&self, key: &str) -> String {
        let decl = self.networks.get(key);
        resolve_resource_name(
            &self.name,
            key,
            decl.and_then(|d| d.name.as_deref()),
            decl.is_some_and(|d| d.external),
        )
    }
}

/// Generate a unique container name for a service.
///
/// The name is `compose-exec-<slug>-<12 hex chars>`, so concurrent runs of
/// the same service never collide.
#[must_use]
pub fn container_name(service: &str) -> String {
    let suffix: [u8; CONTAINER_SUFFIX_BYTES] = rand::random();
    let hex: String = suffix.iter().map(|byte| format!("{byte:02x}")).collect();
    let slug = sanitize_name(service);
    if slug.is_empty() {
        format!("{CONTAINER_NAME_PREFIX}-{hex}")
    } else {
        format!("{CONTAINER_NAME_PREFIX}-{slug}-{hex}")
    }
}

/// Lowercase a name and replace characters the engine rejects with `-`.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '-',
        })
        .collect::<String>()
        .trim_matches('-')
        .to_owned()
}
