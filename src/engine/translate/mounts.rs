//! Service volume declarations to engine mounts.

use bollard::models::{Mount, MountTypeEnum};

use crate::error::{Result, UsageError};
use crate::project::{ProjectContext, ServiceDescriptor, VolumeMount, resolve_against};

const BIND: &str = "bind";
const VOLUME: &str = "volume";

/// Translate every volume declaration of `descriptor` into a mount.
///
/// Relative bind sources resolve against the project working directory and
/// are lexically normalized. Named volume sources are qualified through the
/// project context; an anonymous volume keeps an empty source.
///
/// # Errors
///
/// Returns `UsageError::BindSourceRequired` for a bind mount without source
/// and `UsageError::UnsupportedVolumeType` for any type other than bind or
/// volume.
pub fn service_mounts(
    descriptor: &ServiceDescriptor,
    context: &ProjectContext,
) -> Result<Vec<Mount>> {
    descriptor
        .volumes
        .iter()
        .map(|volume| translate_mount(volume, context))
        .collect()
}

fn translate_mount(volume: &VolumeMount, context: &ProjectContext) -> Result<Mount> {
    let kind = volume.kind.trim();
    let (typ, source) = match kind {
        "" | BIND => {
            let raw = volume
                .source
                .as_deref()
                .map(str::trim)
                .filter(|source| !source.is_empty())
                .ok_or_else(|| UsageError::BindSourceRequired {
                    target: volume.target.clone(),
                })?;
            let resolved = resolve_against(&context.working_dir, raw);
            (MountTypeEnum::BIND, resolved.into_string())
        }
        VOLUME => {
            let source = volume
                .source
                .as_deref()
                .map(str::trim)
                .filter(|source| !source.is_empty())
                .map(|key| context.volume_name(key))
                .unwrap_or_default();
            (MountTypeEnum::VOLUME, source)
        }
        other => {
            return Err(UsageError::UnsupportedVolumeType {
                kind: String::from(other),
            }
            .into());
        }
    };

    Ok(Mount {
        typ: Some(typ),
        source: Some(source),
        target: Some(volume.target.clone()),
        read_only: Some(volume.read_only),
        ..Mount::default()
    })
}

/// Keys of the named volumes a descriptor mounts, in declaration order and
/// without duplicates.
pub(crate) fn named_volume_keys(descriptor: &ServiceDescriptor) -> Vec<&str> {
    let mut keys: Vec<&str> = Vec::new();
    for volume in &descriptor.volumes {
        if volume.kind.trim() != VOLUME {
            continue;
        }
        let Some(key) = volume
            .source
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        else {
            continue;
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
