//! Loading of normalized project documents.
//!
//! Documents are TOML by default, or JSON when the file extension is
//! `.json`. Reads go through `cap_std::fs_utf8` so only the document's
//! parent directory is opened with ambient authority.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::{serde_json, toml};
use tracing::{debug, warn};

use super::paths::{absolutize, resolve_against};
use super::types::{ProjectContext, ProjectDocument};
use super::{Project, sanitize_name};
use crate::error::{ConfigError, Result};

/// File names probed, in order, when no project document is configured.
pub const DEFAULT_PROJECT_FILES: &[&str] = &["compose-project.toml", "compose-project.json"];

/// Markers in `/proc/1/cgroup` that indicate a containerized process.
const CGROUP_CONTAINER_MARKERS: &[&str] = &["docker", "containerd", "kubepods", "podman"];

/// Read a file's contents through a capability handle on its parent.
pub(crate) fn read_to_string(path: &Utf8Path) -> std::io::Result<String> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}

impl Project {
    /// Load a project document from `path`.
    ///
    /// The project working directory is the document's `working_dir`
    /// (relative values resolve against the document's directory) or the
    /// document's directory itself. The project name defaults to the
    /// sanitized basename of the working directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` when the file does not exist and
    /// `ConfigError::ParseError` when it cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.as_std_path().to_path_buf(),
            }
            .into());
        }

        let content = read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;
        let document = parse_document(path, &content)?;

        let document_dir = absolutize(path.parent().unwrap_or_else(|| Utf8Path::new(".")));
        debug!(%path, working_dir = %document_dir, "loaded project document");
        Ok(Self::from_document(document, &document_dir))
    }

    /// Load the configured project document, or probe the current directory
    /// for one of [`DEFAULT_PROJECT_FILES`].
    ///
    /// When nothing is found and the process appears to run inside a
    /// container, a warning explains that the host project directory is
    /// probably not mounted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` when no document exists, or any
    /// error from [`Project::load`].
    pub fn discover(configured: Option<&Utf8Path>) -> Result<Self> {
        if let Some(path) = configured {
            return Self::load(path);
        }

        let cwd = absolutize(Utf8Path::new("."));
        if let Some(found) = DEFAULT_PROJECT_FILES
            .iter()
            .map(|name| cwd.join(name))
            .find(|candidate| candidate.exists())
        {
            return Self::load(&found);
        }

        warn_if_project_missing_in_container(&cwd);
        let expected = DEFAULT_PROJECT_FILES
            .first()
            .map_or_else(|| cwd.clone(), |name| cwd.join(name));
        Err(ConfigError::FileNotFound {
            path: expected.into_std_path_buf(),
        }
        .into())
    }

    pub(crate) fn from_document(document: ProjectDocument, document_dir: &Utf8Path) -> Self {
        let working_dir = document.working_dir.as_ref().map_or_else(
            || document_dir.to_path_buf(),
            |dir| resolve_against(document_dir, dir.as_str()),
        );
        let name = document
            .name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| working_dir.file_name().map(sanitize_name).unwrap_or_default());

        let context = ProjectContext {
            name,
            working_dir,
            volumes: document.volumes,
            networks: document.networks,
        };
        Self::new(context, document.services)
    }
}

fn parse_document(path: &Utf8Path, content: &str) -> Result<ProjectDocument> {
    let parsed = if path.extension() == Some("json") {
        serde_json::from_str::<ProjectDocument>(content).map_err(|e| e.to_string())
    } else {
        toml::from_str::<ProjectDocument>(content).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| {
        ConfigError::ParseError {
            message: format!("failed to parse {path}: {message}"),
        }
        .into()
    })
}

/// Warn when running inside a container without a visible project document.
fn warn_if_project_missing_in_container(dir: &Utf8Path) {
    if !is_probably_running_in_container() {
        return;
    }
    warn!(
        directory = %dir,
        "running inside a container but no project document was found; \
         mount the host project directory at the same path inside this container"
    );
}

fn is_probably_running_in_container() -> bool {
    if Utf8Path::new("/.dockerenv").exists() {
        return true;
    }
    read_to_string(Utf8Path::new("/proc/1/cgroup")).is_ok_and(|cgroup| {
        CGROUP_CONTAINER_MARKERS
            .iter()
            .any(|marker| cgroup.contains(marker))
    })
}
