//! Project model, name resolution, and environment merging.
//!
//! A [`Project`] pairs a [`ProjectContext`] (namespace, working directory,
//! and declared top-level volumes and networks) with resolved
//! [`ServiceDescriptor`]s. Projects are loaded from a normalized document:
//!
//! ```toml
//! name = "shop"
//!
//! [services.db]
//! image = "postgres:16"
//! environment = { POSTGRES_PASSWORD = "secret" }
//!
//! [[services.db.volumes]]
//! type = "volume"
//! source = "db_data"
//! target = "/var/lib/postgresql/data"
//!
//! [services.db.healthcheck]
//! test = ["CMD", "pg_isready"]
//! interval_ms = 1000
//!
//! [volumes.db_data]
//! ```

mod env;
mod loader;
mod names;
mod paths;
mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use env::{EnvEntry, Environment, merge_env};
pub use loader::DEFAULT_PROJECT_FILES;
pub(crate) use loader::read_to_string;
pub use names::{DEFAULT_NETWORK_KEY, container_name, resolve_resource_name, sanitize_name};
pub use paths::{normalize, resolve_against};
pub use types::{
    BuildSpec, DeviceSpec, HealthcheckSpec, NetworkAttachment, PortMapping, ProjectContext,
    ResourceDecl, ResourceLimits, ServiceDescriptor, VolumeMount,
};

use crate::command::Command;
use crate::error::{Result, UsageError};

/// A loaded project: shared context plus its services.
#[derive(Debug, Clone)]
pub struct Project {
    context: Arc<ProjectContext>,
    services: BTreeMap<String, ServiceDescriptor>,
}

impl Project {
    /// Create a project from an explicit context and service map.
    #[must_use]
    pub fn new(context: ProjectContext, services: BTreeMap<String, ServiceDescriptor>) -> Self {
        Self {
            context: Arc::new(context),
            services,
        }
    }

    /// Return the project context.
    #[must_use]
    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    /// Return the project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Iterate over service names in sorted order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Look up a service by name.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::ServiceNotFound` when the project has no such
    /// service.
    pub fn service(&self, name: &str) -> Result<Service> {
        let descriptor = self
            .services
            .get(name)
            .ok_or_else(|| UsageError::ServiceNotFound {
                name: String::from(name),
            })?;
        Ok(Service {
            name: String::from(name),
            descriptor: descriptor.clone(),
            context: Arc::clone(&self.context),
        })
    }

    /// Build a command for `service` with per-invocation arguments.
    ///
    /// Empty `args` fall back to the service command, then to the image
    /// default.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::ServiceNotFound` when the project has no such
    /// service.
    pub fn command<I, S>(&self, service: &str, args: I) -> Result<Command>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.service(service)?.command(args))
    }
}

/// A service bound to its project context.
#[derive(Debug, Clone)]
pub struct Service {
    name: String,
    descriptor: ServiceDescriptor,
    context: Arc<ProjectContext>,
}

impl Service {
    /// Bind a descriptor to a context without going through a [`Project`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        descriptor: ServiceDescriptor,
        context: Arc<ProjectContext>,
    ) -> Self {
        Self {
            name: name.into(),
            descriptor,
            context,
        }
    }

    /// Return the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the resolved descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Return the project context.
    #[must_use]
    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    /// Return the shared project context handle.
    #[must_use]
    pub fn context_handle(&self) -> Arc<ProjectContext> {
        Arc::clone(&self.context)
    }

    /// Build a command running this service with `args`.
    #[must_use]
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::new(self.clone()).with_args(args)
    }
}
