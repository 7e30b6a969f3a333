//! Classification of Bollard errors.
//!
//! Connection failures are mapped to semantic `EngineError` variants, and
//! API responses are tested for the not-found and already-exists outcomes
//! that idempotent engine calls tolerate.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::EngineError;

/// Filesystem path behind a `unix://` or `npipe://` endpoint.
fn socket_path(endpoint: &str) -> Option<&Path> {
    ["unix://", "npipe://"]
        .iter()
        .find_map(|scheme| endpoint.strip_prefix(scheme))
        .map(Path::new)
}

/// Map a connection failure against `endpoint` to an [`EngineError`].
///
/// Missing and inaccessible sockets get their own variants when the endpoint
/// names a filesystem path; everything else is `ConnectionFailed` with the
/// engine message.
pub(crate) fn classify_connection_error(
    error: &bollard::errors::Error,
    endpoint: &str,
) -> EngineError {
    let kind = match error {
        bollard::errors::Error::IOError { err } => {
            Some(io_error_kind_in_chain(err).unwrap_or_else(|| err.kind()))
        }
        bollard::errors::Error::SocketNotFoundError(_) => Some(ErrorKind::NotFound),
        other => io_error_kind_in_chain(other),
    };

    match (kind, socket_path(endpoint)) {
        (Some(ErrorKind::NotFound), Some(path)) => EngineError::SocketNotFound {
            path: path.to_path_buf(),
        },
        (Some(ErrorKind::PermissionDenied), Some(path)) => EngineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => EngineError::ConnectionFailed {
            message: error.to_string(),
        },
    }
}

/// HTTP status the engine returns for a missing object.
const STATUS_NOT_FOUND: u16 = 404;

/// HTTP status the engine returns for a name conflict.
const STATUS_CONFLICT: u16 = 409;

/// Return whether the engine reported that the object does not exist.
pub(crate) const fn is_not_found(error: &bollard::errors::Error) -> bool {
    matches!(
        error,
        bollard::errors::Error::DockerResponseServerError {
            status_code: STATUS_NOT_FOUND,
            ..
        }
    )
}

/// Return whether the engine reported that the object already exists.
///
/// Podman and older Docker releases answer duplicate network or volume
/// creation with a server error whose message says so instead of a 409.
pub(crate) fn is_already_exists(error: &bollard::errors::Error) -> bool {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => *status_code == STATUS_CONFLICT || message.contains("already exists"),
        _ => false,
    }
}

/// First `io::Error` kind among the sources of `error`.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<ErrorKind> {
    std::iter::successors(error.source(), |err| err.source())
        .find_map(|err| err.downcast_ref::<std::io::Error>().map(std::io::Error::kind))
}
