//! Run Compose services as one-shot containers with subprocess semantics.
//!
//! `compose-exec` turns a service declared in a normalized Compose-style
//! project document into a [`command::Command`] that behaves like a local
//! process: arguments, environment and standard streams are configured up
//! front, then the command is started, waited on and reported through an
//! exit status. Each command owns exactly one container and removes it
//! however the run ends, including caller cancellation and process signals.
//!
//! # Modules
//!
//! - [`api`]: Project-level operations (`command_for`, `down`)
//! - [`command`]: The command lifecycle, stream forwarding and health polling
//! - [`config`]: Layered configuration (CLI > env > file > defaults)
//! - [`engine`]: Engine connection, operation contract and payload translation
//! - [`error`]: Semantic error types for the library
//! - [`project`]: Project documents, services and name resolution

pub mod api;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod project;
