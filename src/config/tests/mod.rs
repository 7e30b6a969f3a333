//! Unit tests for compose-exec configuration.
//!
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults, serialisation and timeout conversion
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
