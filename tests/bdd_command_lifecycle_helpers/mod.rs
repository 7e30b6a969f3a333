//! Behavioural step helpers for command lifecycle scenarios.

mod assertions;
mod state;
mod steps;

pub use state::{LifecycleState, lifecycle_state};
