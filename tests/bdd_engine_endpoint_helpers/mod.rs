//! Behavioural step helpers for engine endpoint scenarios.

mod assertions;
mod state;
mod steps;

pub use state::{EndpointState, endpoint_state};
