//! Core types and validation rules shared across the Strata tooling.

pub mod duration;
pub mod error;
pub mod topology;
pub mod validate;
pub mod version;

#[cfg(test)]
mod version_test;

pub use error::{ProvisionError, ProvisionResult};
