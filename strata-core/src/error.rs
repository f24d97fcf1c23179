//! Strata provisioning error abstractions.

use std::path::PathBuf;

use thiserror::Error;

/// Provisioning error variants.
///
/// Everything that can go wrong while provisioning a server maps onto one of
/// these variants, which lets callers distinguish plain-report failures from
/// failures that require tearing down partially-created local state.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The given input was invalid.
    #[error("validation error: {0}")]
    InvalidInput(String),
    /// A server could not be reached.
    #[error("unable to reach server: {0}")]
    Unreachable(String),
    /// A network call did not complete within its deadline.
    #[error("timed out while {0}")]
    Timeout(String),
    /// The local and remote sides do not run compatible versions.
    #[error("version mismatch: local version {local} is not compatible with remote version {remote}")]
    VersionMismatch { local: String, remote: String },
    /// The selected pool cannot accept another server.
    #[error("pool not eligible: {0}")]
    PoolNotEligible(String),
    /// The server already hosts the maximum number of databases.
    #[error("cannot create {name:?} because the maximum number of databases is reached (max={max})")]
    CapacityExceeded { name: String, max: usize },
    /// The target database directory already holds data.
    #[error("path is not empty: {0}")]
    DirectoryNotEmpty(PathBuf),
    /// Not every server in the cluster reports a running status.
    #[error("cluster not ready: {0}")]
    ClusterNotReady(String),
    /// The server never reported the new database as loaded.
    #[error("database {0:?} is not loaded, please check the Strata server logging to see what went wrong (possible cause: the server has no access to the database folder)")]
    LoadNotConfirmed(String),
    /// Registering the new server with the cluster failed.
    #[error("server registration failed: {0}")]
    Registration(String),
    /// The remote side rejected the given credentials or privileges.
    #[error("authentication error: {0}")]
    Auth(String),
    /// The remote side rejected an administrative query.
    #[error("query error: {0}")]
    Query(String),
    /// The connection broke down mid-exchange.
    #[error("transport error: {0}")]
    Transport(String),
    /// The remote side answered with something we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Tearing down partially-created local state failed.
    ///
    /// This is fatal and never retried automatically, the operator must
    /// inspect the database directory by hand.
    #[error("rollback failed, manual cleanup required: {0}")]
    Rollback(String),
}

/// A result type where the error is a `ProvisionError`.
pub type ProvisionResult<T> = ::std::result::Result<T, ProvisionError>;
