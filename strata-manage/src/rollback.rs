//! Roll back partially-created local state.

use std::fs;
use std::io;
use std::path::Path;

use strata_core::{ProvisionError, ProvisionResult};

/// Tears down the local state created by a failed provisioning run.
pub struct RollbackManager;

impl RollbackManager {
    /// Delete the database directory subtree created earlier in the run.
    ///
    /// The directory is the unit of rollback, removing it undoes the local
    /// commit in one stroke. A failure here is escalated as fatal and never
    /// retried, the operator has to inspect the directory by hand.
    pub fn run(dbpath: &Path) -> ProvisionResult<()> {
        tracing::warn!(path = %dbpath.display(), "roll-back create database...");
        match fs::remove_dir_all(dbpath) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ProvisionError::Rollback(format!("error removing {:?}: {}", dbpath, err))),
        }
    }
}
