//! Node-level client capability.

use std::path::Path;

use async_trait::async_trait;

use strata_core::ProvisionResult;

use crate::admin::{AdminClient, Connection};
use crate::info::{server_info, InfoSnapshot};
use crate::load::load_database;

/// A type capable of the node-level operations the provisioning workflow
/// needs: fetching info snapshots, issuing the load command and opening
/// administrative connections.
///
/// The workflow only ever talks to servers through this seam, which keeps it
/// runnable against a scripted stand-in instead of live servers.
#[async_trait]
pub trait ClusterLink: Send + Sync {
    /// Fetch the info snapshot of the given server.
    async fn server_info(&self, host: &str, port: u16) -> ProvisionResult<InfoSnapshot>;

    /// Instruct the given server to mount the database stored at `dbpath`.
    async fn load_database(&self, dbpath: &Path, host: &str, port: u16) -> ProvisionResult<()>;

    /// Open an authenticated administrative connection to the given server.
    async fn connect(&self, user: &str, password: &str, dbname: &str, host: &str, port: u16) -> ProvisionResult<Box<dyn AdminClient>>;
}

/// The production implementation speaking the native admin protocol.
pub struct NativeLink;

#[async_trait]
impl ClusterLink for NativeLink {
    async fn server_info(&self, host: &str, port: u16) -> ProvisionResult<InfoSnapshot> {
        server_info(host, port).await
    }

    async fn load_database(&self, dbpath: &Path, host: &str, port: u16) -> ProvisionResult<()> {
        load_database(dbpath, host, port).await
    }

    async fn connect(&self, user: &str, password: &str, dbname: &str, host: &str, port: u16) -> ProvisionResult<Box<dyn AdminClient>> {
        let conn = Connection::connect(user, password, dbname, host, port).await?;
        Ok(Box::new(conn))
    }
}
