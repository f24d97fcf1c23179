//! Unauthenticated server info snapshot.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;

use strata_core::{ProvisionError, ProvisionResult};

use crate::proto::{self, OpCode};

/// Deadline for establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for a single request/response exchange.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A read-only snapshot of a server's identity: its version and the names of
/// the databases it currently serves.
///
/// Snapshots are held only for the duration of one provisioning run.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct InfoSnapshot {
    pub version: String,
    pub databases: Vec<String>,
}

/// Fetch a server's info snapshot.
///
/// Read-only and unauthenticated. Connection failure or an expired deadline
/// surfaces as `Unreachable`/`Timeout`, a malformed response as `Protocol`.
pub async fn server_info(host: &str, port: u16) -> ProvisionResult<InfoSnapshot> {
    let mut stream = connect(host, port).await?;
    proto::write_frame(&mut stream, OpCode::Info, &[]).await?;
    let frame = timeout(REQUEST_TIMEOUT, proto::read_frame(&mut stream))
        .await
        .map_err(|_| ProvisionError::Timeout(format!("waiting for server info from {}:{}", host, port)))??;
    let payload = proto::expect(frame, OpCode::AckData)?;
    proto::decode(&payload)
}

pub(crate) async fn connect(host: &str, port: u16) -> ProvisionResult<TcpStream> {
    let attempt = timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ProvisionError::Timeout(format!("connecting to {}:{}", host, port)))?;
    attempt.map_err(|err| ProvisionError::Unreachable(format!("{}:{}: {}", host, port, err)))
}
