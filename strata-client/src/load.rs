//! One-shot database load command.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use strata_core::{ProvisionError, ProvisionResult};

use crate::info::{self, REQUEST_TIMEOUT};
use crate::proto::{self, OpCode};

/// Instruct a running server to mount the database stored at `dbpath`.
///
/// Opens a fresh connection, sends a single raw load command carrying the
/// storage path and awaits one acknowledgement. Loading itself continues
/// asynchronously on the server, the ack only confirms the command was
/// accepted.
pub async fn load_database(dbpath: &Path, host: &str, port: u16) -> ProvisionResult<()> {
    // The server expects a directory path with a trailing separator.
    let mut path = dbpath.display().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }

    let mut stream = info::connect(host, port).await?;
    proto::write_frame(&mut stream, OpCode::LoadDb, &proto::encode(&path)?).await?;
    let frame = timeout(REQUEST_TIMEOUT, proto::read_frame(&mut stream))
        .await
        .map_err(|_| ProvisionError::Timeout(format!("waiting for the load command ack from {}:{}", host, port)))??;
    proto::expect(frame, OpCode::Ack)?;
    let _ = stream.shutdown().await;
    Ok(())
}
