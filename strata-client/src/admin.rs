//! The authenticated administrative connection.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use strata_core::topology::ServerRecord;
use strata_core::{ProvisionError, ProvisionResult};

use crate::info::{self, REQUEST_TIMEOUT};
use crate::proto::{self, OpCode};

/// The administrative client surface.
///
/// A type capable of driving the admin side of a Strata server: queries,
/// raw commands, metadata file transfer and server registration. All errors
/// are distinguishable as `Auth`, `Query` or `Transport`.
#[async_trait]
pub trait AdminClient: Send {
    /// Run an administrative query, returning its structured result.
    async fn query(&mut self, statement: &str) -> ProvisionResult<Value>;

    /// Send a one-shot raw command and await a single acknowledgement within
    /// the given deadline.
    async fn raw_command(&mut self, opcode: OpCode, payload: Vec<u8>, deadline: Duration) -> ProvisionResult<()>;

    /// Fetch a metadata file from the remote database directory, byte for byte.
    async fn fetch_file(&mut self, name: &str) -> ProvisionResult<Vec<u8>>;

    /// Announce a new server to the cluster.
    ///
    /// Registration is idempotent on the server side, resubmitting the same
    /// record is safe and never creates a duplicate entry.
    async fn register_server(&mut self, record: &ServerRecord) -> ProvisionResult<()>;

    /// Close the connection.
    async fn close(&mut self);
}

#[derive(Deserialize, Serialize)]
struct AuthRequest {
    user: String,
    password: String,
    dbname: String,
}

/// A connection to a Strata server over the native admin protocol.
pub struct Connection {
    stream: TcpStream,
    peer: String,
}

impl Connection {
    /// Connect to the given server and authenticate against the given database.
    pub async fn connect(user: &str, password: &str, dbname: &str, host: &str, port: u16) -> ProvisionResult<Self> {
        let mut stream = info::connect(host, port).await?;
        let auth = AuthRequest {
            user: user.to_string(),
            password: password.to_string(),
            dbname: dbname.to_string(),
        };
        proto::write_frame(&mut stream, OpCode::Auth, &proto::encode(&auth)?).await?;
        let frame = timeout(REQUEST_TIMEOUT, proto::read_frame(&mut stream))
            .await
            .map_err(|_| ProvisionError::Timeout(format!("authenticating with {}:{}", host, port)))??;
        proto::expect(frame, OpCode::Ack)?;
        tracing::debug!(user, dbname, peer = %format!("{}:{}", host, port), "admin connection established");
        Ok(Self { stream, peer: format!("{}:{}", host, port) })
    }

    async fn request(&mut self, opcode: OpCode, payload: &[u8], want: OpCode, deadline: Duration) -> ProvisionResult<Vec<u8>> {
        proto::write_frame(&mut self.stream, opcode, payload).await?;
        let frame = timeout(deadline, proto::read_frame(&mut self.stream))
            .await
            .map_err(|_| ProvisionError::Timeout(format!("waiting for a reply from {}", self.peer)))??;
        proto::expect(frame, want)
    }
}

#[async_trait]
impl AdminClient for Connection {
    async fn query(&mut self, statement: &str) -> ProvisionResult<Value> {
        let payload = proto::encode(&statement.to_string())?;
        let reply = self.request(OpCode::Query, &payload, OpCode::AckData, REQUEST_TIMEOUT).await?;
        serde_json::from_slice(&reply).map_err(|err| ProvisionError::Protocol(format!("error decoding query result: {}", err)))
    }

    async fn raw_command(&mut self, opcode: OpCode, payload: Vec<u8>, deadline: Duration) -> ProvisionResult<()> {
        self.request(opcode, &payload, OpCode::Ack, deadline).await?;
        Ok(())
    }

    async fn fetch_file(&mut self, name: &str) -> ProvisionResult<Vec<u8>> {
        let payload = proto::encode(&name.to_string())?;
        self.request(OpCode::FetchFile, &payload, OpCode::AckData, REQUEST_TIMEOUT).await
    }

    async fn register_server(&mut self, record: &ServerRecord) -> ProvisionResult<()> {
        let payload = proto::encode(record)?;
        self.request(OpCode::RegisterServer, &payload, OpCode::Ack, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.shutdown().await {
            tracing::debug!(error = %err, peer = %self.peer, "error closing admin connection");
        }
    }
}
