//! The framed native admin protocol.
//!
//! Every exchange is a single request frame answered by a single response
//! frame. A frame is `[payload length: u32 BE][opcode: u8][payload]` with
//! bincode-encoded payloads, except for file transfers where the payload is
//! the raw file content.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use strata_core::{ProvisionError, ProvisionResult};

/// Frames with a larger payload than this are refused outright.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Request and response opcodes of the native admin protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Request a version and database-list snapshot, no authentication.
    Info = 0,
    /// Authenticate the connection for administrative use.
    Auth = 1,
    /// Run an administrative query.
    Query = 2,
    /// Fetch a metadata file from the remote database directory.
    FetchFile = 3,
    /// Announce a new server to the cluster.
    RegisterServer = 4,
    /// Instruct the server to mount a database directory.
    LoadDb = 5,
    /// Success, no payload.
    Ack = 128,
    /// Success carrying a response payload.
    AckData = 129,
    /// The request was rejected for authentication or privilege reasons.
    ErrAuth = 252,
    /// The query was rejected.
    ErrQuery = 253,
    /// Generic server-side failure.
    Err = 255,
}

impl OpCode {
    fn from_u8(value: u8) -> ProvisionResult<Self> {
        match value {
            0 => Ok(Self::Info),
            1 => Ok(Self::Auth),
            2 => Ok(Self::Query),
            3 => Ok(Self::FetchFile),
            4 => Ok(Self::RegisterServer),
            5 => Ok(Self::LoadDb),
            128 => Ok(Self::Ack),
            129 => Ok(Self::AckData),
            252 => Ok(Self::ErrAuth),
            253 => Ok(Self::ErrQuery),
            255 => Ok(Self::Err),
            other => Err(ProvisionError::Protocol(format!("unknown opcode: {}", other))),
        }
    }
}

/// A single protocol frame.
#[derive(Debug)]
pub struct Frame {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

/// Write one frame to the stream.
pub async fn write_frame<W>(stream: &mut W, opcode: OpCode, payload: &[u8]) -> ProvisionResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() as u64 > u64::from(MAX_FRAME_SIZE) {
        return Err(ProvisionError::Protocol(format!("frame payload too large: {} bytes", payload.len())));
    }
    let res = async {
        stream.write_u32(payload.len() as u32).await?;
        stream.write_u8(opcode as u8).await?;
        stream.write_all(payload).await?;
        stream.flush().await
    }
    .await;
    res.map_err(|err| ProvisionError::Transport(format!("error writing frame: {}", err)))
}

/// Read one frame from the stream.
pub async fn read_frame<R>(stream: &mut R) -> ProvisionResult<Frame>
where
    R: AsyncRead + Unpin,
{
    let res = async {
        let len = stream.read_u32().await?;
        let opcode = stream.read_u8().await?;
        Ok::<_, std::io::Error>((len, opcode))
    }
    .await;
    let (len, opcode) = res.map_err(|err| ProvisionError::Transport(format!("error reading frame header: {}", err)))?;
    if len > MAX_FRAME_SIZE {
        return Err(ProvisionError::Protocol(format!("frame payload too large: {} bytes", len)));
    }
    let opcode = OpCode::from_u8(opcode)?;
    let mut payload = vec![0u8; len as usize];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|err| ProvisionError::Transport(format!("error reading frame payload: {}", err)))?;
    Ok(Frame { opcode, payload })
}

/// Encode a payload value with bincode.
pub fn encode<T: Serialize>(value: &T) -> ProvisionResult<Vec<u8>> {
    bincode::serialize(value).map_err(|err| ProvisionError::Protocol(format!("error encoding payload: {}", err)))
}

/// Decode a payload value with bincode.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProvisionResult<T> {
    bincode::deserialize(bytes).map_err(|err| ProvisionError::Protocol(format!("error decoding payload: {}", err)))
}

/// Check a response frame against the expected opcode, mapping error frames
/// onto their matching error variants.
pub fn expect(frame: Frame, want: OpCode) -> ProvisionResult<Vec<u8>> {
    match frame.opcode {
        opcode if opcode == want => Ok(frame.payload),
        OpCode::ErrAuth => Err(ProvisionError::Auth(error_message(&frame.payload))),
        OpCode::ErrQuery => Err(ProvisionError::Query(error_message(&frame.payload))),
        OpCode::Err => Err(ProvisionError::Transport(error_message(&frame.payload))),
        other => Err(ProvisionError::Protocol(format!("unexpected response opcode: {:?}", other))),
    }
}

/// Extract the server's error message from an error frame payload.
fn error_message(payload: &[u8]) -> String {
    decode::<String>(payload).unwrap_or_else(|_| String::from_utf8_lossy(payload).into_owned())
}
