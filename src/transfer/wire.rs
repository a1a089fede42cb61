//! Framing: 4-byte big-endian length + JSON metadata, followed by the raw
//! payload. The receiver answers with a single JSON acknowledgment.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::types::{Ack, TransferMetadata};
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on the metadata block
pub const MAX_METADATA_LEN: u32 = 1024 * 1024;

/// Upper bound on an acknowledgment
pub const MAX_ACK_LEN: usize = 64 * 1024;

/// Bound one socket operation. Both ends of a hop apply the transfer
/// timeout per operation, so a slow but moving transfer never expires.
pub async fn bounded<T>(
    timeout: Duration,
    op: impl Future<Output = TransferResult<T>>,
) -> TransferResult<T> {
    tokio::time::timeout(timeout, op)
        .await
        .unwrap_or_else(|_| Err(TransferError::Timeout(timeout)))
}

/// Serialize metadata to the JSON bytes carried in a frame
pub fn encode_metadata(metadata: &TransferMetadata) -> TransferResult<Vec<u8>> {
    let bytes = serde_json::to_vec(metadata)
        .map_err(|e| TransferError::Protocol(format!("metadata encode: {e}")))?;
    if bytes.len() > MAX_METADATA_LEN as usize {
        return Err(TransferError::Protocol(format!(
            "metadata too large: {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Parse and validate a metadata block
pub fn decode_metadata(bytes: &[u8]) -> TransferResult<TransferMetadata> {
    let metadata: TransferMetadata = serde_json::from_slice(bytes)
        .map_err(|e| TransferError::Protocol(format!("malformed metadata: {e}")))?;
    metadata.validate()?;
    Ok(metadata)
}

/// Write the length prefix and metadata block
pub async fn write_header<W>(writer: &mut W, metadata: &TransferMetadata) -> TransferResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_metadata(metadata)?;
    writer
        .write_u32(bytes.len() as u32)
        .await
        .map_err(|e| TransferError::transport("send metadata length", e))?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| TransferError::transport("send metadata", e))?;
    Ok(())
}

/// Read the length prefix and metadata block
pub async fn read_header<R>(reader: &mut R) -> TransferResult<TransferMetadata>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            TransferError::Protocol("peer closed before metadata length".into())
        }
        _ => TransferError::transport("read metadata length", e),
    })?;

    if len > MAX_METADATA_LEN {
        return Err(TransferError::Protocol(format!(
            "metadata length {len} exceeds limit {MAX_METADATA_LEN}"
        )));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => TransferError::Protocol(format!(
            "peer closed before {len} metadata bytes arrived"
        )),
        _ => TransferError::transport("read metadata", e),
    })?;

    decode_metadata(&buf)
}

/// Send an acknowledgment in a single write
pub async fn write_ack<W>(writer: &mut W, ack: &Ack) -> TransferResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(ack)
        .map_err(|e| TransferError::Protocol(format!("ack encode: {e}")))?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| TransferError::transport("send ack", e))?;
    writer
        .flush()
        .await
        .map_err(|e| TransferError::transport("flush ack", e))?;
    Ok(())
}

/// Read an acknowledgment.
///
/// The ack is not length-prefixed, so bytes are accumulated until they
/// parse as one complete JSON object. Works whether or not the peer
/// half-closes after writing.
pub async fn read_ack<R>(reader: &mut R) -> TransferResult<Ack>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(256);
    let mut chunk = [0u8; 1024];

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| TransferError::transport("read ack", e))?;

        if n == 0 {
            return Err(if buf.is_empty() {
                TransferError::Transport("connection closed before acknowledgment".into())
            } else {
                TransferError::Protocol("truncated acknowledgment".into())
            });
        }
        buf.extend_from_slice(&chunk[..n]);

        match serde_json::from_slice::<Ack>(&buf) {
            Ok(ack) => return Ok(ack),
            Err(e) if e.is_eof() && buf.len() < MAX_ACK_LEN => continue,
            Err(e) => {
                return Err(TransferError::Protocol(format!("malformed acknowledgment: {e}")))
            }
        }
    }
}
