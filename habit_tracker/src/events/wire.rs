//! Length-delimited record framing for the event bus.
//!
//! Each record is a u32 little-endian length prefix followed by the
//! bincode payload, capped to prevent unbounded allocation on the
//! consumer side.

use serde::{de::DeserializeOwned, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed record size (1MB)
const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// Write one length-prefixed record.
///
/// The prefix and payload go out in a single write so a reader never
/// observes a length without its payload.
pub async fn write_record<T, W>(writer: &mut W, value: &T) -> io::Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let serialized = bincode::serialize(value)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record serialization failed"))?;

    if serialized.len() > MAX_RECORD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "record size {} exceeds maximum of {} bytes",
                serialized.len(),
                MAX_RECORD_SIZE
            ),
        ));
    }

    let size = serialized.len() as u32;
    let mut buf = Vec::with_capacity(4 + serialized.len());
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&serialized);
    writer.write_all(&buf).await?;
    Ok(())
}

/// Read one length-prefixed record.
pub async fn read_record<T, R>(reader: &mut R) -> io::Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_RECORD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("record size {} exceeds maximum of {} bytes", len, MAX_RECORD_SIZE),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    bincode::deserialize(&buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record deserialization failed"))
}
