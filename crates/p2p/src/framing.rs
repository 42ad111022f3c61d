//! Stream framing: one direction byte, a little-endian length, then the
//! payload (hello or sealed envelope).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::SessionError;

/// Frame direction marker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    ToServer,
    ToClient,
}

impl Direction {
    pub fn byte(&self) -> u8 {
        match self {
            Direction::ToServer => 0x00,
            Direction::ToClient => 0x01,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, SessionError> {
        match b {
            0x00 => Ok(Direction::ToServer),
            0x01 => Ok(Direction::ToClient),
            other => Err(SessionError::BadPacket(format!(
                "unknown direction byte {other:#04x}"
            ))),
        }
    }
}

/// Frames above this size are junk or abuse.
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    direction: Direction,
    payload: &[u8],
) -> Result<(), SessionError> {
    writer.write_u8(direction.byte()).await?;
    writer.write_u32_le(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(Direction, Vec<u8>), SessionError> {
    let direction = Direction::from_byte(reader.read_u8().await?);
    let len = reader.read_u32_le().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(SessionError::BadPacket(format!("frame of {len} bytes")));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok((direction, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let (mut client_rx, mut client_tx) = tokio::io::split(client);
        let (mut server_rx, _server_tx) = tokio::io::split(server);

        write_frame(&mut client_tx, Direction::ToServer, b"hello")
            .await
            .unwrap();
        let (direction, payload) = read_frame(&mut server_rx).await.unwrap();
        assert_eq!(direction, Direction::ToServer);
        assert_eq!(payload, b"hello");

        drop(client_rx);
    }

    #[tokio::test]
    async fn test_bad_direction_byte() {
        let (client, server) = tokio::io::duplex(64);
        let (_c_rx, mut c_tx) = tokio::io::split(client);
        let (mut s_rx, _s_tx) = tokio::io::split(server);

        use tokio::io::AsyncWriteExt;
        c_tx.write_all(&[0x07, 0, 0, 0, 0]).await.unwrap();
        let res = read_frame(&mut s_rx).await;
        assert!(matches!(res, Err(SessionError::BadPacket(_))));
    }
}
