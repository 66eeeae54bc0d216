//! Length-prefixed framing for handshake messages
//!
//! A frame is a big-endian `u32` length followed by that many bytes of
//! `bincode`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::messages::Message;
use super::TransportError;

/// Largest frame either side will send or accept
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = bincode::serialize(message)
        .map_err(|e| TransportError::Codec(format!("failed to serialize {}: {}", message.kind(), e)))?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(TransportError::Codec(format!(
            "{} frame of {} bytes exceeds {}",
            message.kind(),
            bytes.len(),
            MAX_FRAME_SIZE
        )));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    tracing::debug!("sent {} frame ({} bytes)", message.kind(), bytes.len());
    Ok(())
}

pub async fn read_message<R>(reader: &mut R) -> Result<Message, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::Codec(format!(
            "incoming frame of {} bytes exceeds {}",
            len, MAX_FRAME_SIZE
        )));
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await?;
    let message: Message = bincode::deserialize(&bytes)
        .map_err(|e| TransportError::Codec(format!("failed to deserialize frame: {}", e)))?;
    tracing::debug!("received {} frame ({} bytes)", message.kind(), len);
    Ok(message)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::transport::messages::Proof;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let signature = SecretKey::generate().sign(b"transcript");
        write_message(&mut a, &Message::Proof(Proof { signature }))
            .await
            .unwrap();
        match read_message(&mut b).await.unwrap() {
            Message::Proof(proof) => assert_eq!(proof.signature, signature),
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_u32(MAX_FRAME_SIZE as u32 + 1).await.unwrap();
        assert!(matches!(
            read_message(&mut b).await,
            Err(TransportError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_u32(4).await.unwrap();
        a.write_all(&[0xff; 4]).await.unwrap();
        assert!(matches!(
            read_message(&mut b).await,
            Err(TransportError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_io_error() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_u32(16).await.unwrap();
        drop(a);
        assert!(matches!(read_message(&mut b).await, Err(TransportError::Io(_))));
    }
}
