//! Async frame read/write over a split TCP stream, shared by the accept
//! loop and the outbound dialer.

use {
    crate::{error::{NetError, Result}, outbound_queue::OutboundQueue},
    log::debug,
    supernet_codec::{decode_frame, encode_frame, read_frame_len, Compression, Message, NodeId, FRAME_HEADER_LEN},
    tokio::{
        io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
        net::TcpStream,
        sync::mpsc,
    },
};

/// Read one complete, decompressed [`Message`] off `reader`.
///
/// Enforces `max_frame_size` against the frame's declared length before
/// reading the body, so an oversized claim can't be used to force an
/// unbounded allocation.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R, max_frame_size: usize) -> Result<Message> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let len = read_frame_len(header[0..4].try_into().expect("4 bytes"));
    if len > max_frame_size {
        return Err(NetError::FrameTooLarge);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&body);

    let raw = decode_frame(&frame, max_frame_size)?;
    Ok(Message::deserialize(&raw)?)
}

/// Encode and write one [`Message`] to `writer`, flushing afterward.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
    compression: Compression,
    max_frame_size: usize,
) -> Result<()> {
    let body = msg.serialize()?;
    let frame = encode_frame(&body, compression, max_frame_size)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// A message received from an already-handshaked peer.
#[derive(Debug)]
pub struct InboundEnvelope {
    /// Which peer sent it.
    pub node_id: NodeId,
    /// The decoded message.
    pub message: Message,
}

/// Splits a handshaked `stream` into independent reader and writer tasks:
/// the reader forwards every decoded message to `inbound_tx`, tagged with
/// `node_id`; the writer drains `outbound` and writes each message to the
/// socket. Both tasks exit (and close the peer) on the first I/O or codec
/// error, or once the outbound queue closes. The caller should keep an
/// `outbound.handle()` clone from before calling this to actually enqueue
/// sends for the peer.
pub fn spawn_peer_io(
    stream: TcpStream,
    node_id: NodeId,
    max_frame_size: usize,
    compression: Compression,
    inbound_tx: mpsc::Sender<InboundEnvelope>,
    mut outbound: OutboundQueue,
) {
    let (mut read_half, mut write_half) = stream.into_split();

    tokio::spawn(async move {
        loop {
            match read_message(&mut read_half, max_frame_size).await {
                Ok(message) => {
                    if inbound_tx.send(InboundEnvelope { node_id, message }).await.is_err() {
                        debug!("peer {node_id}: inbound channel closed, stopping reader");
                        break;
                    }
                }
                Err(e) => {
                    debug!("peer {node_id}: reader stopping: {e}");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(message) = outbound.pop().await {
            if let Err(e) = write_message(&mut write_half, &message, compression, max_frame_size).await {
                debug!("peer {node_id}: writer stopping: {e}");
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let mut buf = Vec::new();
        let msg = Message::Ping { uptime_pct: 77 };
        write_message(&mut buf, &msg, Compression::None, 4096).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_message(&mut cursor, 4096).await.unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_oversized_declared_length_rejected_before_reading_body() {
        let mut buf = Vec::new();
        let msg = Message::Ping { uptime_pct: 1 };
        write_message(&mut buf, &msg, Compression::None, 4096).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let err = read_message(&mut cursor, 1).await.unwrap_err();
        assert!(matches!(err, NetError::FrameTooLarge));
    }
}
