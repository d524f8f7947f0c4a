//! Byte-stream view of a [`Channel`].
//!
//! HTTP/2 needs an ordered byte pipe rather than discrete messages. The
//! bridge copies stream payloads into one end of an in-memory duplex and
//! chops whatever is written to it into frames no larger than the link
//! allows.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::session::Channel;

const CHUNK_BYTES: usize = 16 * 1024;
const PIPE_BYTES: usize = 64 * 1024;

impl Channel {
    /// Turn the channel into a byte stream.
    ///
    /// The returned token is cancelled once the peer closes the stream or
    /// the session ends. Dropping the duplex closes the stream for the peer.
    pub fn into_io(self) -> (DuplexStream, CancellationToken) {
        let id = self.id();
        let (local, remote) = tokio::io::duplex(PIPE_BYTES);
        let (mut pipe_rx, mut pipe_tx) = tokio::io::split(remote);
        let (sender, mut receiver) = self.split();
        let ended = CancellationToken::new();

        let inbound_ended = ended.clone();
        tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                if pipe_tx.write_all(&payload).await.is_err() {
                    break;
                }
            }
            let _ = pipe_tx.shutdown().await;
            inbound_ended.cancel();
            trace!(stream_id = id, "Inbound half of bridged stream ended");
        });

        let chunk = CHUNK_BYTES.min(sender.max_payload()).max(1);
        tokio::spawn(async move {
            let mut buf = vec![0u8; chunk];
            loop {
                match pipe_rx.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if sender.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                }
            }
            sender.close();
            trace!(stream_id = id, "Outbound half of bridged stream ended");
        });

        (local, ended)
    }
}
