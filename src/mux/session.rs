//! Stream multiplexer over a single physical connection.
//!
//! A [`Session`] owns one reader task and one writer task. Logical streams
//! are identified by `u32` IDs chosen by the dialing side; the accepting side
//! registers interest in an ID and is handed the stream once the peer opens
//! it. When the physical link goes away every stream ends, which surfaces to
//! callers as a transport error.

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::frame::{Frame, FrameCodec, FrameKind};
use crate::config::MuxConfig;
use crate::errors::{Error, Result};

enum AcceptSlot {
    Waiting(oneshot::Sender<Channel>),
    Arrived(Channel),
}

struct SessionInner {
    outbound: mpsc::UnboundedSender<Frame>,
    streams: DashMap<u32, mpsc::UnboundedSender<Bytes>>,
    accepts: DashMap<u32, AcceptSlot>,
    closed: CancellationToken,
    accept_timeout: Duration,
    max_payload: usize,
}

impl SessionInner {
    fn register(self: &Arc<Self>, id: u32) -> Channel {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.streams.insert(id, tx).is_some() {
            warn!(stream_id = id, "Stream ID reused while still open; replacing");
        }
        Channel {
            id,
            sender: ChannelSender { id, session: Arc::clone(self) },
            receiver: ChannelReceiver { id, rx, session: Arc::clone(self) },
        }
    }

    fn close_stream(&self, id: u32) {
        if self.streams.remove(&id).is_some() {
            let _ = self.outbound.send(Frame::close(id));
        }
    }

    fn shutdown(&self) {
        self.closed.cancel();
        self.streams.clear();
        self.accepts.clear();
    }

    fn on_open(self: &Arc<Self>, id: u32) {
        let channel = self.register(id);
        match self.accepts.entry(id) {
            Entry::Occupied(slot) => match slot.remove() {
                AcceptSlot::Waiting(waiter) => {
                    // A dropped waiter drops the channel, which closes it.
                    let _ = waiter.send(channel);
                }
                AcceptSlot::Arrived(stale) => {
                    drop(stale);
                    self.accepts.insert(id, AcceptSlot::Arrived(channel));
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(AcceptSlot::Arrived(channel));
            }
        }
    }
}

/// Multiplexed connection between a host and a plugin.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Start the reader and writer tasks over `io`.
    pub fn new<T>(io: T, config: &MuxConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            outbound,
            streams: DashMap::new(),
            accepts: DashMap::new(),
            closed: CancellationToken::new(),
            accept_timeout: config.accept_timeout(),
            max_payload: config.max_frame_bytes,
        });

        let writer = FramedWrite::new(write_half, FrameCodec::new(config.max_frame_bytes));
        tokio::spawn(write_loop(writer, outbound_rx, inner.closed.clone()));

        let reader = FramedRead::new(read_half, FrameCodec::new(config.max_frame_bytes));
        tokio::spawn(read_loop(reader, Arc::clone(&inner)));

        Self { inner }
    }

    /// Open stream `id` towards the peer.
    pub fn open(&self, id: u32) -> Result<Channel> {
        if self.is_closed() {
            return Err(Error::transport("session is closed"));
        }
        let channel = self.inner.register(id);
        self.inner
            .outbound
            .send(Frame::open(id))
            .map_err(|_| Error::transport("session is closed"))?;
        trace!(stream_id = id, "Opened stream");
        Ok(channel)
    }

    /// Wait for the peer to open stream `id`.
    ///
    /// Fails with a transport error after the configured accept timeout or
    /// when the session closes first. Dropping the future gives up the slot.
    pub async fn accept(&self, id: u32) -> Result<Channel> {
        if self.is_closed() {
            return Err(Error::transport("session is closed"));
        }
        let waiter = match self.inner.accepts.entry(id) {
            Entry::Occupied(slot) => match slot.remove() {
                AcceptSlot::Arrived(channel) => return Ok(channel),
                AcceptSlot::Waiting(_) => {
                    return Err(Error::transport(format!("stream {} is already being accepted", id)))
                }
            },
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(AcceptSlot::Waiting(tx));
                rx
            }
        };
        let _slot = WaitingSlot { inner: &self.inner, id };

        match tokio::time::timeout(self.inner.accept_timeout, waiter).await {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(_)) => Err(Error::transport("session closed while accepting")),
            Err(_) => Err(Error::transport(format!("timeout waiting for connection {}", id))),
        }
    }

    /// Close the session and every stream on it.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the session is closed from either side.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Close stream `id` for both sides.
    pub fn close_stream(&self, id: u32) {
        self.inner.close_stream(id);
    }

    /// Largest payload a single frame on this session carries.
    pub fn max_frame_bytes(&self) -> usize {
        self.inner.max_payload
    }

    /// Number of streams currently open.
    pub fn stream_count(&self) -> usize {
        self.inner.streams.len()
    }

    /// Accept calls still waiting for their peer.
    pub fn pending_accepts(&self) -> usize {
        self.inner.accepts.iter().filter(|slot| matches!(slot.value(), AcceptSlot::Waiting(_))).count()
    }
}

/// Frees an accept slot when its waiter finishes or is dropped.
///
/// A slot the reader already filled is no longer `Waiting` and stays put.
struct WaitingSlot<'a> {
    inner: &'a SessionInner,
    id: u32,
}

impl Drop for WaitingSlot<'_> {
    fn drop(&mut self) {
        self.inner.accepts.remove_if(&self.id, |_, slot| matches!(slot, AcceptSlot::Waiting(_)));
    }
}

async fn write_loop<W>(
    mut writer: FramedWrite<W, FrameCodec>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    closed: CancellationToken,
) where
    W: AsyncWrite + Send + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let stream_id = frame.stream_id;
                match writer.send(frame).await {
                    Ok(()) => {}
                    // The codec refuses an oversized frame before writing any of it.
                    Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                        warn!(stream_id, error = %e, "Dropping frame that does not fit the link");
                    }
                    Err(e) => {
                        debug!(error = %e, "Session write failed");
                        closed.cancel();
                        break;
                    }
                }
            }
            _ = closed.cancelled() => break,
        }
    }
    // Shutting down the write half lets the peer observe EOF.
    let _ = writer.close().await;
}

async fn read_loop<R>(mut reader: FramedRead<R, FrameCodec>, inner: Arc<SessionInner>)
where
    R: AsyncRead + Send + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = reader.next() => frame,
            _ = inner.closed.cancelled() => break,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(error = %e, "Session read failed; closing");
                break;
            }
            None => {
                debug!("Session reached end of stream");
                break;
            }
        };

        match frame.kind {
            FrameKind::Open => inner.on_open(frame.stream_id),
            FrameKind::Data => match inner.streams.get(&frame.stream_id) {
                Some(stream) => {
                    let _ = stream.send(frame.payload);
                }
                None => trace!(stream_id = frame.stream_id, "Dropping data for unknown stream"),
            },
            FrameKind::Close => {
                inner.streams.remove(&frame.stream_id);
            }
        }
    }
    inner.shutdown();
}

/// A bidirectional logical stream.
pub struct Channel {
    id: u32,
    sender: ChannelSender,
    receiver: ChannelReceiver,
}

impl Channel {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn split(self) -> (ChannelSender, ChannelReceiver) {
        (self.sender, self.receiver)
    }
}

/// Sending half of a [`Channel`]; cheap to clone.
#[derive(Clone)]
pub struct ChannelSender {
    id: u32,
    session: Arc<SessionInner>,
}

impl ChannelSender {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Queue `payload` as one frame.
    ///
    /// A payload larger than the frame limit fails this call only.
    pub fn send(&self, payload: Bytes) -> Result<()> {
        if payload.len() > self.session.max_payload {
            return Err(Error::transport("payload exceeds max frame size"));
        }
        if !self.session.streams.contains_key(&self.id) {
            return Err(Error::transport(format!("stream {} is closed", self.id)));
        }
        self.session
            .outbound
            .send(Frame::data(self.id, payload))
            .map_err(|_| Error::transport("session is closed"))
    }

    pub fn is_closed(&self) -> bool {
        !self.session.streams.contains_key(&self.id)
    }

    /// Largest payload a single [`send`](Self::send) accepts.
    pub fn max_payload(&self) -> usize {
        self.session.max_payload
    }

    /// Close the stream for both sides.
    pub fn close(&self) {
        self.session.close_stream(self.id);
    }
}

/// Receiving half of a [`Channel`]. Dropping it closes the stream.
pub struct ChannelReceiver {
    id: u32,
    rx: mpsc::UnboundedReceiver<Bytes>,
    session: Arc<SessionInner>,
}

impl ChannelReceiver {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Next payload, or `None` once the stream or session is closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for ChannelReceiver {
    fn drop(&mut self) {
        self.session.close_stream(self.id);
    }
}
