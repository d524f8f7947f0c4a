//! Calling side of a broker stream.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::message::{Message, RpcStatus};
use crate::errors::{Error, Result};
use crate::mux::{Channel, ChannelReceiver, ChannelSender};

type ReplyResult = std::result::Result<serde_json::Value, RpcStatus>;

struct ClientInner {
    sender: ChannelSender,
    pending: DashMap<u64, oneshot::Sender<ReplyResult>>,
    next_seq: AtomicU64,
    closed: CancellationToken,
}

impl ClientInner {
    fn send(&self, message: &Message) -> Result<()> {
        self.sender.send(message.encode()?)
    }

    fn shutdown(&self) {
        self.closed.cancel();
        // Dropping the reply senders fails every outstanding call.
        self.pending.clear();
    }
}

/// Removes its pending entry when the call ends or its future is dropped.
struct PendingCall<'a> {
    inner: &'a ClientInner,
    seq: u64,
    finished: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.inner.pending.remove(&self.seq);
    }
}

/// Multiplexed RPC client; clones share one stream.
///
/// Replies may arrive in any order and are matched by sequence number.
/// Calls carry no deadline.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    pub fn new(channel: Channel) -> Self {
        let (sender, receiver) = channel.split();
        let inner = Arc::new(ClientInner {
            sender,
            pending: DashMap::new(),
            next_seq: AtomicU64::new(1),
            closed: CancellationToken::new(),
        });
        tokio::spawn(read_replies(receiver, Arc::clone(&inner)));
        Self { inner }
    }

    pub async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        if self.is_closed() {
            return Err(Error::transport(format!("connection closed before {}", method)));
        }

        let body = serde_json::to_value(req)
            .map_err(|e| Error::codec(e, format!("failed to encode {} request", method)))?;
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(seq, tx);
        let mut guard = PendingCall { inner: &self.inner, seq, finished: false };

        if self.is_closed() {
            return Err(Error::transport(format!("connection closed before {}", method)));
        }

        self.inner.send(&Message::Call { seq, method: method.to_string(), body })?;
        trace!(seq, method, "Sent RPC call");

        let reply = rx.await;
        guard.finished = true;

        match reply {
            Ok(Ok(value)) => serde_json::from_value(value)
                .map_err(|e| Error::codec(e, format!("failed to decode {} reply", method))),
            Ok(Err(status)) => Err(status.into_error(method)),
            Err(_) => Err(Error::transport(format!("connection closed during {}", method))),
        }
    }

    /// Send a one-way message. Returns once it is queued.
    pub fn notify<Req: Serialize>(&self, method: &str, req: &Req) -> Result<()> {
        if self.is_closed() {
            return Err(Error::transport(format!("connection closed before {}", method)));
        }
        let body = serde_json::to_value(req)
            .map_err(|e| Error::codec(e, format!("failed to encode {} notification", method)))?;
        self.inner.send(&Message::Notify { method: method.to_string(), body })
    }

    /// Close the stream and fail every outstanding call.
    pub fn close(&self) {
        self.inner.shutdown();
        self.inner.sender.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled() || self.inner.sender.is_closed()
    }

    /// Calls waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }
}

async fn read_replies(mut receiver: ChannelReceiver, inner: Arc<ClientInner>) {
    loop {
        let payload = tokio::select! {
            payload = receiver.recv() => payload,
            _ = inner.closed.cancelled() => break,
        };
        let Some(payload) = payload else { break };

        match Message::decode(&payload) {
            Ok(Message::Reply { seq, body, error }) => {
                let result = match error {
                    Some(status) => Err(status),
                    None => Ok(body.unwrap_or(serde_json::Value::Null)),
                };
                match inner.pending.remove(&seq) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(result);
                    }
                    None => trace!(seq, "Reply for abandoned call"),
                }
            }
            Ok(other) => debug!(message = ?other, "Unexpected message on client stream"),
            Err(e) => debug!(error = %e, "Undecodable message on client stream"),
        }
    }
    debug!(stream_id = receiver.id(), "RPC client stream ended");
    inner.shutdown();
}
