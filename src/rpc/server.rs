//! Serving side of a broker stream.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::message::{Message, RpcStatus};
use crate::logical::Context;
use crate::mux::Channel;

/// An RPC service bound to one broker stream.
#[async_trait]
pub trait Service: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &'static str {
        "service"
    }

    async fn call(
        &self,
        ctx: Context,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, RpcStatus>;

    /// Handle a one-way message. Runs before any later message on the stream.
    async fn notify(&self, method: &str, _body: serde_json::Value) {
        debug!(method, "Ignoring unknown notification");
    }
}

/// Decode a call body into its request type.
pub fn decode_body<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, RpcStatus> {
    serde_json::from_value(body).map_err(|e| RpcStatus::invalid_argument(e.to_string()))
}

/// Encode a reply body.
pub fn encode_body<T: Serialize>(value: &T) -> Result<serde_json::Value, RpcStatus> {
    serde_json::to_value(value).map_err(|e| RpcStatus::internal(e.to_string()))
}

/// Decode `body`, run `handler` on it and encode what it returns.
pub async fn answer<A, R, F, Fut>(body: serde_json::Value, handler: F) -> Result<serde_json::Value, RpcStatus>
where
    A: DeserializeOwned,
    R: Serialize,
    F: FnOnce(A) -> Fut,
    Fut: Future<Output = R>,
{
    let args = decode_body(body)?;
    encode_body(&handler(args).await)
}

/// Serve `service` on `channel` until the stream closes.
///
/// Calls run concurrently on their own tasks. Notifications run inline, so a
/// notification is fully applied before any later call on the stream starts.
/// A caller that goes away does not stop its call.
pub async fn serve(channel: Channel, service: Arc<dyn Service>) {
    let (sender, mut receiver) = channel.split();

    while let Some(payload) = receiver.recv().await {
        let message = match Message::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable RPC message");
                continue;
            }
        };

        match message {
            Message::Call { seq, method, body } => {
                let service = Arc::clone(&service);
                let sender = sender.clone();
                tokio::spawn(async move {
                    trace!(seq, method = %method, "Handling RPC call");
                    let reply = match service.call(Context::background(), &method, body).await {
                        Ok(body) => Message::Reply { seq, body: Some(body), error: None },
                        Err(status) => Message::Reply { seq, body: None, error: Some(status) },
                    };
                    let bytes = match reply.encode() {
                        Ok(bytes) if bytes.len() > sender.max_payload() => {
                            warn!(seq, method = %method, bytes = bytes.len(), "Reply exceeds max frame size");
                            let status = RpcStatus::internal("reply exceeds max frame size");
                            Message::Reply { seq, body: None, error: Some(status) }.encode()
                        }
                        other => other,
                    };
                    match bytes {
                        Ok(bytes) => {
                            if let Err(e) = sender.send(bytes) {
                                debug!(seq, method = %method, error = %e, "Caller went away before reply");
                            }
                        }
                        Err(e) => warn!(seq, method = %method, error = %e, "Failed to encode reply"),
                    }
                });
            }
            Message::Notify { method, body } => service.notify(&method, body).await,
            Message::Reply { seq, .. } => debug!(seq, "Unexpected reply on server stream"),
        }
    }
    debug!(service = service.name(), "RPC stream closed");
}
