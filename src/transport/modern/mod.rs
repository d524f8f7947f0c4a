//! Modern transport (protocol version 5).
//!
//! The Backend service is a gRPC service served on the primary broker
//! stream, and a single broker stream opened at setup serves the Storage and
//! SystemView services for the life of the backend. Each broker stream
//! carries its own HTTP/2 connection. Messages are JSON through
//! [`codec::JsonCodec`] and errors cross as typed
//! [`WireError`](crate::translate::WireError) values. Every call carries the
//! caller's remaining deadline as `grpc-timeout`, and dropping or cancelling
//! a call resets its HTTP/2 stream, which aborts it on the plugin. The plugin
//! logs locally instead of through the host.

pub mod client;
pub mod codec;
pub mod proto;
pub mod resources;
pub mod server;

pub use client::BackendClient;
pub use server::BackendServer;

use std::future::Future;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Endpoint, Uri};
use tonic::{Code, Status};

use crate::errors::Error;
use crate::logical::Context;
use crate::mux::Channel;
use crate::rpc::StatusCode;

/// Placeholder authority; the connection is always the given broker stream.
const ENDPOINT: &str = "http://backend.plugin";

/// Lazily connected gRPC channel over a dialed broker stream.
///
/// The stream backs exactly one HTTP/2 connection; a reconnect attempt
/// after it breaks fails immediately.
pub(crate) fn connect_lazy(channel: Channel) -> tonic::transport::Channel {
    let (io, _ended) = channel.into_io();
    let mut io = Some(io);
    Endpoint::from_static(ENDPOINT).connect_with_connector_lazy(tower::service_fn(move |_: Uri| {
        let io = io.take();
        async move {
            io.map(hyper_util::rt::TokioIo::new).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "broker stream already used")
            })
        }
    }))
}

/// Incoming connections of a server bound to one broker stream.
pub(crate) fn single_connection(
    io: DuplexStream,
) -> impl futures::Stream<Item = Result<DuplexStream, std::io::Error>> {
    use futures::StreamExt;
    futures::stream::iter([Ok(io)]).chain(futures::stream::pending())
}

/// Resolves once the broker stream behind a server ends.
pub(crate) async fn stream_ended(ended: CancellationToken) {
    ended.cancelled_owned().await
}

/// Map a gRPC status onto the transport error taxonomy.
pub(crate) fn status_to_error(method: &str, status: Status) -> Error {
    let method = method.to_string();
    let message = status.message().to_string();
    match status.code() {
        Code::DeadlineExceeded => Error::DeadlineExceeded { method },
        Code::Cancelled => Error::Cancelled { method },
        Code::Unimplemented => Error::Rpc { method, code: StatusCode::UnknownMethod, message },
        Code::InvalidArgument => Error::Rpc { method, code: StatusCode::InvalidArgument, message },
        Code::Unavailable => Error::Rpc { method, code: StatusCode::Unavailable, message },
        Code::Internal => Error::Rpc { method, code: StatusCode::Internal, message },
        Code::OutOfRange | Code::ResourceExhausted => {
            Error::transport(format!("{}: payload exceeds max frame size: {}", method, message))
        }
        _ => Error::transport(format!("{} failed: {}", method, message)),
    }
}

/// Context for a served call, bounded by the caller's `grpc-timeout`.
pub(crate) fn request_context<T>(request: &tonic::Request<T>) -> Context {
    let timeout = request
        .metadata()
        .get("grpc-timeout")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout);
    match timeout {
        Some(timeout) => Context::background().with_timeout(timeout),
        None => Context::background(),
    }
}

/// Run `call` until it finishes or `ctx` is done.
pub(crate) async fn within<T, F>(ctx: &Context, call: F) -> Result<T, Status>
where
    F: Future<Output = Result<T, Status>>,
{
    tokio::select! {
        result = call => result,
        _ = ctx.done() => Err(if ctx.is_cancelled() {
            Status::cancelled("call cancelled by caller")
        } else {
            Status::deadline_exceeded("call deadline exceeded")
        }),
    }
}

/// Parse a `grpc-timeout` header value such as `250m` or `5S`.
fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount.saturating_mul(3600))),
        "M" => Some(Duration::from_secs(amount.saturating_mul(60))),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
