//! Connection broker: issues stream IDs and serves RPC services on them.
//!
//! IDs are partitioned by side so both processes can reserve them without
//! coordination. The host issues odd IDs, the plugin even IDs from 2, and
//! ID 0 is reserved for the primary Backend service.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

use super::session::{Channel, Session};
use crate::broker_span;
use crate::errors::Result;
use crate::rpc::{self, Service};

/// Stream ID carrying the primary Backend service.
pub const BACKEND_STREAM_ID: u32 = 0;

/// Which end of the link a broker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Host,
    Plugin,
}

impl Side {
    fn first_id(self) -> u32 {
        match self {
            Side::Host => 1,
            Side::Plugin => 2,
        }
    }
}

pub struct Broker {
    session: Session,
    side: Side,
    next_id: AtomicU32,
}

impl Broker {
    pub fn new(session: Session, side: Side) -> Self {
        Self { session, side, next_id: AtomicU32::new(side.first_id()) }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reserve a fresh stream ID, unique for the lifetime of the session.
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(2, Ordering::Relaxed)
    }

    /// Wait in the background for the peer to dial `id`, then serve `service`
    /// on the stream until it closes.
    pub fn accept_and_serve(&self, id: u32, service: Arc<dyn Service>) -> ServeHandle {
        let session = self.session.clone();
        let name = service.name();
        let serving = session.clone();
        let task = tokio::spawn(
            async move {
                match serving.accept(id).await {
                    Ok(channel) => {
                        debug!("Broker stream accepted");
                        rpc::serve(channel, service).await;
                        debug!("Broker stream finished");
                    }
                    Err(e) => warn!(error = %e, "Broker stream was never dialed"),
                }
            }
            .instrument(broker_span!(id, name)),
        );
        ServeHandle::new(id, session, task)
    }

    /// Connect to a stream the peer is accepting on.
    pub fn dial(&self, id: u32) -> Result<Channel> {
        self.session.open(id)
    }
}

/// Background task serving one broker stream.
pub struct ServeHandle {
    id: u32,
    session: Session,
    task: JoinHandle<()>,
}

impl ServeHandle {
    pub(crate) fn new(id: u32, session: Session, task: JoinHandle<()>) -> Self {
        Self { id, session, task }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop serving and close the stream for the peer.
    pub fn close(&self) {
        self.task.abort();
        self.session.close_stream(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MuxConfig;

    #[tokio::test]
    async fn test_ids_are_partitioned_by_side() {
        let (a, b) = tokio::io::duplex(1024);
        let config = MuxConfig::default();
        let host = Broker::new(Session::new(a, &config), Side::Host);
        let plugin = Broker::new(Session::new(b, &config), Side::Plugin);

        let host_ids: Vec<u32> = (0..3).map(|_| host.next_id()).collect();
        let plugin_ids: Vec<u32> = (0..3).map(|_| plugin.next_id()).collect();
        assert_eq!(host_ids, vec![1, 3, 5]);
        assert_eq!(plugin_ids, vec![2, 4, 6]);
        assert!(!host_ids.contains(&BACKEND_STREAM_ID));
        assert!(!plugin_ids.contains(&BACKEND_STREAM_ID));
    }
}
