//! Plugin side of the process lifecycle: the entry point of a plugin binary.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::handshake::{
    decode_versions, negotiate, HandshakeConfig, HandshakeLine, Network, METADATA_MODE_ENV,
    PROTOCOL_VERSIONS_ENV,
};
use crate::config::MuxConfig;
use crate::errors::{Error, Result};
use crate::logical::BackendFactory;
use crate::mux::{Broker, Session, Side, BACKEND_STREAM_ID};
use crate::rpc;
use crate::transport::{legacy, modern, TransportKind};

/// Settings of a plugin process.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub handshake: HandshakeConfig,
    /// Transports this plugin implements.
    pub transports: Vec<TransportKind>,
    pub mux: MuxConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            transports: vec![TransportKind::Modern, TransportKind::Legacy],
            mux: MuxConfig::default(),
        }
    }
}

impl ServeConfig {
    /// Defaults with multiplexer settings taken from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self { mux: MuxConfig::from_env()?, ..Default::default() })
    }
}

/// Serve the backend built by `factory` to the host that spawned this process.
///
/// Returns once the host disconnects. Fails immediately when the process was
/// not started by a plugin host.
pub async fn serve(factory: Arc<dyn BackendFactory>, config: ServeConfig) -> Result<()> {
    if !config.handshake.cookie_present() {
        eprintln!(
            "This binary is a plugin. These are not meant to be executed directly.\n\
             Please execute the program that consumes these plugins, which will\n\
             load any plugins automatically."
        );
        return Err(Error::handshake("magic cookie not present in environment"));
    }

    let offered = match std::env::var(PROTOCOL_VERSIONS_ENV) {
        Ok(raw) => decode_versions(&raw),
        Err(_) => vec![TransportKind::Legacy],
    };
    let transport = negotiate(&offered, &config.transports).ok_or_else(|| {
        Error::handshake(format!(
            "incompatible protocol versions: host offered {:?}, plugin supports {:?}",
            offered, config.transports
        ))
    })?;
    let metadata_mode = std::env::var(METADATA_MODE_ENV)
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    debug!(%transport, metadata_mode, "Negotiated plugin transport");
    listen_and_serve(factory, transport, metadata_mode, &config.mux).await
}

#[cfg(unix)]
async fn listen_and_serve(
    factory: Arc<dyn BackendFactory>,
    transport: TransportKind,
    metadata_mode: bool,
    mux: &MuxConfig,
) -> Result<()> {
    let path = std::env::temp_dir().join(format!("backend-plugin-{}.sock", uuid::Uuid::new_v4()));
    let listener = tokio::net::UnixListener::bind(&path)
        .map_err(|e| Error::io(e, format!("failed to bind {}", path.display())))?;

    let line = HandshakeLine::new(transport, Network::Unix, path.display().to_string());
    announce(&line).await?;

    let accepted = listener.accept().await;
    let _ = std::fs::remove_file(&path);
    let (stream, _) = accepted.map_err(|e| Error::io(e, "failed to accept host connection"))?;
    serve_connection(stream, factory, transport, metadata_mode, mux).await
}

#[cfg(not(unix))]
async fn listen_and_serve(
    factory: Arc<dyn BackendFactory>,
    transport: TransportKind,
    metadata_mode: bool,
    mux: &MuxConfig,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::io(e, "failed to bind loopback listener"))?;
    let addr = listener.local_addr()?;

    let line = HandshakeLine::new(transport, Network::Tcp, addr.to_string());
    announce(&line).await?;

    let (stream, _) =
        listener.accept().await.map_err(|e| Error::io(e, "failed to accept host connection"))?;
    stream.set_nodelay(true)?;
    serve_connection(stream, factory, transport, metadata_mode, mux).await
}

async fn announce(line: &HandshakeLine) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{}\n", line).as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Serve the backend over an already-established link.
///
/// Waits for the host to open the Backend stream and serves it until the
/// host closes it or the link drops.
pub async fn serve_connection<T>(
    io: T,
    factory: Arc<dyn BackendFactory>,
    transport: TransportKind,
    metadata_mode: bool,
    mux: &MuxConfig,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let session = Session::new(io, mux);
    let broker = Arc::new(Broker::new(session.clone(), Side::Plugin));

    // The host dials the Backend stream whenever it dispenses, which may be
    // later than one accept timeout.
    let channel = loop {
        match session.accept(BACKEND_STREAM_ID).await {
            Ok(channel) => break channel,
            Err(_) if !session.is_closed() => continue,
            Err(e) => return Err(e),
        }
    };

    info!(%transport, metadata_mode, "Serving backend");
    match transport {
        TransportKind::Legacy => {
            let service = Arc::new(legacy::BackendServer::new(Arc::clone(&broker), factory, metadata_mode));
            rpc::serve(channel, service).await;
        }
        TransportKind::Modern => {
            let server = modern::BackendServer::new(
                Arc::clone(&broker),
                factory,
                metadata_mode,
                mux.max_frame_bytes,
            );
            if let Err(e) = modern::server::serve(server, channel).await {
                warn!(error = %e, "Backend service stopped");
            }
        }
    }
    session.close();
    debug!("Backend stream closed; plugin exiting");
    Ok(())
}
