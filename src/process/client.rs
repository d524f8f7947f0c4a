//! Host side of the plugin process lifecycle.

use sha2::{Digest, Sha256};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::handshake::{
    encode_versions, HandshakeConfig, HandshakeLine, Network, METADATA_MODE_ENV,
    PROTOCOL_VERSIONS_ENV,
};
use crate::config::{MuxConfig, PluginConfig};
use crate::errors::{Error, Result};
use crate::logical::PluginRunner;
use crate::mux::{Broker, Session, Side, BACKEND_STREAM_ID};
use crate::observability::PLUGIN_STDERR_TARGET;
use crate::rpc::RpcClient;
use crate::transport::{legacy, modern, PluginBackend, TransportKind};

/// A running plugin and the multiplexed link to it.
pub struct PluginClient {
    name: String,
    child: Mutex<Option<Child>>,
    session: Session,
    broker: Arc<Broker>,
    transport: TransportKind,
    metadata_mode: bool,
    dispensed: AtomicBool,
}

impl PluginClient {
    /// Spawn `runner`, complete the handshake and connect to the plugin.
    pub async fn start(runner: &PluginRunner, config: &PluginConfig) -> Result<Self> {
        Self::start_with(runner, config, &HandshakeConfig::default()).await
    }

    pub async fn start_with(
        runner: &PluginRunner,
        config: &PluginConfig,
        handshake: &HandshakeConfig,
    ) -> Result<Self> {
        if !runner.sha256.is_empty() {
            verify_checksum(runner).await?;
        }

        let mut command = Command::new(&runner.command);
        command
            .args(&runner.args)
            .envs(runner.env.iter().filter_map(|kv| kv.split_once('=')))
            .env(&handshake.magic_cookie_key, &handshake.magic_cookie_value)
            .env(PROTOCOL_VERSIONS_ENV, encode_versions(&config.client.transports))
            .env(METADATA_MODE_ENV, config.client.metadata_mode.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            Error::process(format!("failed to start plugin '{}': {}", runner.name, e))
        })?;
        debug!(plugin = %runner.name, pid = ?child.id(), "Spawned plugin process");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(runner.name.clone(), stderr));
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::process("plugin stdout was not captured"))?;
        let mut stdout = BufReader::new(stdout).lines();

        let read = tokio::time::timeout(config.client.start_timeout(), stdout.next_line()).await;
        let line = match read {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                let _ = child.start_kill();
                return Err(Error::handshake("plugin exited before we could connect"));
            }
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(Error::io(e, "failed to read plugin handshake"));
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(Error::handshake("timeout while waiting for plugin to start"));
            }
        };

        let handshake_line: HandshakeLine = match line.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };
        if !config.client.transports.contains(&handshake_line.transport) {
            let _ = child.start_kill();
            return Err(Error::handshake(format!(
                "plugin chose protocol version {} which was not offered",
                handshake_line.protocol_version
            )));
        }

        // Later stdout output is not part of the protocol.
        let name = runner.name.clone();
        tokio::spawn(async move {
            while let Ok(Some(line)) = stdout.next_line().await {
                debug!(target: PLUGIN_STDERR_TARGET, plugin = %name, stream = "stdout", "{}", line);
            }
        });

        let session = match connect(&handshake_line, &config.mux).await {
            Ok(session) => session,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };

        info!(
            plugin = %runner.name,
            transport = %handshake_line.transport,
            address = %handshake_line.address,
            metadata_mode = config.client.metadata_mode,
            "Connected to plugin"
        );

        let mut client = Self::from_session(
            runner.name.clone(),
            session,
            handshake_line.transport,
            config.client.metadata_mode,
        );
        client.child = Mutex::new(Some(child));
        Ok(client)
    }

    /// Wrap an already-connected link, for plugins served in-process.
    pub fn from_stream<T>(
        name: impl Into<String>,
        io: T,
        transport: TransportKind,
        metadata_mode: bool,
        mux: &MuxConfig,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::from_session(name.into(), Session::new(io, mux), transport, metadata_mode)
    }

    fn from_session(
        name: String,
        session: Session,
        transport: TransportKind,
        metadata_mode: bool,
    ) -> Self {
        let broker = Arc::new(Broker::new(session.clone(), Side::Host));
        Self {
            name,
            child: Mutex::new(None),
            session,
            broker,
            transport,
            metadata_mode,
            dispensed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn metadata_mode(&self) -> bool {
        self.metadata_mode
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Obtain the `"backend"` service of the plugin.
    ///
    /// A plugin serves exactly one backend, so this succeeds once.
    pub fn dispense(&self) -> Result<PluginBackend> {
        if self.dispensed.swap(true, Ordering::SeqCst) {
            return Err(Error::process(format!("backend of plugin '{}' already dispensed", self.name)));
        }
        let channel = self.broker.dial(BACKEND_STREAM_ID)?;
        let backend = match self.transport {
            TransportKind::Legacy => PluginBackend::Legacy(legacy::BackendClient::new(
                RpcClient::new(channel),
                Arc::clone(&self.broker),
                self.metadata_mode,
            )),
            TransportKind::Modern => PluginBackend::Modern(modern::BackendClient::new(
                channel,
                Arc::clone(&self.broker),
                self.metadata_mode,
                self.session.max_frame_bytes(),
            )),
        };
        Ok(backend)
    }

    /// Tear down the link and the process.
    ///
    /// Outstanding calls fail with a transport error.
    pub async fn kill(&self) -> Result<()> {
        self.session.close();
        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                warn!(plugin = %self.name, error = %e, "Failed to kill plugin process");
                return Err(Error::process(format!("failed to kill plugin '{}': {}", self.name, e)));
            }
            debug!(plugin = %self.name, "Plugin process killed");
        }
        Ok(())
    }
}

async fn verify_checksum(runner: &PluginRunner) -> Result<()> {
    let binary = tokio::fs::read(&runner.command)
        .await
        .map_err(|e| Error::io(e, format!("failed to read plugin binary '{}'", runner.command)))?;
    let digest = Sha256::digest(&binary);
    if digest.as_slice() != runner.sha256.as_slice() {
        return Err(Error::process(format!(
            "checksums did not match for plugin '{}': computed {:x}",
            runner.name, digest
        )));
    }
    Ok(())
}

async fn forward_stderr<R>(name: String, stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: PLUGIN_STDERR_TARGET, plugin = %name, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(plugin = %name, error = %e, "Stopped reading plugin stderr");
                break;
            }
        }
    }
}

async fn connect(line: &HandshakeLine, mux: &MuxConfig) -> Result<Session> {
    match line.network {
        #[cfg(unix)]
        Network::Unix => {
            let stream = tokio::net::UnixStream::connect(&line.address)
                .await
                .map_err(|e| Error::io(e, format!("failed to dial plugin at {}", line.address)))?;
            Ok(Session::new(stream, mux))
        }
        #[cfg(not(unix))]
        Network::Unix => Err(Error::handshake("unix sockets are not supported on this platform")),
        Network::Tcp => {
            let stream = tokio::net::TcpStream::connect(&line.address)
                .await
                .map_err(|e| Error::io(e, format!("failed to dial plugin at {}", line.address)))?;
            stream.set_nodelay(true)?;
            Ok(Session::new(stream, mux))
        }
    }
}
