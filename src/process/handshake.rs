//! Handshake between a host and a freshly spawned plugin process.
//!
//! The host passes a magic cookie, the protocol versions it can speak and the
//! metadata-mode flag through the child's environment. The plugin answers
//! with a single stdout line:
//!
//! ```text
//! CORE_VERSION|PROTOCOL_VERSION|NETWORK|ADDRESS|TRANSPORT
//! 1|5|unix|/tmp/backend-plugin-3f2a.sock|modern
//! ```

use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};
use crate::transport::TransportKind;

/// Version of the handshake line format itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

pub const MAGIC_COOKIE_KEY: &str = "BACKEND_PLUGIN_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str = "5bd1c0a7-93e4-4f0b-8a6d-2c71f8e4b9d3";

/// Comma-separated protocol versions the host offers.
pub const PROTOCOL_VERSIONS_ENV: &str = "BACKEND_PLUGIN_PROTOCOL_VERSIONS";

/// `true` when the plugin must run without access to live host state.
pub const METADATA_MODE_ENV: &str = "BACKEND_PLUGIN_METADATA_MODE";

/// Shared secret proving the child was started by a compatible host.
///
/// The cookie is not a security boundary; it only stops users from running a
/// plugin binary by hand and stops hosts from launching unrelated binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            magic_cookie_key: MAGIC_COOKIE_KEY.to_string(),
            magic_cookie_value: MAGIC_COOKIE_VALUE.to_string(),
        }
    }
}

impl HandshakeConfig {
    /// Whether the current process was started with the expected cookie.
    pub fn cookie_present(&self) -> bool {
        std::env::var(&self.magic_cookie_key)
            .map(|value| value == self.magic_cookie_value)
            .unwrap_or(false)
    }
}

/// Address family the plugin listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Unix,
    Tcp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Unix => f.write_str("unix"),
            Network::Tcp => f.write_str("tcp"),
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unix" => Ok(Network::Unix),
            "tcp" => Ok(Network::Tcp),
            other => Err(Error::handshake(format!("unsupported network type '{}'", other))),
        }
    }
}

/// The line a plugin prints once it is ready for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub core_version: u32,
    pub protocol_version: u32,
    pub network: Network,
    pub address: String,
    pub transport: TransportKind,
}

impl HandshakeLine {
    pub fn new(transport: TransportKind, network: Network, address: impl Into<String>) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            protocol_version: transport.protocol_version(),
            network,
            address: address.into(),
            transport,
        }
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.core_version, self.protocol_version, self.network, self.address, self.transport
        )
    }
}

impl FromStr for HandshakeLine {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        if parts.len() != 5 {
            return Err(Error::handshake(format!("unrecognized handshake line '{}'", line.trim())));
        }

        let core_version: u32 = parts[0]
            .parse()
            .map_err(|_| Error::handshake(format!("invalid core version '{}'", parts[0])))?;
        if core_version != CORE_PROTOCOL_VERSION {
            return Err(Error::handshake(format!(
                "incompatible core version {}, expected {}",
                core_version, CORE_PROTOCOL_VERSION
            )));
        }

        let protocol_version: u32 = parts[1]
            .parse()
            .map_err(|_| Error::handshake(format!("invalid protocol version '{}'", parts[1])))?;
        let transport: TransportKind = parts[4].parse().map_err(Error::handshake)?;
        if transport.protocol_version() != protocol_version {
            return Err(Error::handshake(format!(
                "transport {} does not speak protocol version {}",
                transport, protocol_version
            )));
        }

        Ok(Self {
            core_version,
            protocol_version,
            network: parts[2].parse()?,
            address: parts[3].to_string(),
            transport,
        })
    }
}

/// Encode offered transports for [`PROTOCOL_VERSIONS_ENV`].
pub fn encode_versions(transports: &[TransportKind]) -> String {
    transports
        .iter()
        .map(|t| t.protocol_version().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse [`PROTOCOL_VERSIONS_ENV`]; unknown versions are skipped.
pub fn decode_versions(raw: &str) -> Vec<TransportKind> {
    raw.split(',')
        .filter_map(|v| v.trim().parse::<u32>().ok())
        .filter_map(TransportKind::from_protocol_version)
        .collect()
}

/// Pick the highest protocol version both sides support.
pub fn negotiate(offered: &[TransportKind], supported: &[TransportKind]) -> Option<TransportKind> {
    offered
        .iter()
        .filter(|t| supported.contains(t))
        .max_by_key(|t| t.protocol_version())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_line_roundtrip() {
        let line = HandshakeLine::new(TransportKind::Modern, Network::Unix, "/tmp/p.sock");
        assert_eq!(line.to_string(), "1|5|unix|/tmp/p.sock|modern");
        assert_eq!("1|5|unix|/tmp/p.sock|modern\n".parse::<HandshakeLine>().unwrap(), line);
    }

    #[test]
    fn test_handshake_line_rejects_garbage() {
        let err = "hello world".parse::<HandshakeLine>().unwrap_err();
        assert!(err.to_string().starts_with("not a valid plugin"));

        assert!("2|5|unix|/tmp/p.sock|modern".parse::<HandshakeLine>().is_err());
        assert!("1|4|unix|/tmp/p.sock|modern".parse::<HandshakeLine>().is_err());
        assert!("1|5|udp|127.0.0.1:1|modern".parse::<HandshakeLine>().is_err());
    }

    #[test]
    fn test_negotiate_prefers_highest_version() {
        let both = [TransportKind::Legacy, TransportKind::Modern];
        assert_eq!(negotiate(&both, &both), Some(TransportKind::Modern));
        assert_eq!(negotiate(&[TransportKind::Legacy], &both), Some(TransportKind::Legacy));
        assert_eq!(negotiate(&[TransportKind::Modern], &[TransportKind::Legacy]), None);
    }

    #[test]
    fn test_version_env_encoding() {
        let encoded = encode_versions(&[TransportKind::Modern, TransportKind::Legacy]);
        assert_eq!(encoded, "5,4");
        assert_eq!(decode_versions("5, 4,9,x"), vec![TransportKind::Modern, TransportKind::Legacy]);
    }
}
