//! Domain error taxonomy shared by backends, storage and system views.
//!
//! Error types do not survive serialization, so sentinel identity is
//! recovered on the near side by matching the message text against the
//! closed table in [`SENTINELS`]. An unrelated error whose message happens to
//! equal a sentinel's text is reconstructed as that sentinel; this is a known
//! and accepted imprecision.

use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, LogicalError>;

/// Fixed message returned by `lookup_plugin` inside a plugin process.
pub const LOOKUP_PLUGIN_UNSUPPORTED: &str = "cannot call LookupPlugin from a plugin backend";

/// Errors returned by [`Backend`](super::Backend), [`Storage`](super::Storage)
/// and [`SystemView`](super::SystemView) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogicalError {
    #[error("unsupported operation")]
    UnsupportedOperation,

    #[error("unsupported path")]
    UnsupportedPath,

    #[error("invalid request")]
    InvalidRequest,

    #[error("permission denied")]
    PermissionDenied,

    #[error("request needs further approval")]
    MultiAuthzPending,

    #[error("unrecoverable error")]
    Unrecoverable,

    #[error("upstream rate limited")]
    UpstreamRateLimited,

    /// Error with an explicit HTTP-style status code.
    #[error("{message}")]
    Coded { code: u16, message: String },

    /// Malformed input supplied by the caller, reported as 400.
    #[error("{0}")]
    BadRequest(String),

    /// Error attributable to user input, shown verbatim.
    #[error("{0}")]
    User(String),

    /// The link to the plugin is broken; the handle must be treated as dead.
    #[error("plugin failed to communicate: {0}")]
    Transport(String),

    #[error("plugin client can not perform action while in metadata mode")]
    ClientInMetadataMode,

    #[error("plugin server can not perform action while in metadata mode")]
    ServerInMetadataMode,

    #[error("cannot call LookupPlugin from a plugin backend")]
    LookupPluginUnsupported,

    /// Any other error, carried by message.
    #[error("{0}")]
    Other(String),
}

/// Closed list of errors whose identity is recovered from message text.
///
/// Extending this list changes what the peer can reconstruct, so it is a
/// protocol-compatibility decision.
pub const SENTINELS: &[LogicalError] = &[
    LogicalError::UnsupportedOperation,
    LogicalError::UnsupportedPath,
    LogicalError::InvalidRequest,
    LogicalError::PermissionDenied,
    LogicalError::MultiAuthzPending,
    LogicalError::Unrecoverable,
    LogicalError::UpstreamRateLimited,
    LogicalError::ClientInMetadataMode,
    LogicalError::ServerInMetadataMode,
    LogicalError::LookupPluginUnsupported,
];

impl LogicalError {
    /// Create a coded error.
    pub fn coded(code: u16, message: impl Into<String>) -> Self {
        Self::Coded { code, message: message.into() }
    }

    /// Create a user error.
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Look up the sentinel whose message equals `message`.
    pub fn sentinel_from_message(message: &str) -> Option<Self> {
        SENTINELS.iter().find(|s| s.to_string() == message).cloned()
    }

    /// Rebuild an error from its message alone, recovering sentinels.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::sentinel_from_message(&message).unwrap_or(Self::Other(message))
    }

    pub fn is_sentinel(&self) -> bool {
        SENTINELS.contains(self)
    }

    /// Whether the error came from a broken link rather than the backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// HTTP-style status code the host should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedOperation => 405,
            Self::UnsupportedPath => 404,
            Self::InvalidRequest | Self::BadRequest(_) | Self::User(_) => 400,
            Self::PermissionDenied => 403,
            Self::MultiAuthzPending => 202,
            Self::UpstreamRateLimited => 502,
            Self::Coded { code, .. } => *code,
            _ => 500,
        }
    }
}

impl From<crate::errors::Error> for LogicalError {
    fn from(error: crate::errors::Error) -> Self {
        match error {
            crate::errors::Error::Transport { message } => Self::Transport(message),
            other if other.is_transport() => Self::Transport(other.to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}
