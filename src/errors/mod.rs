//! # Error Handling
//!
//! Infrastructure errors for the plugin transport: configuration, handshake,
//! multiplexer and RPC failures. Domain errors returned by backends live in
//! [`crate::logical::LogicalError`]; every variant here converts into
//! [`LogicalError::Transport`](crate::logical::LogicalError::Transport) at the
//! backend boundary.

use crate::rpc::StatusCode;

/// Custom result type for plugin transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the plugin transport
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The peer is not a compatible plugin
    #[error("not a valid plugin: {message}")]
    Handshake { message: String },

    /// Broken or closed link between host and plugin
    #[error("plugin failed to communicate: {message}")]
    Transport { message: String },

    /// The remote side rejected a call at the RPC layer
    #[error("plugin RPC {method} failed ({code}): {message}")]
    Rpc { method: String, code: StatusCode, message: String },

    /// A call did not finish before its context deadline
    #[error("plugin call {method} exceeded its deadline")]
    DeadlineExceeded { method: String },

    /// A call was abandoned because its context was cancelled
    #[error("plugin call {method} was cancelled")]
    Cancelled { method: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Codec {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Plugin process management errors
    #[error("plugin process error: {message}")]
    Process { message: String },
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new handshake error
    pub fn handshake<S: Into<String>>(message: S) -> Self {
        Self::Handshake { message: message.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Create a codec error with context
    pub fn codec<S: Into<String>>(source: serde_json::Error, context: S) -> Self {
        Self::Codec { source, context: context.into() }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create a process management error
    pub fn process<S: Into<String>>(message: S) -> Self {
        Self::Process { message: message.into() }
    }

    /// Whether the error means the connection behind a handle is unusable.
    ///
    /// Callers must not retry these against the same connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. }
                | Error::Rpc { .. }
                | Error::DeadlineExceeded { .. }
                | Error::Cancelled { .. }
                | Error::Codec { .. }
                | Error::Io { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::config("bad frame size");
        assert!(matches!(error, Error::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: bad frame size");
    }

    #[test]
    fn test_handshake_error_is_user_facing() {
        let error = Error::handshake("magic cookie mismatch");
        assert_eq!(error.to_string(), "not a valid plugin: magic cookie mismatch");
        assert!(!error.is_transport());
    }

    #[test]
    fn test_transport_classification() {
        assert!(Error::transport("closed").is_transport());
        assert!(Error::DeadlineExceeded { method: "Backend.HandleRequest".into() }.is_transport());
        assert!(!Error::process("spawn failed").is_transport());
        assert!(!Error::config("x").is_transport());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Codec { .. }));
    }
}
