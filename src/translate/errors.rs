//! Error encodings for both transports.
//!
//! The modern transport carries a typed error (`err_type`, `err_msg`,
//! `err_code`). The legacy transport carries a flat message plus an optional
//! code, and sentinels are recovered from the message text alone.

use serde::{Deserialize, Serialize};

use crate::logical::LogicalError;

/// Error type tags of the modern transport. Values are part of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorType {
    Unknown = 0,
    User = 1,
    Internal = 2,
    Coded = 3,
    BadRequest = 4,
    UnsupportedOperation = 5,
    UnsupportedPath = 6,
    InvalidRequest = 7,
    PermissionDenied = 8,
    MultiAuthzPending = 9,
    Unrecoverable = 10,
    UpstreamRateLimited = 11,
    ClientInMetadataMode = 12,
    ServerInMetadataMode = 13,
    LookupPluginUnsupported = 14,
    Transport = 15,
}

impl ErrorType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::User,
            2 => Self::Internal,
            3 => Self::Coded,
            4 => Self::BadRequest,
            5 => Self::UnsupportedOperation,
            6 => Self::UnsupportedPath,
            7 => Self::InvalidRequest,
            8 => Self::PermissionDenied,
            9 => Self::MultiAuthzPending,
            10 => Self::Unrecoverable,
            11 => Self::UpstreamRateLimited,
            12 => Self::ClientInMetadataMode,
            13 => Self::ServerInMetadataMode,
            14 => Self::LookupPluginUnsupported,
            15 => Self::Transport,
            _ => Self::Unknown,
        }
    }
}

/// Typed error of the modern transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub err_type: u32,
    pub err_msg: String,
    #[serde(default)]
    pub err_code: i64,
}

pub fn error_to_wire(err: &LogicalError) -> WireError {
    let (err_type, err_msg, err_code) = match err {
        LogicalError::UnsupportedOperation => (ErrorType::UnsupportedOperation, err.to_string(), 0),
        LogicalError::UnsupportedPath => (ErrorType::UnsupportedPath, err.to_string(), 0),
        LogicalError::InvalidRequest => (ErrorType::InvalidRequest, err.to_string(), 0),
        LogicalError::PermissionDenied => (ErrorType::PermissionDenied, err.to_string(), 0),
        LogicalError::MultiAuthzPending => (ErrorType::MultiAuthzPending, err.to_string(), 0),
        LogicalError::Unrecoverable => (ErrorType::Unrecoverable, err.to_string(), 0),
        LogicalError::UpstreamRateLimited => (ErrorType::UpstreamRateLimited, err.to_string(), 0),
        LogicalError::ClientInMetadataMode => (ErrorType::ClientInMetadataMode, err.to_string(), 0),
        LogicalError::ServerInMetadataMode => (ErrorType::ServerInMetadataMode, err.to_string(), 0),
        LogicalError::LookupPluginUnsupported => {
            (ErrorType::LookupPluginUnsupported, err.to_string(), 0)
        }
        LogicalError::Coded { code, message } => (ErrorType::Coded, message.clone(), i64::from(*code)),
        LogicalError::BadRequest(message) => (ErrorType::BadRequest, message.clone(), 400),
        LogicalError::User(message) => (ErrorType::User, message.clone(), 0),
        LogicalError::Transport(message) => (ErrorType::Transport, message.clone(), 0),
        LogicalError::Other(message) => (ErrorType::Internal, message.clone(), 0),
    };
    WireError { err_type: err_type as u32, err_msg, err_code }
}

pub fn error_from_wire(err: WireError) -> LogicalError {
    match ErrorType::from_u32(err.err_type) {
        ErrorType::UnsupportedOperation => LogicalError::UnsupportedOperation,
        ErrorType::UnsupportedPath => LogicalError::UnsupportedPath,
        ErrorType::InvalidRequest => LogicalError::InvalidRequest,
        ErrorType::PermissionDenied => LogicalError::PermissionDenied,
        ErrorType::MultiAuthzPending => LogicalError::MultiAuthzPending,
        ErrorType::Unrecoverable => LogicalError::Unrecoverable,
        ErrorType::UpstreamRateLimited => LogicalError::UpstreamRateLimited,
        ErrorType::ClientInMetadataMode => LogicalError::ClientInMetadataMode,
        ErrorType::ServerInMetadataMode => LogicalError::ServerInMetadataMode,
        ErrorType::LookupPluginUnsupported => LogicalError::LookupPluginUnsupported,
        ErrorType::Coded => match u16::try_from(err.err_code) {
            Ok(code) => LogicalError::Coded { code, message: err.err_msg },
            Err(_) => LogicalError::Other(err.err_msg),
        },
        ErrorType::BadRequest => LogicalError::BadRequest(err.err_msg),
        ErrorType::User => LogicalError::User(err.err_msg),
        ErrorType::Transport => LogicalError::Transport(err.err_msg),
        ErrorType::Internal => LogicalError::Other(err.err_msg),
        ErrorType::Unknown => LogicalError::from_message(err.err_msg),
    }
}

/// How a [`FlatError`] should be rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatErrorKind {
    /// Plain message; sentinels are recovered by text.
    #[default]
    Plain,
    Coded,
    BadRequest,
    User,
    /// The peer lost its own link to the host.
    Transport,
}

/// Flat error of the legacy transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default)]
    pub kind: FlatErrorKind,
}

pub fn error_to_flat(err: &LogicalError) -> FlatError {
    match err {
        LogicalError::Coded { code, message } => {
            FlatError { message: message.clone(), code: Some(*code), kind: FlatErrorKind::Coded }
        }
        LogicalError::BadRequest(message) => {
            FlatError { message: message.clone(), code: Some(400), kind: FlatErrorKind::BadRequest }
        }
        LogicalError::User(message) => {
            FlatError { message: message.clone(), code: None, kind: FlatErrorKind::User }
        }
        LogicalError::Transport(message) => {
            FlatError { message: message.clone(), code: None, kind: FlatErrorKind::Transport }
        }
        other => FlatError { message: other.to_string(), code: None, kind: FlatErrorKind::Plain },
    }
}

pub fn error_from_flat(err: FlatError) -> LogicalError {
    match (err.kind, err.code) {
        (FlatErrorKind::Coded, Some(code)) => LogicalError::Coded { code, message: err.message },
        (FlatErrorKind::BadRequest, _) => LogicalError::BadRequest(err.message),
        (FlatErrorKind::User, _) => LogicalError::User(err.message),
        (FlatErrorKind::Transport, _) => LogicalError::Transport(err.message),
        _ => LogicalError::from_message(err.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::SENTINELS;

    fn samples() -> Vec<LogicalError> {
        let mut errors = SENTINELS.to_vec();
        errors.push(LogicalError::coded(429, "slow down"));
        errors.push(LogicalError::BadRequest("missing field 'name'".into()));
        errors.push(LogicalError::user("role not found"));
        errors.push(LogicalError::other("disk on fire"));
        errors
    }

    #[test]
    fn test_typed_errors_keep_identity() {
        for err in samples() {
            assert_eq!(error_from_wire(error_to_wire(&err)), err);
        }
        let transport = LogicalError::Transport("reset".into());
        assert_eq!(error_from_wire(error_to_wire(&transport)), transport);
    }

    #[test]
    fn test_flat_errors_keep_identity() {
        for err in samples() {
            assert_eq!(error_from_flat(error_to_flat(&err)), err);
        }
    }

    #[test]
    fn test_transport_errors_classify_alike_on_both_transports() {
        let lost = LogicalError::Transport("storage stream 3 is closed".into());
        let via_flat = error_from_flat(error_to_flat(&lost));
        let via_wire = error_from_wire(error_to_wire(&lost));

        assert_eq!(via_flat, lost);
        assert_eq!(via_flat, via_wire);
        assert!(via_flat.is_transport());
        assert_eq!(error_to_flat(&lost).kind, FlatErrorKind::Transport);
    }

    #[test]
    fn test_unknown_type_falls_back_to_message() {
        let err = WireError { err_type: 99, err_msg: "permission denied".into(), err_code: 0 };
        assert_eq!(error_from_wire(err), LogicalError::PermissionDenied);

        let err = WireError { err_type: 0, err_msg: "boom".into(), err_code: 0 };
        assert_eq!(error_from_wire(err), LogicalError::Other("boom".into()));
    }

    #[test]
    fn test_plain_message_matching_sentinel_is_reconstructed() {
        let lookalike = LogicalError::other("unsupported path");
        assert_eq!(error_from_flat(error_to_flat(&lookalike)), LogicalError::UnsupportedPath);
    }
}
