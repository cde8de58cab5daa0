//! Shared error type across botlink crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, BotlinkError>;

/// Unified error type used by the protocol crates and both processes.
#[derive(Debug, Error)]
pub enum BotlinkError {
    /// Malformed wire data: bad JSON, missing fields, bad base64.
    #[error("decode failed: {0}")]
    Decode(String),
    /// A wire tag with no registered factory.
    #[error("unknown packet tag: {0}")]
    UnknownTag(String),
    /// Well-formed data that violates protocol rules (wrong id prefix,
    /// handshake missing, version mismatch).
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Unsupported envelope version.
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    /// The connection was torn down while the operation was in flight.
    #[error("connection closed")]
    ConnectionClosed,
    /// No matching query result arrived in time.
    #[error("query timed out")]
    QueryTimeout,
    /// A send could not be queued on the connection.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// The underlying socket failed mid-session.
    #[error("transport error: {0}")]
    Transport(String),
    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),
    /// A remote service answered with an HTTP-style status code.
    #[error("status code {0}")]
    Status(u16),
    /// Failure reported by a platform SDK behind a backend.
    #[error("platform error: {0}")]
    Platform(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotlinkError {
    /// Short stable name for the error kind, used when a user-visible reply
    /// must not carry a long message.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BotlinkError::Decode(_) => "Decode",
            BotlinkError::UnknownTag(_) => "UnknownTag",
            BotlinkError::Protocol(_) => "Protocol",
            BotlinkError::UnsupportedVersion => "UnsupportedVersion",
            BotlinkError::ConnectionClosed => "ConnectionClosed",
            BotlinkError::QueryTimeout => "QueryTimeout",
            BotlinkError::SendFailed(_) => "SendFailed",
            BotlinkError::Transport(_) => "Transport",
            BotlinkError::Config(_) => "Config",
            BotlinkError::Status(_) => "Status",
            BotlinkError::Platform(_) => "Platform",
            BotlinkError::Io(_) => "Io",
        }
    }

    /// The HTTP-style status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BotlinkError::Status(code) => Some(*code),
            _ => None,
        }
    }
}
