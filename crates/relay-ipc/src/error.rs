//! Error types for protocol decoding and configuration.

use thiserror::Error;

/// Errors caused by a single client message.
///
/// These are reported back to the originating client only; the session keeps
/// running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload is not a JSON object.
    #[error("invalid json")]
    InvalidJson,

    /// Command name not recognized.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Requested frame dimensions are unusable.
    #[error("invalid frame size: {0}")]
    InvalidFrameSize(String),
}

impl ProtocolError {
    /// The error string placed in the client reply.
    pub fn reply_message(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid json",
            Self::UnknownCommand(_) => "unknown command",
            Self::InvalidFrameSize(_) => "invalid frame size",
        }
    }
}

/// Errors in the process configuration, detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Default frame size is zero or too large.
    #[error("invalid default frame size {width}x{height}")]
    FrameSize { width: u32, height: u32 },

    /// Stream frame rate is zero.
    #[error("stream fps must be non-zero")]
    ZeroFps,

    /// Stream sink host is empty.
    #[error("stream sink host must not be empty")]
    EmptySinkHost,

    /// A backend timeout is zero.
    #[error("{0} timeout must be non-zero")]
    ZeroTimeout(&'static str),

    /// JPEG quality is outside 1..=100.
    #[error("jpeg quality {0} out of range (1-100)")]
    JpegQuality(u8),
}
