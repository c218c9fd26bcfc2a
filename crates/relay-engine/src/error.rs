//! Error types for the session server.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by the session server.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// WebSocket transport error on a session.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Inline JPEG encoding failed.
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
