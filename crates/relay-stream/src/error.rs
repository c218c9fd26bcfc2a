//! Error types for the stream module.

use std::time::Duration;

use relay_ipc::PipeState;
use thiserror::Error;

/// Errors that can occur while building or feeding the stream pipe.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Encoder is not installed.
    #[error("encoder unavailable: {0}")]
    Unavailable(String),

    /// Stream configuration cannot be encoded.
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),

    /// Sink address is not a usable host/port.
    #[error("invalid sink address: {0}")]
    InvalidSinkAddress(String),

    /// Encoder process failed to start.
    #[error("failed to start encoder: {0}")]
    Spawn(String),

    /// Frame size differs from the pipe's configured size.
    #[error("frame is {got_width}x{got_height}, pipe expects {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    /// Pipe is not accepting frames.
    #[error("pipe is {} (not playing)", .0.name())]
    NotPlaying(PipeState),

    /// The sink did not accept the frame within the push timeout.
    #[error("sink backpressure: frame not accepted within {0:?}")]
    Backpressure(Duration),

    /// Sink has shut down (usually after a write failure).
    #[error("sink closed")]
    SinkClosed,

    /// Writing to the sink failed.
    #[error("sink write failed: {0}")]
    Write(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
