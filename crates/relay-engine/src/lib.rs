//! WebSocket session server for the pose relay.
//!
//! Each client connection gets its own session task. Sessions decode pose
//! commands, ask the [`RenderDispatcher`] for a frame, push it into the
//! shared [`FramePipe`] when streaming is enabled, and reply with a short
//! JSON status (optionally carrying the frame as an inline JPEG).
//!
//! [`RenderDispatcher`]: relay_render::RenderDispatcher
//! [`FramePipe`]: relay_stream::FramePipe

mod error;
mod inline;
mod metrics;
mod server;
mod session;

pub use error::EngineError;
pub use inline::encode_jpeg_b64;
pub use metrics::RelayMetrics;
pub use server::SessionServer;

/// Result type for session server operations.
pub type EngineResult<T> = Result<T, EngineError>;
