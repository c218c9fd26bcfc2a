//! Typed client<->relay messages for the pose relay.
//!
//! This crate defines the command envelopes clients send, the replies the
//! relay sends back, the request/configuration types shared by the render,
//! stream and engine crates, and the small state machines they report.

mod commands;
mod config;
mod error;
mod replies;
mod state;
mod types;

pub use commands::{decode_command, Command, PoseCommand};
pub use config::{RelayConfig, RenderConfig, SessionDefaults, StreamConfig};
pub use error::{ConfigError, ProtocolError};
pub use replies::Reply;
pub use state::{PipeState, SessionEnd};
pub use types::{CameraParams, FrameRequest, Pose, RelayStats};

/// Largest accepted frame edge in pixels.
///
/// Requests beyond this are rejected as protocol errors so a single client
/// cannot make the relay allocate an unbounded frame buffer.
pub const MAX_FRAME_DIMENSION: u32 = 8192;

/// Result type for protocol decoding.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
