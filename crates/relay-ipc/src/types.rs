//! Common types shared across the relay crates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::{ProtocolResult, MAX_FRAME_DIMENSION};

/// Camera pose as sent by the client.
///
/// The relay never interprets the contents; backends receive it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose(pub Value);

impl Pose {
    /// Returns true if the client did not supply a pose.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// Camera parameters forwarded alongside the pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraParams(pub Value);

impl Default for CameraParams {
    fn default() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

/// A request for one rendered frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Camera pose.
    pub pose: Pose,

    /// Camera parameters.
    pub camera: CameraParams,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,
}

impl FrameRequest {
    /// Create a request, rejecting zero or oversized dimensions.
    pub fn new(pose: Pose, camera: CameraParams, width: u32, height: u32) -> ProtocolResult<Self> {
        check_dimension("frame_w", width)?;
        check_dimension("frame_h", height)?;
        Ok(Self {
            pose,
            camera,
            width,
            height,
        })
    }

    /// Byte length of a packed 3-channel frame of this size.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

fn check_dimension(field: &str, value: u32) -> ProtocolResult<()> {
    if value == 0 || value > MAX_FRAME_DIMENSION {
        return Err(ProtocolError::InvalidFrameSize(format!(
            "{field}={value} (must be 1-{MAX_FRAME_DIMENSION})"
        )));
    }
    Ok(())
}

/// Snapshot of relay counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Client sessions accepted since startup.
    pub sessions_opened: u64,

    /// Client sessions that have ended.
    pub sessions_closed: u64,

    /// Commands handled (including error replies).
    pub commands: u64,

    /// Messages rejected with a protocol error.
    pub protocol_errors: u64,

    /// Frames produced by the in-process checkpoint renderer.
    pub checkpoint_frames: u64,

    /// Frames produced by the external render CLI.
    pub render_cli_frames: u64,

    /// Frames produced by the synthetic fallback.
    pub synthetic_frames: u64,

    /// Frames accepted by the stream pipe.
    pub frames_streamed: u64,

    /// Frames the stream pipe refused.
    pub stream_failures: u64,

    /// Inline JPEG replies sent.
    pub inline_replies: u64,

    /// Total JPEG bytes sent inline (before base64).
    pub inline_bytes: u64,
}

impl RelayStats {
    /// Sessions currently connected.
    pub fn active_sessions(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }

    /// Frames produced by any source.
    pub fn frames_rendered(&self) -> u64 {
        self.checkpoint_frames + self.render_cli_frames + self.synthetic_frames
    }
}
