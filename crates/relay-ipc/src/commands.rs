//! Commands sent from clients to the relay.
//!
//! Two envelope dialects are accepted and decode to the same [`Command`]:
//!
//! - `{"cmd": "pose", "frame_w": 640, "pose": {...}}` with fields inline
//! - `{"action": "pose", "params": {"frame_w": 640, "pose": {...}}}`

use serde_json::{Map, Value};

use crate::config::SessionDefaults;
use crate::error::ProtocolError;
use crate::types::{CameraParams, FrameRequest, Pose};
use crate::ProtocolResult;

/// A decoded client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Render (and stream) a frame for a camera pose.
    Pose(PoseCommand),

    /// End this client's session.
    Stop,

    /// Liveness probe.
    Ping,

    /// Any other command name.
    Unknown(String),
}

impl Command {
    /// Command name for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Pose(_) => "pose",
            Self::Stop => "stop",
            Self::Ping => "ping",
            Self::Unknown(name) => name,
        }
    }
}

/// Fields of a `pose` command. Absent fields fall back to session defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseCommand {
    /// Requested width.
    pub frame_w: Option<u32>,

    /// Requested height.
    pub frame_h: Option<u32>,

    /// Camera pose.
    pub pose: Option<Pose>,

    /// Camera parameters.
    pub camera: Option<CameraParams>,
}

impl PoseCommand {
    fn from_fields(fields: &Map<String, Value>) -> ProtocolResult<Self> {
        Ok(Self {
            frame_w: dimension_field(fields, "frame_w")?,
            frame_h: dimension_field(fields, "frame_h")?,
            pose: fields.get("pose").cloned().map(Pose),
            camera: fields.get("camera").cloned().map(CameraParams),
        })
    }

    /// Resolve into a frame request using the session defaults.
    pub fn into_request(self, defaults: &SessionDefaults) -> ProtocolResult<FrameRequest> {
        FrameRequest::new(
            self.pose.unwrap_or_else(|| defaults.pose.clone()),
            self.camera.unwrap_or_else(|| defaults.camera.clone()),
            self.frame_w.unwrap_or(defaults.width),
            self.frame_h.unwrap_or(defaults.height),
        )
    }
}

/// Decode one text message into a command.
pub fn decode_command(text: &str) -> ProtocolResult<Command> {
    let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
    let Value::Object(mut envelope) = value else {
        return Err(ProtocolError::InvalidJson);
    };

    let cmd = envelope.get("cmd").map(command_name);
    let action = envelope.get("action").map(command_name);

    let (name, fields) = match (cmd, action) {
        (Some(name), _) => (name, envelope),
        (None, Some(name)) => {
            let fields = match envelope.remove("params") {
                Some(Value::Object(params)) => params,
                Some(Value::Null) | None => Map::new(),
                Some(_) => return Err(ProtocolError::InvalidJson),
            };
            (name, fields)
        }
        (None, None) => return Ok(Command::Unknown(String::new())),
    };

    match name.as_str() {
        "pose" => Ok(Command::Pose(PoseCommand::from_fields(&fields)?)),
        "stop" => Ok(Command::Stop),
        "ping" => Ok(Command::Ping),
        _ => Ok(Command::Unknown(name)),
    }
}

fn command_name(value: &Value) -> String {
    match value {
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}

/// Read an optional frame dimension.
///
/// Integers, integral floats and numeric strings are accepted; fractional
/// values truncate toward zero. Anything that does not fit a positive `u32`
/// is rejected.
fn dimension_field(fields: &Map<String, Value>, key: &str) -> ProtocolResult<Option<u32>> {
    let invalid = |value: &Value| ProtocolError::InvalidFrameSize(format!("{key}={value}"));

    let Some(value) = fields.get(key) else {
        return Ok(None);
    };

    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .map(Some)
        .ok_or_else(|| invalid(value))
}
