//! Relay state machine types.

use serde::{Deserialize, Serialize};

/// Lifecycle of the stream pipe.
///
/// `Uninitialized -> Playing -> Stopped`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipeState {
    /// Encoder/sink not yet running.
    #[default]
    Uninitialized,

    /// Accepting frames.
    Playing,

    /// Torn down; no more frames are accepted.
    Stopped,
}

impl PipeState {
    /// Returns true if frames can be pushed.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Returns true once the pipe has been stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns the display name for this state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Playing => "Playing",
            Self::Stopped => "Stopped",
        }
    }
}

/// Why a client session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEnd {
    /// Client sent `stop`.
    StopCommand,

    /// Peer closed the transport.
    PeerClosed,

    /// Relay is shutting down.
    ServerShutdown,

    /// Unhandled fault while processing a message.
    Fault { message: String },
}

impl SessionEnd {
    /// Returns true if the session ended because of a fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }

    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::StopCommand => "Client requested stop".to_string(),
            Self::PeerClosed => "Client disconnected".to_string(),
            Self::ServerShutdown => "Relay shutting down".to_string(),
            Self::Fault { message } => format!("Session fault: {message}"),
        }
    }
}
