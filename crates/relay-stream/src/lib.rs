//! Raw frame to H.264 RTP/UDP stream pipe.
//!
//! A [`FramePipe`] accepts BGR8 frames of a fixed size, stamps them with
//! presentation timestamps and hands them, in order, to a [`FrameSink`]
//! running on its own writer thread. The production sink is an `ffmpeg`
//! child process encoding to RTP over UDP.

mod clock;
mod error;
mod ffmpeg;
mod pipe;

pub use clock::{FrameTiming, PresentationClock};
pub use error::StreamError;
pub use ffmpeg::{sink_url, FfmpegRtpSink};
pub use pipe::FramePipe;

use relay_render::RawFrame;

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// RTP payload type used for H.264.
pub const RTP_PAYLOAD_TYPE: u8 = 96;

/// How long a sink may take to drain after its input is closed.
pub const SINK_FINISH_TIMEOUT_MS: u64 = 5000;

/// A frame with its presentation timing.
#[derive(Debug, Clone)]
pub struct TimedFrame {
    pub frame: RawFrame,
    pub timing: FrameTiming,
}

/// Trait for encode/transport sinks.
///
/// Sinks run on the pipe's writer thread and receive frames in push order.
pub trait FrameSink: Send {
    /// Write one frame.
    fn write_frame(&mut self, frame: &TimedFrame) -> StreamResult<()>;

    /// Flush and release the sink. Called once, after the last frame.
    fn finish(&mut self) -> StreamResult<()>;

    /// Get sink name for diagnostics.
    fn name(&self) -> &'static str;
}
