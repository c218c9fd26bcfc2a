//! Relay counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use relay_ipc::RelayStats;
use relay_render::{CheckpointBackend, FrameSource, RenderCliBackend};
use tracing::debug;

/// Collects relay counters across all sessions.
pub struct RelayMetrics {
    started: Instant,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    commands: AtomicU64,
    protocol_errors: AtomicU64,
    checkpoint_frames: AtomicU64,
    render_cli_frames: AtomicU64,
    synthetic_frames: AtomicU64,
    frames_streamed: AtomicU64,
    stream_failures: AtomicU64,
    inline_replies: AtomicU64,
    inline_bytes: AtomicU64,
}

impl RelayMetrics {
    /// Create a new collector.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            commands: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            checkpoint_frames: AtomicU64::new(0),
            render_cli_frames: AtomicU64::new(0),
            synthetic_frames: AtomicU64::new(0),
            frames_streamed: AtomicU64::new(0),
            stream_failures: AtomicU64::new(0),
            inline_replies: AtomicU64::new(0),
            inline_bytes: AtomicU64::new(0),
        }
    }

    /// Record an accepted connection.
    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session that has ended, for any reason.
    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a received text message.
    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message rejected with an error reply.
    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rendered frame by where it came from.
    pub fn record_frame(&self, source: FrameSource) {
        let counter = match source {
            FrameSource::Synthetic => &self.synthetic_frames,
            FrameSource::Backend(CheckpointBackend::NAME) => &self.checkpoint_frames,
            FrameSource::Backend(RenderCliBackend::NAME) => &self.render_cli_frames,
            FrameSource::Backend(other) => {
                debug!(backend = other, "Frame from untracked backend");
                return;
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame accepted by the stream pipe.
    pub fn record_frame_streamed(&self) {
        self.frames_streamed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame the stream pipe refused.
    pub fn record_stream_failure(&self) {
        self.stream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inline JPEG reply of `bytes` base64 characters.
    pub fn record_inline_reply(&self, bytes: usize) {
        self.inline_replies.fetch_add(1, Ordering::Relaxed);
        self.inline_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Time since the collector was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Get current counters.
    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            checkpoint_frames: self.checkpoint_frames.load(Ordering::Relaxed),
            render_cli_frames: self.render_cli_frames.load(Ordering::Relaxed),
            synthetic_frames: self.synthetic_frames.load(Ordering::Relaxed),
            frames_streamed: self.frames_streamed.load(Ordering::Relaxed),
            stream_failures: self.stream_failures.load(Ordering::Relaxed),
            inline_replies: self.inline_replies.load(Ordering::Relaxed),
            inline_bytes: self.inline_bytes.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_counted_by_source() {
        let metrics = RelayMetrics::new();
        metrics.record_frame(FrameSource::Synthetic);
        metrics.record_frame(FrameSource::Synthetic);
        metrics.record_frame(FrameSource::Backend(CheckpointBackend::NAME));
        metrics.record_frame(FrameSource::Backend(RenderCliBackend::NAME));
        metrics.record_frame(FrameSource::Backend("custom"));

        let stats = metrics.snapshot();
        assert_eq!(stats.synthetic_frames, 2);
        assert_eq!(stats.checkpoint_frames, 1);
        assert_eq!(stats.render_cli_frames, 1);
        assert_eq!(stats.frames_rendered(), 4);
    }

    #[test]
    fn test_session_and_inline_counters() {
        let metrics = RelayMetrics::default();
        metrics.record_session_opened();
        metrics.record_session_opened();
        metrics.record_session_closed();
        metrics.record_inline_reply(100);
        metrics.record_inline_reply(50);

        let stats = metrics.snapshot();
        assert_eq!(stats.active_sessions(), 1);
        assert_eq!(stats.inline_replies, 2);
        assert_eq!(stats.inline_bytes, 150);
    }
}
