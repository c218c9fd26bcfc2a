//! The frame pipe state machine.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use relay_ipc::{PipeState, StreamConfig};
use relay_render::RawFrame;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{FrameTiming, PresentationClock};
use crate::error::StreamError;
use crate::ffmpeg::FfmpegRtpSink;
use crate::{FrameSink, StreamResult, TimedFrame};

/// Live encode/transport session fed with raw frames.
///
/// Pushes are serialized: each push is stamped and queued atomically, so
/// frames reach the sink in push order. The queue is bounded; when full, a
/// push waits up to the configured timeout and then fails with
/// [`StreamError::Backpressure`] rather than dropping the frame.
///
/// If the sink fails, frames still queued behind the failed write cannot be
/// delivered. They are counted in [`FramePipe::frames_dropped`] and every
/// later push fails with [`StreamError::SinkClosed`].
pub struct FramePipe {
    config: StreamConfig,
    inner: Arc<Mutex<PipeInner>>,
    sink_failed: Arc<AtomicBool>,
    frames_dropped: Arc<AtomicU64>,
}

struct PipeInner {
    state: PipeState,
    clock: PresentationClock,
    frame_tx: Option<Sender<TimedFrame>>,
    writer: Option<JoinHandle<()>>,
    frames_pushed: u64,
}

impl FramePipe {
    /// Start a pipe encoding to RTP/UDP through `ffmpeg`.
    #[instrument(
        name = "frame_pipe_start",
        skip_all,
        fields(host = %config.udp_host, port = config.udp_port)
    )]
    pub fn start(config: StreamConfig) -> StreamResult<Self> {
        let sink = FfmpegRtpSink::spawn(&config)?;
        Self::with_sink(config, Box::new(sink))
    }

    /// Start a pipe feeding an arbitrary sink.
    pub fn with_sink(config: StreamConfig, sink: Box<dyn FrameSink>) -> StreamResult<Self> {
        if config.width == 0 || config.height == 0 || config.fps == 0 {
            return Err(StreamError::InvalidConfig(format!(
                "{}x{}@{} is not a valid stream format",
                config.width, config.height, config.fps
            )));
        }

        let pipe = Self {
            inner: Arc::new(Mutex::new(PipeInner {
                state: PipeState::Uninitialized,
                clock: PresentationClock::new(config.fps),
                frame_tx: None,
                writer: None,
                frames_pushed: 0,
            })),
            sink_failed: Arc::new(AtomicBool::new(false)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            config,
        };

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(pipe.config.queue_capacity.max(1));
        let writer_ctx = WriterContext {
            inner: Arc::clone(&pipe.inner),
            sink_failed: Arc::clone(&pipe.sink_failed),
            frames_dropped: Arc::clone(&pipe.frames_dropped),
        };
        let sink_name = sink.name();

        let writer = thread::Builder::new()
            .name("frame-pipe-writer".to_string())
            .spawn(move || writer_loop(sink, frame_rx, writer_ctx))?;

        {
            let mut inner = pipe.inner.lock();
            inner.frame_tx = Some(frame_tx);
            inner.writer = Some(writer);
            inner.clock = PresentationClock::new(pipe.config.fps);
            inner.state = PipeState::Playing;
        }

        info!(
            sink = sink_name,
            width = pipe.config.width,
            height = pipe.config.height,
            fps = pipe.config.fps,
            "Frame pipe playing"
        );

        Ok(pipe)
    }

    /// Queue a frame for the sink.
    ///
    /// Blocks while the queue is full, up to the configured push timeout.
    pub fn push_frame(&self, frame: RawFrame) -> StreamResult<FrameTiming> {
        let mut inner = self.inner.lock();

        if !inner.state.is_playing() {
            return Err(StreamError::NotPlaying(inner.state));
        }

        if self.sink_failed() {
            return Err(StreamError::SinkClosed);
        }

        let (got_width, got_height) = frame.dimensions();
        if (got_width, got_height) != (self.config.width, self.config.height) {
            return Err(StreamError::DimensionMismatch {
                width: self.config.width,
                height: self.config.height,
                got_width,
                got_height,
            });
        }

        let Some(frame_tx) = inner.frame_tx.clone() else {
            return Err(StreamError::SinkClosed);
        };

        let timing = inner.clock.next();
        let timeout = self.config.push_timeout();

        match frame_tx.send_timeout(TimedFrame { frame, timing }, timeout) {
            Ok(()) => {
                inner.frames_pushed += 1;
                if inner.frames_pushed <= 3 || inner.frames_pushed % 500 == 0 {
                    debug!(
                        frames = inner.frames_pushed,
                        pts_ms = timing.pts_ms(),
                        "Frame queued"
                    );
                }
                Ok(timing)
            }
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(?timeout, "Frame pipe backpressure");
                Err(StreamError::Backpressure(timeout))
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(StreamError::SinkClosed),
        }
    }

    /// Stop the pipe and release the sink. Idempotent.
    #[instrument(name = "frame_pipe_stop", skip(self))]
    pub fn stop(&self) {
        let (frame_tx, writer, frames) = {
            let mut inner = self.inner.lock();
            if inner.state.is_stopped() {
                debug!("Frame pipe already stopped");
                return;
            }
            inner.state = PipeState::Stopped;
            (inner.frame_tx.take(), inner.writer.take(), inner.frames_pushed)
        };

        // Closing the queue lets the writer drain and finish the sink.
        drop(frame_tx);

        if let Some(writer) = writer {
            if writer.join().is_err() {
                error!("Frame pipe writer panicked");
            }
        }

        info!(frames, dropped = self.frames_dropped(), "Frame pipe stopped");
    }

    /// Current pipe state.
    pub fn state(&self) -> PipeState {
        self.inner.lock().state
    }

    /// Returns true if the sink failed and frames can no longer be delivered.
    pub fn sink_failed(&self) -> bool {
        self.sink_failed.load(Ordering::SeqCst)
    }

    /// Frames that were accepted by [`push_frame`](Self::push_frame) but
    /// never reached the sink because it failed first.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::SeqCst)
    }
}

impl Drop for FramePipe {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pipe state the writer thread needs when the sink fails.
struct WriterContext {
    inner: Arc<Mutex<PipeInner>>,
    sink_failed: Arc<AtomicBool>,
    frames_dropped: Arc<AtomicU64>,
}

fn writer_loop(mut sink: Box<dyn FrameSink>, frame_rx: Receiver<TimedFrame>, ctx: WriterContext) {
    debug!(sink = sink.name(), "Frame pipe writer starting");

    while let Ok(frame) = frame_rx.recv() {
        let Err(e) = sink.write_frame(&frame) else {
            continue;
        };

        // Holding the pipe lock keeps pushes out while the queue is closed.
        let dropped = {
            let mut inner = ctx.inner.lock();
            drop(inner.frame_tx.take());

            // The failed frame plus everything queued behind it.
            let dropped = 1 + frame_rx.try_iter().count() as u64;
            drop(frame_rx);

            ctx.frames_dropped.fetch_add(dropped, Ordering::SeqCst);
            ctx.sink_failed.store(true, Ordering::SeqCst);
            dropped
        };

        error!(
            sink = sink.name(),
            error = %e,
            dropped,
            sequence = frame.timing.sequence,
            "Sink write failed; queued frames dropped and pipe closed"
        );
        finish_sink(&mut *sink);
        return;
    }

    finish_sink(&mut *sink);
}

fn finish_sink(sink: &mut dyn FrameSink) {
    if let Err(e) = sink.finish() {
        warn!(sink = sink.name(), error = %e, "Sink finish failed");
    }

    debug!(sink = sink.name(), "Frame pipe writer stopped");
}
