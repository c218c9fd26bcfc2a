//! `ffmpeg` child process sink: rawvideo on stdin, H.264 RTP over UDP out.

use std::io::{BufRead, BufReader, Write};
use std::net::IpAddr;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use relay_ipc::StreamConfig;
use relay_render::PixelFormat;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::StreamError;
use crate::{FrameSink, StreamResult, TimedFrame, RTP_PAYLOAD_TYPE, SINK_FINISH_TIMEOUT_MS};

const FFMPEG: &str = "ffmpeg";

/// Returns true if an `ffmpeg` binary can be run from PATH.
pub(crate) fn is_ffmpeg_on_path() -> bool {
    Command::new(FFMPEG)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Build the `rtp://host:port` destination URL.
pub fn sink_url(host: &str, port: u16) -> StreamResult<Url> {
    if host.is_empty() || port == 0 {
        return Err(StreamError::InvalidSinkAddress(format!("{host}:{port}")));
    }

    let authority = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(addr)) => format!("[{addr}]:{port}"),
        _ => format!("{host}:{port}"),
    };

    let url = Url::parse(&format!("rtp://{authority}"))
        .map_err(|e| StreamError::InvalidSinkAddress(format!("{authority}: {e}")))?;

    if url.host_str().is_none() {
        return Err(StreamError::InvalidSinkAddress(authority));
    }

    Ok(url)
}

fn validate(config: &StreamConfig) -> StreamResult<()> {
    if config.width == 0 || config.height == 0 {
        return Err(StreamError::InvalidConfig(
            "stream width/height must be non-zero".into(),
        ));
    }
    if config.fps == 0 {
        return Err(StreamError::InvalidConfig("stream fps must be non-zero".into()));
    }
    if config.width % 2 != 0 || config.height % 2 != 0 {
        // yuv420p output.
        return Err(StreamError::InvalidConfig(format!(
            "stream size {}x{} must be even",
            config.width, config.height
        )));
    }
    Ok(())
}

/// Command-line arguments for a zero-latency H.264 RTP encode.
pub(crate) fn ffmpeg_args(config: &StreamConfig, url: &Url) -> Vec<String> {
    let fps = config.fps.to_string();
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        PixelFormat::Bgr8.ffmpeg_name(),
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(format!("{}x{}", config.width, config.height));
    args.extend(
        ["-framerate", fps.as_str(), "-use_wallclock_as_timestamps", "1", "-i", "pipe:0", "-an"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.extend(
        [
            "-c:v",
            "libx264",
            "-preset",
            "superfast",
            "-tune",
            "zerolatency",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push("-b:v".into());
    args.push(format!("{}k", config.bitrate_kbps));
    args.push("-g".into());
    args.push(fps);
    args.extend(
        ["-pix_fmt", "yuv420p", "-f", "rtp", "-payload_type"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(RTP_PAYLOAD_TYPE.to_string());
    args.push(url.to_string());
    args
}

/// Sink that pipes raw BGR frames into an `ffmpeg` process.
pub struct FfmpegRtpSink {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_len: usize,
    frames_written: u64,
}

impl FfmpegRtpSink {
    /// Spawn the encoder for `config`.
    pub fn spawn(config: &StreamConfig) -> StreamResult<Self> {
        validate(config)?;
        let url = sink_url(&config.udp_host, config.udp_port)?;

        if !is_ffmpeg_on_path() {
            return Err(StreamError::Unavailable(
                "ffmpeg was not found on PATH".into(),
            ));
        }

        let args = ffmpeg_args(config, &url);
        debug!(?args, "Spawning ffmpeg");

        let mut child = Command::new(FFMPEG)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StreamError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StreamError::Spawn("failed to open ffmpeg stdin".into()))?;

        if let Some(stderr) = child.stderr.take() {
            thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        warn!(target: "relay_stream::ffmpeg", "{line}");
                    }
                })?;
        }

        info!(
            destination = %url,
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate_kbps = config.bitrate_kbps,
            "ffmpeg RTP encoder started"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            frame_len: PixelFormat::Bgr8.bytes_per_pixel()
                * config.width as usize
                * config.height as usize,
            frames_written: 0,
        })
    }
}

impl FrameSink for FfmpegRtpSink {
    /// Write one frame to the encoder's stdin.
    ///
    /// `frame.timing` is advisory here: rawvideo on a pipe carries no
    /// timestamps, so the encoder stamps each frame with the wall clock when
    /// it reads it (`-use_wallclock_as_timestamps`). A frame that waited in
    /// the queue is stamped later than its pipe pts.
    fn write_frame(&mut self, frame: &TimedFrame) -> StreamResult<()> {
        let data = frame.frame.data();
        if data.len() != self.frame_len {
            return Err(StreamError::Write(format!(
                "frame is {} bytes, encoder expects {}",
                data.len(),
                self.frame_len
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(StreamError::SinkClosed);
        };

        stdin
            .write_all(data)
            .map_err(|e| StreamError::Write(format!("ffmpeg stdin: {e}")))?;
        self.frames_written += 1;
        if self.frames_written % 500 == 0 {
            debug!(
                frames = self.frames_written,
                pipe_pts_ms = frame.timing.pts_ms(),
                "Frames written to ffmpeg"
            );
        }
        Ok(())
    }

    fn finish(&mut self) -> StreamResult<()> {
        drop(self.stdin.take());

        let deadline = Instant::now() + Duration::from_millis(SINK_FINISH_TIMEOUT_MS);
        loop {
            if let Some(status) = self.child.try_wait()? {
                info!(frames = self.frames_written, %status, "ffmpeg exited");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("ffmpeg did not exit in time; killing");
                self.child.kill()?;
                self.child.wait()?;
                return Ok(());
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg-rtp"
    }
}

impl Drop for FfmpegRtpSink {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
